//! Plan parsing from raw model text.
//!
//! Models wrap their JSON in ` ```json ` or ` ```plan ` fences, surround it
//! with prose, or return it bare. [`parse_plan`] accepts all three and reads
//! tasks in either of two shapes:
//!
//! ```json
//! { "kind": "mine", "parameters": { "block": "stone", "quantity": 8 } }
//! { "action": "mine", "block": "stone", "quantity": 8 }
//! ```

use crate::agent::entities::Task;

/// Tasks and optional reasoning extracted from a model response.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub reasoning: Option<String>,
    pub tasks: Vec<Task>,
}

/// Parse a plan from model response text.
///
/// Returns `None` if no JSON with at least one valid task is found.
pub fn parse_plan(response: &str) -> Option<ParsedPlan> {
    for block in fenced_blocks(response) {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&block)
            && let Some(plan) = parse_plan_json(&parsed)
        {
            return Some(plan);
        }
    }

    let trimmed = response.trim();
    if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return parse_plan_json(&parsed);
    }

    // JSON embedded in prose: take the outermost object
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        .ok()
        .and_then(|parsed| parse_plan_json(&parsed))
}

/// Parse a plan from a JSON value.
///
/// Accepts an object with a `tasks` array (plus optional `reasoning` or
/// `plan` text) or a bare array of tasks. Entries without a kind are
/// skipped; a plan left without tasks is not a plan.
pub fn parse_plan_json(json: &serde_json::Value) -> Option<ParsedPlan> {
    let (tasks_json, reasoning) = match json {
        serde_json::Value::Array(items) => (items, None),
        serde_json::Value::Object(map) => {
            let tasks = map.get("tasks").and_then(|v| v.as_array())?;
            let reasoning = map
                .get("reasoning")
                .or_else(|| map.get("plan"))
                .and_then(|v| v.as_str())
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string);
            (tasks, reasoning)
        }
        _ => return None,
    };

    let tasks: Vec<Task> = tasks_json.iter().filter_map(parse_task).collect();
    if tasks.is_empty() {
        return None;
    }

    Some(ParsedPlan { reasoning, tasks })
}

fn parse_task(value: &serde_json::Value) -> Option<Task> {
    let object = value.as_object()?;
    let kind = object
        .get("kind")
        .or_else(|| object.get("action"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|k| !k.is_empty())?;

    let mut task = Task::new(kind);

    if let Some(params) = object.get("parameters").and_then(|v| v.as_object()) {
        for (key, value) in params {
            task = task.with_param(key.clone(), value.clone());
        }
    } else {
        for (key, value) in object {
            if key != "kind" && key != "action" {
                task = task.with_param(key.clone(), value.clone());
            }
        }
    }

    Some(task)
}

/// Contents of every ```` ``` ```` fenced block, in order.
fn fenced_blocks(response: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in response.lines() {
        let trimmed = line.trim();
        if let Some(block) = current.as_mut() {
            if trimmed == "```" {
                blocks.extend(current.take());
            } else {
                block.push_str(line);
                block.push('\n');
            }
        } else if trimmed.starts_with("```") {
            current = Some(String::new());
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_fence() {
        let response = r#"Here is the plan:
```json
{
  "plan": "Gather wood then build",
  "tasks": [
    {"action": "gather", "resource": "oak_log", "quantity": 12},
    {"action": "build", "structure": "shelter"}
  ]
}
```
Good luck!"#;

        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.reasoning.as_deref(), Some("Gather wood then build"));
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].kind, "gather");
        assert_eq!(plan.tasks[0].param_str("resource"), Some("oak_log"));
        assert_eq!(plan.tasks[0].param("quantity"), Some(&serde_json::json!(12)));
        assert_eq!(plan.tasks[1].param_str("structure"), Some("shelter"));
    }

    #[test]
    fn test_parse_plan_fence_with_parameters_object() {
        let response = "```plan\n{\"tasks\":[{\"kind\":\"mine\",\"parameters\":{\"block\":\"stone\"}}]}\n```";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.tasks, vec![Task::new("mine").with_param("block", "stone")]);
        assert!(plan.reasoning.is_none());
    }

    #[test]
    fn test_parse_raw_json() {
        let plan = parse_plan(r#"{"tasks":[{"action":"wait"}]}"#).unwrap();
        assert_eq!(plan.tasks, vec![Task::new("wait")]);
    }

    #[test]
    fn test_parse_bare_array() {
        let plan = parse_plan(r#"[{"kind":"follow","parameters":{"player":"sam"}}]"#).unwrap();
        assert_eq!(plan.tasks[0].param_str("player"), Some("sam"));
    }

    #[test]
    fn test_parse_json_inside_prose() {
        let response = r#"Sure. {"tasks":[{"action":"move","x":10,"z":-4}]} Let me know."#;
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.tasks[0].kind, "move");
        assert_eq!(plan.tasks[0].param("z"), Some(&serde_json::json!(-4)));
    }

    #[test]
    fn test_skips_tasks_without_kind() {
        let plan = parse_plan(r#"{"tasks":[{"target":"x"},{"action":"craft"}]}"#).unwrap();
        assert_eq!(plan.tasks, vec![Task::new("craft")]);
    }

    #[test]
    fn test_empty_tasks_is_not_a_plan() {
        assert!(parse_plan(r#"{"tasks":[]}"#).is_none());
        assert!(parse_plan(r#"{"tasks":[{"action":"  "}]}"#).is_none());
    }

    #[test]
    fn test_no_json_is_not_a_plan() {
        assert!(parse_plan("I cannot help with that.").is_none());
        assert!(parse_plan("").is_none());
        assert!(parse_plan("} nothing {").is_none());
    }

    #[test]
    fn test_invalid_fence_falls_through_to_later_block() {
        let response = "```\nnot json\n```\n```json\n{\"tasks\":[{\"action\":\"place\"}]}\n```";
        let plan = parse_plan(response).unwrap();
        assert_eq!(plan.tasks[0].kind, "place");
    }
}
