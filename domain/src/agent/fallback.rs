//! Heuristic plans for when the remote service cannot answer in time.
//!
//! [`FallbackPlanner`] splits a goal into clauses (`,`, `;`, `.`, "and",
//! "then"), finds the first known verb in each clause and turns it into a
//! task whose remaining words become the `target`. Every task carries
//! `fallback_mode = true`. The planner never returns an empty plan: a goal
//! with no recognizable verb becomes a single conservative `wait` task.

use crate::agent::entities::Task;

const DEFAULT_KIND: &str = "wait";

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "some", "please", "me", "us", "for", "of", "to", "up", "with", "at", "my",
    "our", "your", "this", "that", "over", "into",
];

const CLAUSE_WORDS: &[&str] = &["and", "then"];

#[derive(Debug, Clone)]
struct Intent {
    kind: String,
    verbs: Vec<String>,
}

/// Keyword-driven fallback plan generator.
#[derive(Debug, Clone)]
pub struct FallbackPlanner {
    intents: Vec<Intent>,
}

impl Default for FallbackPlanner {
    fn default() -> Self {
        Self::empty()
            .with_intent("build", &["build", "construct", "erect", "assemble", "create", "make"])
            .with_intent("mine", &["mine", "dig", "excavate", "quarry", "tunnel", "drill"])
            .with_intent("attack", &["attack", "fight", "kill", "defeat", "hunt", "slay"])
            .with_intent("follow", &["follow", "accompany", "escort"])
            .with_intent("move", &["move", "go", "walk", "travel", "head", "navigate", "visit", "come"])
            .with_intent(
                "gather",
                &["gather", "collect", "harvest", "get", "fetch", "pick", "loot", "bring", "obtain"],
            )
            .with_intent("craft", &["craft", "forge", "smelt", "smith"])
            .with_intent("place", &["place", "put", "set", "lay"])
            .with_intent("stop", &["stop", "halt", "cancel", "abort"])
            .with_intent("wait", &["wait", "stay", "pause", "hold", "remain"])
    }
}

impl FallbackPlanner {
    /// A planner with no intents; every goal maps to `wait`.
    pub fn empty() -> Self {
        Self {
            intents: Vec::new(),
        }
    }

    /// Register a task kind and the verbs that select it.
    ///
    /// Earlier registrations win when a verb appears under several kinds.
    pub fn with_intent(mut self, kind: impl Into<String>, verbs: &[&str]) -> Self {
        self.intents.push(Intent {
            kind: kind.into(),
            verbs: verbs.iter().map(|v| v.to_lowercase()).collect(),
        });
        self
    }

    /// Build a best-effort plan for `goal`. Never empty.
    pub fn plan(&self, goal: &str) -> Vec<Task> {
        let mut tasks: Vec<Task> = split_clauses(goal)
            .iter()
            .filter_map(|clause| self.task_for_clause(clause))
            .collect();

        if tasks.is_empty() {
            tasks.push(
                Task::new(DEFAULT_KIND)
                    .with_param("fallback_mode", true)
                    .with_param("reason", "unrecognized_goal")
                    .with_param("goal", goal.trim()),
            );
        }

        tasks
    }

    fn kind_for(&self, word: &str) -> Option<&str> {
        self.intents
            .iter()
            .find(|intent| intent.verbs.iter().any(|v| v == word))
            .map(|intent| intent.kind.as_str())
    }

    fn task_for_clause(&self, words: &[String]) -> Option<Task> {
        let (position, kind) = words
            .iter()
            .enumerate()
            .find_map(|(i, word)| self.kind_for(word).map(|kind| (i, kind)))?;

        let rest = &words[position + 1..];
        let mut task = Task::new(kind).with_param("fallback_mode", true);

        if let Some(quantity) = rest.iter().find_map(|w| w.parse::<u64>().ok()) {
            task = task.with_param("quantity", quantity);
        }

        let target: Vec<&str> = rest
            .iter()
            .map(String::as_str)
            .filter(|w| !FILLER_WORDS.contains(w) && w.parse::<u64>().is_err())
            .collect();
        if !target.is_empty() {
            task = task.with_param("target", target.join(" "));
        }

        Some(task)
    }
}

/// Lowercased words grouped into clauses.
fn split_clauses(text: &str) -> Vec<Vec<String>> {
    let mut clauses = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut word = String::new();

    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' {
            word.extend(c.to_lowercase());
            continue;
        }
        flush_word(&mut word, &mut current, &mut clauses);
        if matches!(c, ',' | ';' | '.' | '!' | '?') && !current.is_empty() {
            clauses.push(std::mem::take(&mut current));
        }
    }
    flush_word(&mut word, &mut current, &mut clauses);
    if !current.is_empty() {
        clauses.push(current);
    }

    clauses
}

fn flush_word(word: &mut String, current: &mut Vec<String>, clauses: &mut Vec<Vec<String>>) {
    if word.is_empty() {
        return;
    }
    let finished = std::mem::take(word);
    if CLAUSE_WORDS.contains(&finished.as_str()) {
        if !current.is_empty() {
            clauses.push(std::mem::take(current));
        }
    } else {
        current.push(finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_intent_with_target() {
        let tasks = FallbackPlanner::default().plan("Build a small shelter");
        assert_eq!(
            tasks,
            vec![
                Task::new("build")
                    .with_param("fallback_mode", true)
                    .with_param("target", "small shelter")
            ]
        );
    }

    #[test]
    fn test_synonyms_map_to_canonical_kind() {
        let planner = FallbackPlanner::default();
        assert_eq!(planner.plan("construct a tiny house")[0].kind, "build");
        assert_eq!(planner.plan("dig for iron")[0].kind, "mine");
        assert_eq!(planner.plan("please collect wood")[0].kind, "gather");
    }

    #[test]
    fn test_multiple_clauses_with_quantity() {
        let tasks = FallbackPlanner::default().plan("Collect 12 oak logs, then build a hut and wait");
        let kinds: Vec<&str> = tasks.iter().map(|t| t.kind.as_str()).collect();
        assert_eq!(kinds, vec!["gather", "build", "wait"]);
        assert_eq!(tasks[0].param("quantity"), Some(&serde_json::json!(12)));
        assert_eq!(tasks[0].param_str("target"), Some("oak logs"));
        assert_eq!(tasks[1].param_str("target"), Some("hut"));
        assert!(tasks[2].param("target").is_none());
    }

    #[test]
    fn test_unrecognized_goal_waits() {
        let tasks = FallbackPlanner::default().plan("sing me a song");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, "wait");
        assert_eq!(tasks[0].param_str("reason"), Some("unrecognized_goal"));
        assert_eq!(tasks[0].param_str("goal"), Some("sing me a song"));
    }

    #[test]
    fn test_never_empty() {
        assert_eq!(FallbackPlanner::default().plan("").len(), 1);
        assert_eq!(FallbackPlanner::empty().plan("build a house")[0].kind, "wait");
    }

    #[test]
    fn test_every_task_is_flagged() {
        let tasks = FallbackPlanner::default().plan("mine coal; craft a sword. follow sam");
        assert_eq!(tasks.len(), 3);
        assert!(tasks.iter().all(|t| t.param("fallback_mode") == Some(&serde_json::json!(true))));
    }

    #[test]
    fn test_custom_intent() {
        let planner = FallbackPlanner::empty().with_intent("scan", &["Scan", "survey"]);
        let tasks = planner.plan("survey the north ridge");
        assert_eq!(tasks[0].kind, "scan");
        assert_eq!(tasks[0].param_str("target"), Some("north ridge"));
    }
}
