//! Configuration loader with multi-source merging

use super::file_config::FileConfig;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "agent-planner";
const PROJECT_FILES: [&str; 2] = ["planner.toml", ".planner.toml"];
const ENV_PREFIX: &str = "PLANNER_";

/// Configuration loader that merges multiple sources
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. Environment: `PLANNER_<SECTION>__<KEY>` (e.g. `PLANNER_RATE_LIMIT__QUOTA=10`)
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./planner.toml` or `./.planner.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/agent-planner/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(Self::global_config_path(), config_path)
            .extract()
            .map_err(Box::new)
    }

    fn figment(global: Option<PathBuf>, explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = global {
            figment = figment.merge(Toml::file(global_path));
        }

        if let Some(path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    /// Expected global config path, whether or not the file exists yet
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Describe the config file locations being used (for --show-config)
    pub fn config_sources(explicit: Option<&Path>) -> Vec<String> {
        let mut sources = Vec::new();
        let mark = |found: bool| if found { "[FOUND]" } else { "[     ]" };

        if let Some(path) = explicit {
            sources.push(format!("{} Explicit: {}", mark(path.exists()), path.display()));
        }
        match Self::project_config_path() {
            Some(path) => sources.push(format!("[FOUND] Project:  {}", path.display())),
            None => sources.push("[     ] Project:  ./planner.toml or ./.planner.toml".to_string()),
        }
        if let Some(path) = Self::global_config_path() {
            sources.push(format!("{} Global:   {}", mark(path.exists()), path.display()));
        }
        sources.push(format!("[     ] Env:      {ENV_PREFIX}<SECTION>__<KEY>"));
        sources.push("[     ] Default:  built-in defaults".to_string());
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransportKind;
    use figment::Jail;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config, FileConfig::default());
        assert!(config.to_planner_config().is_ok());
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "planner.toml",
                r#"
[rate_limit]
quota = 5

[transport]
kind = "loopback"
"#,
            )?;

            let config = ConfigLoader::figment(None, None).extract::<FileConfig>()?;
            assert_eq!(config.rate_limit.quota, 5);
            assert_eq!(config.transport.kind, TransportKind::Loopback);
            // Untouched sections keep their defaults
            assert_eq!(config.circuit_breaker, Default::default());
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_beats_project_and_global() {
        Jail::expect_with(|jail| {
            jail.create_file("global.toml", "[circuit_breaker]\nfailure_threshold = 9\ncooldown_secs = 7\n")?;
            jail.create_file(".planner.toml", "[circuit_breaker]\nfailure_threshold = 4\n")?;
            jail.create_file("custom.toml", "[circuit_breaker]\nfailure_threshold = 2\n")?;

            let config = ConfigLoader::figment(
                Some(PathBuf::from("global.toml")),
                Some(Path::new("custom.toml")),
            )
            .extract::<FileConfig>()?;
            assert_eq!(config.circuit_breaker.failure_threshold, 2);
            assert_eq!(config.circuit_breaker.cooldown_secs, 7);
            Ok(())
        });
    }

    #[test]
    fn test_environment_beats_files() {
        Jail::expect_with(|jail| {
            jail.create_file("planner.toml", "[coordinator]\nbusy_policy = \"queue\"\n")?;
            jail.set_env("PLANNER_COORDINATOR__BUSY_POLICY", "preempt");
            jail.set_env("PLANNER_RESILIENCE__MAX_RETRIES", "1");

            let config = ConfigLoader::figment(None, None).extract::<FileConfig>()?;
            assert_eq!(config.coordinator.busy_policy, "preempt");
            assert_eq!(config.resilience.max_retries, 1);
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_file_is_ignored() {
        Jail::expect_with(|_jail| {
            let config =
                ConfigLoader::figment(None, Some(Path::new("nope.toml"))).extract::<FileConfig>()?;
            assert_eq!(config, FileConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        Jail::expect_with(|jail| {
            jail.create_file("planner.toml", "[rate_limit]\nquota = \"many\"\n")?;
            assert!(ConfigLoader::figment(None, None).extract::<FileConfig>().is_err());
            Ok(())
        });
    }
}
