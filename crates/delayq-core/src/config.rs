use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_THREAD_NAME: &str = "delayq-worker";
pub const ENV_PREFIX: &str = "DELAYQ_";

/// Top-level config (delayq.toml + DELAYQ_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelayqConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Knobs for the scheduler's worker thread and queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Name given to the worker OS thread (shows up in panics and debuggers).
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
    /// Catch a panicking job so the next due job still runs (default: true).
    /// Override with env var: DELAYQ_SCHEDULER__CATCH_PANICS=false
    #[serde(default = "bool_true")]
    pub catch_panics: bool,
    /// Upper bound on jobs waiting in the queue. `None` means unbounded.
    #[serde(default)]
    pub max_pending: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            catch_panics: true,
            max_pending: None,
        }
    }
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

fn bool_true() -> bool {
    true
}

impl DelayqConfig {
    /// Load config from `config_path` (or `~/.delayq/delayq.toml`), then apply
    /// `DELAYQ_*` env overrides. Nested keys are separated by `__`, e.g.
    /// `DELAYQ_SCHEDULER__MAX_PENDING=500`.
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        debug!(%path, "loading delayq config");

        let config: DelayqConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| crate::error::DelayqError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.delayq/delayq.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_configured() {
        figment::Jail::expect_with(|_jail| {
            let config = DelayqConfig::load(Some("missing.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.thread_name, DEFAULT_THREAD_NAME);
            assert!(config.scheduler.catch_panics);
            assert_eq!(config.scheduler.max_pending, None);
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_read() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "delayq.toml",
                r#"
                [scheduler]
                thread_name = "timer"
                max_pending = 8
                "#,
            )?;
            let config = DelayqConfig::load(Some("delayq.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.scheduler.thread_name, "timer");
            assert_eq!(config.scheduler.max_pending, Some(8));
            // untouched fields keep their defaults
            assert!(config.scheduler.catch_panics);
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "delayq.toml",
                r#"
                [scheduler]
                catch_panics = true
                max_pending = 8
                "#,
            )?;
            jail.set_env("DELAYQ_SCHEDULER__CATCH_PANICS", "false");
            jail.set_env("DELAYQ_SCHEDULER__MAX_PENDING", "64");
            let config = DelayqConfig::load(Some("delayq.toml")).map_err(|e| e.to_string())?;
            assert!(!config.scheduler.catch_panics);
            assert_eq!(config.scheduler.max_pending, Some(64));
            Ok(())
        });
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("delayq.toml", "[scheduler]\nmax_pending = \"lots\"\n")?;
            let err = DelayqConfig::load(Some("delayq.toml")).unwrap_err();
            assert!(matches!(err, crate::error::DelayqError::Config(_)));
            Ok(())
        });
    }
}
