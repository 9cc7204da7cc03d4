//! Configuration types.

use crate::error::ConfigError;
use crate::history::SummaryOptions;

/// Task group configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupConfig {
    /// Compress the history once every task has finished.
    pub summarize_history: bool,
    /// Record task failures as results and keep going instead of aborting.
    pub collect_failures: bool,
    /// Keep only the first occurrence of each id in a regression request.
    pub dedupe_regression_targets: bool,
    /// Options passed to the summarizer.
    pub summary: SummaryOptions,
}

impl GroupConfig {
    /// Read overrides from the environment, falling back to defaults.
    ///
    /// - `TASK_GROUP_SUMMARIZE_HISTORY`
    /// - `TASK_GROUP_COLLECT_FAILURES`
    /// - `TASK_GROUP_DEDUPE_TARGETS`
    /// - `TASK_GROUP_SUMMARY_KEEP_TURNS`
    /// - `TASK_GROUP_SUMMARY_MAX_TOKENS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            summarize_history: parse_bool(&lookup, "TASK_GROUP_SUMMARIZE_HISTORY")?
                .unwrap_or(defaults.summarize_history),
            collect_failures: parse_bool(&lookup, "TASK_GROUP_COLLECT_FAILURES")?
                .unwrap_or(defaults.collect_failures),
            dedupe_regression_targets: parse_bool(&lookup, "TASK_GROUP_DEDUPE_TARGETS")?
                .unwrap_or(defaults.dedupe_regression_targets),
            summary: SummaryOptions {
                keep_last_turns: parse_num(&lookup, "TASK_GROUP_SUMMARY_KEEP_TURNS")?
                    .unwrap_or(defaults.summary.keep_last_turns),
                max_tokens: parse_num(&lookup, "TASK_GROUP_SUMMARY_MAX_TOKENS")?
                    .unwrap_or(defaults.summary.max_tokens),
            },
        })
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<bool>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_num<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a non-negative integer, got '{raw}'"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = GroupConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GroupConfig::default());
        assert!(!config.summarize_history);
        assert!(!config.collect_failures);
        assert_eq!(config.summary.max_tokens, 1024);
    }

    #[test]
    fn reads_overrides() {
        let config = GroupConfig::from_lookup(lookup(&[
            ("TASK_GROUP_SUMMARIZE_HISTORY", "true"),
            ("TASK_GROUP_COLLECT_FAILURES", "1"),
            ("TASK_GROUP_DEDUPE_TARGETS", "off"),
            ("TASK_GROUP_SUMMARY_KEEP_TURNS", "2"),
        ]))
        .unwrap();
        assert!(config.summarize_history);
        assert!(config.collect_failures);
        assert!(!config.dedupe_regression_targets);
        assert_eq!(config.summary.keep_last_turns, 2);
    }

    #[test]
    fn rejects_bad_values() {
        let err = GroupConfig::from_lookup(lookup(&[("TASK_GROUP_COLLECT_FAILURES", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "TASK_GROUP_COLLECT_FAILURES"));

        let err = GroupConfig::from_lookup(lookup(&[("TASK_GROUP_SUMMARY_MAX_TOKENS", "-5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
