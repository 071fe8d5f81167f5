//! Placeholder substitution.
//!
//! Walks every string leaf of the resolved configuration and replaces
//! `${NAME}` tokens with the value of the `NAME` process environment
//! variable. The `ci` sub-tree is copied through untouched in both modes:
//! its tokens are meant for the CI provider's own substitution at pipeline
//! run time.
//!
//! Strict mode aggregates every unresolved name into a single fatal error;
//! tolerant mode leaves unresolved tokens in place (display/dry paths).
//! Substitution is idempotent: output without remaining placeholders passes
//! through a second run unchanged.

use super::ResolvedConfig;
use crate::error::MissingVariablesError;
use anyhow::{Context, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Unresolved placeholders fail the command with the aggregated list
    Strict,
    /// Unresolved placeholders survive in the output
    Tolerant,
}

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"))
}

/// Substitute placeholders from the process environment.
pub fn substitute(config: &ResolvedConfig, mode: SubstitutionMode) -> Result<ResolvedConfig> {
    substitute_with(config, mode, |name| std::env::var(name).ok())
}

/// Substitute placeholders with an explicit lookup, for callers (and tests)
/// that don't want to read the process environment.
pub fn substitute_with<F>(
    config: &ResolvedConfig,
    mode: SubstitutionMode,
    lookup: F,
) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut tree =
        serde_json::to_value(config).context("Failed to serialize configuration for substitution")?;
    let mut missing = BTreeSet::new();

    if let Some(root) = tree.as_object_mut() {
        for (key, value) in root.iter_mut() {
            if key == "ci" {
                continue;
            }
            walk(value, &lookup, &mut missing);
        }
    }

    if mode == SubstitutionMode::Strict && !missing.is_empty() {
        return Err(MissingVariablesError {
            missing: missing.into_iter().collect(),
        }
        .into());
    }

    serde_json::from_value(tree).context("Failed to rebuild configuration after substitution")
}

fn walk<F>(value: &mut serde_json::Value, lookup: &F, missing: &mut BTreeSet<String>)
where
    F: Fn(&str) -> Option<String>,
{
    match value {
        serde_json::Value::String(s) => {
            if s.contains("${") {
                *s = substitute_str(s, lookup, missing);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items {
                walk(item, lookup, missing);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                walk(item, lookup, missing);
            }
        }
        _ => {}
    }
}

fn substitute_str<F>(s: &str, lookup: &F, missing: &mut BTreeSet<String>) -> String
where
    F: Fn(&str) -> Option<String>,
{
    placeholder()
        .replace_all(s, |caps: &regex::Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) => value,
                None => {
                    missing.insert(name.to_string());
                    caps[0].to_string()
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, Descriptor, EnvVar};

    fn config_with_env(value: &str) -> ResolvedConfig {
        let descriptor: Descriptor = serde_yaml::from_str("name: app").unwrap();
        let mut config = resolve(&descriptor, None).unwrap();
        config.aws.ecs.task_definition.containers[0]
            .environment
            .push(EnvVar {
                name: "DATABASE_URL".to_string(),
                value: value.to_string(),
            });
        config
    }

    #[test]
    fn replaces_known_placeholders() {
        let config = config_with_env("postgres://${DB_HOST}/app");
        let result = substitute_with(&config, SubstitutionMode::Strict, |name| match name {
            "DB_HOST" => Some("db.internal".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            result.aws.ecs.task_definition.containers[0].environment[0].value,
            "postgres://db.internal/app"
        );
    }

    #[test]
    fn strict_mode_aggregates_all_missing_names() {
        let mut config = config_with_env("${UNDEFINED_XYZ}");
        config.aws.ecs.task_definition.containers[0]
            .environment
            .push(EnvVar {
                name: "API_KEY".to_string(),
                value: "${ALSO_MISSING}".to_string(),
            });
        let err = substitute_with(&config, SubstitutionMode::Strict, |_| None).unwrap_err();
        let missing = err
            .downcast_ref::<crate::error::MissingVariablesError>()
            .expect("typed error");
        assert_eq!(missing.missing, vec!["ALSO_MISSING", "UNDEFINED_XYZ"]);
    }

    #[test]
    fn strict_mode_reports_exactly_the_missing_name() {
        let config = config_with_env("${UNDEFINED_XYZ}");
        let err = substitute_with(&config, SubstitutionMode::Strict, |_| None).unwrap_err();
        let missing = err
            .downcast_ref::<crate::error::MissingVariablesError>()
            .unwrap();
        assert_eq!(missing.missing, vec!["UNDEFINED_XYZ"]);
    }

    #[test]
    fn tolerant_mode_leaves_unresolved_tokens() {
        let config = config_with_env("${UNDEFINED_XYZ}");
        let result = substitute_with(&config, SubstitutionMode::Tolerant, |_| None).unwrap();
        assert_eq!(
            result.aws.ecs.task_definition.containers[0].environment[0].value,
            "${UNDEFINED_XYZ}"
        );
    }

    #[test]
    fn ci_subtree_is_never_substituted() {
        let yaml = r#"
name: app
ci:
  provider: travis
  predeploy:
    lint:
      command: echo ${AWS_ACCESS_KEY_ID}
"#;
        let descriptor: Descriptor = serde_yaml::from_str(yaml).unwrap();
        let config = resolve(&descriptor, None).unwrap();
        for mode in [SubstitutionMode::Strict, SubstitutionMode::Tolerant] {
            let result = substitute_with(&config, mode, |_| Some("LEAKED".to_string())).unwrap();
            let ci = serde_yaml::to_string(&result.ci).unwrap();
            assert!(ci.contains("${AWS_ACCESS_KEY_ID}"), "mode {mode:?}: {ci}");
            assert!(!ci.contains("LEAKED"));
        }
    }

    #[test]
    fn substitution_is_idempotent() {
        let config = config_with_env("postgres://${DB_HOST}/app");
        let lookup = |name: &str| match name {
            "DB_HOST" => Some("db.internal".to_string()),
            _ => None,
        };
        let once = substitute_with(&config, SubstitutionMode::Strict, lookup).unwrap();
        let twice = substitute_with(&once, SubstitutionMode::Strict, lookup).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn untouched_tree_passes_through_unchanged() {
        let config = config_with_env("plain value, no tokens");
        let result = substitute_with(&config, SubstitutionMode::Strict, |_| None).unwrap();
        assert_eq!(result, config);
    }
}
