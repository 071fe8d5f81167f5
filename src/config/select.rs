//! Branch-based environment selection.
//!
//! An environment qualifies for deployment when it is enabled and its
//! `branch` selector matches the current CI branch: a literal name requires
//! an exact match, `*` matches any branch, anything else is treated as an
//! anchored regular expression. Zero, one, or many environments may qualify;
//! the deploy command processes every one of them sequentially.

use super::EnvironmentOptions;
use crate::error::ConfigError;
use regex::Regex;
use std::collections::BTreeMap;

/// Select all enabled environments whose branch selector matches
/// `current_branch`. Iteration (and therefore deployment) order is the
/// sorted environment-name order — descriptor file order is not preserved
/// by every parser and must not be relied on.
pub fn select_environments<'a>(
    environments: &'a BTreeMap<String, EnvironmentOptions>,
    current_branch: &str,
) -> Result<Vec<(&'a str, &'a EnvironmentOptions)>, ConfigError> {
    let mut selected = Vec::new();
    for (name, env) in environments {
        if !env.enabled {
            continue;
        }
        let pattern = env.branch.as_deref().unwrap_or("*");
        if branch_matches(pattern, current_branch)? {
            selected.push((name.as_str(), env));
        }
    }
    Ok(selected)
}

fn branch_matches(pattern: &str, branch: &str) -> Result<bool, ConfigError> {
    if pattern == "*" || pattern == branch {
        return Ok(true);
    }
    // Anything that isn't a wildcard or an exact literal match is tried as
    // an anchored regular expression (e.g. `release/.*`).
    let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| ConfigError::InvalidValue {
        field: "environments.*.branch".to_string(),
        message: e.to_string(),
    })?;
    Ok(regex.is_match(branch))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(enabled: bool, branch: &str) -> EnvironmentOptions {
        EnvironmentOptions {
            enabled,
            suffix: None,
            branch: Some(branch.to_string()),
            docker: None,
            aws: None,
        }
    }

    #[test]
    fn literal_branch_requires_exact_match() {
        let mut environments = BTreeMap::new();
        environments.insert("production".to_string(), environment(true, "master"));

        let selected = select_environments(&environments, "master").unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, "production");

        let selected = select_environments(&environments, "develop").unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn wildcard_matches_any_branch() {
        let mut environments = BTreeMap::new();
        environments.insert("review".to_string(), environment(true, "*"));

        for branch in ["master", "develop", "feature/login"] {
            let selected = select_environments(&environments, branch).unwrap();
            assert_eq!(selected.len(), 1, "branch {branch}");
        }
    }

    #[test]
    fn disabled_environment_never_qualifies() {
        let mut environments = BTreeMap::new();
        environments.insert("review".to_string(), environment(false, "*"));
        let selected = select_environments(&environments, "master").unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn pattern_branch_matches_as_regex() {
        let mut environments = BTreeMap::new();
        environments.insert("preview".to_string(), environment(true, "release/.*"));

        assert_eq!(
            select_environments(&environments, "release/1.2").unwrap().len(),
            1
        );
        assert!(select_environments(&environments, "hotfix/1.2")
            .unwrap()
            .is_empty());
        // anchored: a partial match is not enough
        assert!(select_environments(&environments, "not-release/1.2")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn multiple_environments_can_qualify() {
        let mut environments = BTreeMap::new();
        environments.insert("review".to_string(), environment(true, "*"));
        environments.insert("staging".to_string(), environment(true, "develop"));

        let selected = select_environments(&environments, "develop").unwrap();
        let names: Vec<_> = selected.iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["review", "staging"]);
    }

    #[test]
    fn missing_branch_selector_defaults_to_wildcard() {
        let mut environments = BTreeMap::new();
        environments.insert(
            "review".to_string(),
            EnvironmentOptions {
                enabled: true,
                suffix: None,
                branch: None,
                docker: None,
                aws: None,
            },
        );
        assert_eq!(select_environments(&environments, "anything").unwrap().len(), 1);
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let mut environments = BTreeMap::new();
        environments.insert("broken".to_string(), environment(true, "feature/("));
        let err = select_environments(&environments, "feature/x").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
