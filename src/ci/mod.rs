//! CI provider integration: pipeline-config generation and branch
//! detection for environment selection.

mod circle;
mod travis;

use crate::config::CiConfig;
use crate::error::ConfigError;
use anyhow::{Context, Result};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiProvider {
    Travis,
    CircleCi,
}

impl CiProvider {
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "travis" => Ok(CiProvider::Travis),
            "circleci" | "circle-ci" | "circle" => Ok(CiProvider::CircleCi),
            other => Err(ConfigError::InvalidValue {
                field: "ci".to_string(),
                message: format!("unsupported CI provider '{other}' (travis, circleci)"),
            }),
        }
    }

    pub fn from_config(ci: Option<&CiConfig>) -> Result<Self, ConfigError> {
        match ci {
            Some(ci) => Self::parse(ci.provider()),
            None => Ok(CiProvider::Travis),
        }
    }

    /// Path of the generated pipeline config, relative to the project root.
    pub fn config_path(&self) -> &'static str {
        match self {
            CiProvider::Travis => ".travis.yml",
            CiProvider::CircleCi => ".circleci/config.yml",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CiProvider::Travis => "Travis CI",
            CiProvider::CircleCi => "CircleCI",
        }
    }
}

/// The branch this CI build runs for, from provider-specific variables.
/// Travis distinguishes pull-request builds: the PR source branch wins when
/// set and non-empty.
pub fn current_branch(provider: CiProvider) -> Option<String> {
    current_branch_from(provider, |name| std::env::var(name).ok())
}

pub fn current_branch_from<F>(provider: CiProvider, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let branch = match provider {
        CiProvider::Travis => lookup("TRAVIS_PULL_REQUEST_BRANCH")
            .filter(|b| !b.is_empty())
            .or_else(|| lookup("TRAVIS_BRANCH")),
        CiProvider::CircleCi => lookup("CIRCLE_BRANCH"),
    };
    branch.filter(|b| !b.is_empty())
}

/// Write the pipeline config for the configured provider.
pub fn create(provider: CiProvider, project_dir: &Path, ci: Option<&CiConfig>) -> Result<()> {
    let content = match provider {
        CiProvider::Travis => travis::render(),
        CiProvider::CircleCi => circle::render(ci)?,
    };
    let path = project_dir.join(provider.config_path());
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))
}

/// Remove the generated pipeline config, if present.
pub fn delete(provider: CiProvider, project_dir: &Path) -> Result<()> {
    let path = project_dir.join(provider.config_path());
    if path.exists() {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    Ok(())
}
