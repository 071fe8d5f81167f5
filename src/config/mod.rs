//! # Deployment Descriptor
//!
//! The per-project `slipway.yml` describes one containerized application and
//! the environments it deploys to. Keys are camelCase, matching the file
//! format users commit to their repositories:
//!
//! ```yaml
//! name: myapp
//! ci: travis
//! buildPack: nodejs
//! environments:
//!   staging:
//!     suffix: staging
//!     branch: develop
//!   production:
//!     suffix: production
//!     branch: master
//! aws:
//!   region: eu-west-1
//!   vpcId: vpc-0123456789
//!   ecs:
//!     loadBalancer:
//!       subnets: [subnet-aaaa, subnet-bbbb]
//! ```
//!
//! Everything except `name` is optional; the resolver fills computed defaults
//! (see [`resolve`]). `${VAR}` placeholder tokens are permitted anywhere a
//! string is expected and are expanded by the substitution engine — except
//! inside the `ci` section, whose tokens are passed through verbatim to the
//! generated pipeline config.

mod merge;
mod resolve;
mod select;
mod substitute;

pub use resolve::{
    resolve, ClusterConfig, ContainerConfig, EnvVar, ListenerConfig, LoadBalancerConfig,
    LogGroupConfig, PortMapping, ResolvedAws, ResolvedConfig, ResolvedDocker, ResolvedEcs,
    ResolvedRepository, ServiceConfig, TargetGroupConfig, TaskDefinitionConfig,
};
pub use select::select_environments;
pub use substitute::{substitute, substitute_with, SubstitutionMode};

use crate::buildpack::BuildPackConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Descriptor file names probed in the project directory, in order.
const DESCRIPTOR_FILES: &[&str] = &["slipway.yml", "slipway.yaml", ".slipway.yml"];

/// The raw, unresolved deployment descriptor loaded from `slipway.yml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Application name; base for every generated resource name
    pub name: String,

    /// CI provider (and optional pre/post-deploy hook jobs)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ci: Option<CiConfig>,

    /// Build pack identifier or inline definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_pack: Option<BuildPackConfig>,

    /// Deployable environments, keyed by name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environments: Option<BTreeMap<String, EnvironmentOptions>>,

    /// Container build options (global layer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOptions>,

    /// Cloud options (global layer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsOptions>,
}

impl Descriptor {
    /// Load the descriptor from the project directory.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::find(project_dir).ok_or_else(|| ConfigError::FileNotFound {
            path: project_dir.display().to_string(),
        })?;
        Self::load_from(&path)
    }

    /// Load the descriptor from an explicit file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        // Layer type mismatches (e.g. a mapping where a string is expected)
        // surface here with the YAML location, before any merge runs.
        let descriptor: Descriptor =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if descriptor.name.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "name".to_string(),
            });
        }
        Ok(descriptor)
    }

    /// Locate the descriptor file in the project directory, if any.
    pub fn find(project_dir: &Path) -> Option<PathBuf> {
        DESCRIPTOR_FILES
            .iter()
            .map(|f| project_dir.join(f))
            .find(|p| p.exists())
    }
}

/// CI configuration: either just the provider id, or the provider plus
/// pre/post-deploy hook jobs spliced into the generated pipeline.
///
/// Hook bodies are kept as raw YAML — their `${VAR}` tokens belong to the CI
/// provider and must survive into the generated file untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CiConfig {
    Provider(String),
    Options(CiOptions),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiOptions {
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predeploy: Option<serde_yaml::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postdeploy: Option<serde_yaml::Value>,
}

impl CiConfig {
    pub fn provider(&self) -> &str {
        match self {
            CiConfig::Provider(p) => p,
            CiConfig::Options(o) => &o.provider,
        }
    }

    pub fn predeploy(&self) -> Option<&serde_yaml::Value> {
        match self {
            CiConfig::Provider(_) => None,
            CiConfig::Options(o) => o.predeploy.as_ref(),
        }
    }

    pub fn postdeploy(&self) -> Option<&serde_yaml::Value> {
        match self {
            CiConfig::Provider(_) => None,
            CiConfig::Options(o) => o.postdeploy.as_ref(),
        }
    }
}

/// One deployable target (e.g. staging). Declared statically in the
/// descriptor; only ever read at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentOptions {
    /// Gate: disabled environments are never provisioned or deployed
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Appended to every generated resource name; normalized to start with a
    /// separator character
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    /// Branch selector: literal name, regular expression, or `*` for any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    /// Per-environment docker overrides (highest precedence layer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerOptions>,

    /// Per-environment cloud overrides (highest precedence layer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsOptions>,
}

fn default_enabled() -> bool {
    true
}

/// Container build options. All fields optional; defaults are computed from
/// the application name during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerOptions {
    /// Image name (defaults to `{name}{suffix}`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Custom Dockerfile contents, overriding the build pack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    /// `--build-arg` entries passed to `docker build`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_args: Option<Vec<BuildArg>>,

    /// Target image repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArg {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryOptions {
    /// Repository flavor; only `aws-ecr` is supported
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Cloud options. One layer of the three-layer merge; every field optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Credential profile in `~/.aws/credentials`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ecs: Option<EcsOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<ClusterOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancerOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_group: Option<TargetGroupOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_group: Option<LogGroupOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<TaskDefinitionOptions>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Subnets to attach; required before the load balancer can be created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_groups: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Overrides the top-level `aws.vpcId` for this target group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vpc_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub containers: Option<Vec<ContainerOptions>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_mappings: Option<Vec<PortMappingOptions>>,

    /// Concatenated across layers rather than merged positionally: entries
    /// are independent key/value pairs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<Vec<EnvVar>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMappingOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<i32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired_count: Option<i32>,

    /// Task definition reference; defaults to the resolved task family
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_definition: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_descriptor() {
        let descriptor: Descriptor = serde_yaml::from_str("name: myapp").unwrap();
        assert_eq!(descriptor.name, "myapp");
        assert!(descriptor.environments.is_none());
    }

    #[test]
    fn parses_ci_as_plain_provider_string() {
        let descriptor: Descriptor = serde_yaml::from_str("name: myapp\nci: travis").unwrap();
        assert_eq!(descriptor.ci.unwrap().provider(), "travis");
    }

    #[test]
    fn parses_ci_with_hooks() {
        let yaml = r#"
name: myapp
ci:
  provider: circleci
  predeploy:
    lint:
      docker:
        - image: circleci/node:8
"#;
        let descriptor: Descriptor = serde_yaml::from_str(yaml).unwrap();
        let ci = descriptor.ci.unwrap();
        assert_eq!(ci.provider(), "circleci");
        assert!(ci.predeploy().is_some());
    }

    #[test]
    fn parses_environments_with_overrides() {
        let yaml = r#"
name: myapp
environments:
  staging:
    suffix: staging
    branch: develop
    aws:
      region: eu-west-1
  production:
    enabled: false
    branch: master
"#;
        let descriptor: Descriptor = serde_yaml::from_str(yaml).unwrap();
        let environments = descriptor.environments.unwrap();
        let staging = &environments["staging"];
        assert!(staging.enabled);
        assert_eq!(staging.suffix.as_deref(), Some("staging"));
        assert_eq!(
            staging.aws.as_ref().unwrap().region.as_deref(),
            Some("eu-west-1")
        );
        assert!(!environments["production"].enabled);
    }

    #[test]
    fn rejects_type_mismatch_between_layers() {
        // `aws` holding a scalar where a mapping is expected must fail the
        // parse, not silently coerce.
        let err = serde_yaml::from_str::<Descriptor>("name: myapp\naws: us-east-1").unwrap_err();
        assert!(err.to_string().contains("invalid type"));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Descriptor::load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ConfigError::FileNotFound { .. }
        ));
    }

    #[test]
    fn load_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("slipway.yml"), "name: ''").unwrap();
        let err = Descriptor::load(dir.path()).unwrap_err();
        assert!(matches!(err, crate::error::ConfigError::MissingField { .. }));
    }
}
