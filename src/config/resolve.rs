//! Environment resolution.
//!
//! Turns the raw descriptor plus an optional environment name into a fully
//! resolved configuration: every resource has a concrete name derived from
//! `{name}{suffix}`, and every field has a value from the highest-precedence
//! layer that supplies one (environment override > descriptor-level options >
//! computed defaults).
//!
//! Resolution is a pure function over its inputs, except for the default
//! region which falls back to `AWS_DEFAULT_REGION`. The resolved value is
//! constructed once per command invocation and passed by reference into
//! every component that needs it — there is no global configuration state.

use super::{AwsOptions, Descriptor, DockerOptions};
use crate::buildpack::BuildPackConfig;
use crate::config::CiConfig;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_HTTP_PORT: i32 = 80;
const DEFAULT_MEMORY_RESERVATION: i32 = 256;

/// Fully resolved, environment-specific configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    /// Application base name (without suffix)
    pub name: String,

    /// The environment this configuration was resolved for, if any
    pub environment: Option<String>,

    /// CI configuration, passed through verbatim (never substituted)
    pub ci: Option<CiConfig>,

    /// Build pack selection, passed through for the docker collaborator
    pub build_pack: Option<BuildPackConfig>,

    pub docker: ResolvedDocker,
    pub aws: ResolvedAws,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDocker {
    /// Local image name
    pub name: String,

    /// Custom Dockerfile contents, if the user supplied one inline
    pub dockerfile: Option<String>,

    pub build_args: Vec<super::BuildArg>,

    pub repository: ResolvedRepository,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRepository {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAws {
    pub region: String,
    pub profile: String,
    pub vpc_id: Option<String>,
    pub ecs: ResolvedEcs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedEcs {
    pub cluster: ClusterConfig,
    pub load_balancer: LoadBalancerConfig,
    pub target_group: TargetGroupConfig,
    pub listener: ListenerConfig,
    pub log_group: LogGroupConfig,
    pub task_definition: TaskDefinitionConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancerConfig {
    pub name: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetGroupConfig {
    pub name: String,
    pub port: i32,
    pub protocol: String,
    pub vpc_id: Option<String>,
    pub health_check_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerConfig {
    pub port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogGroupConfig {
    pub name: String,
    pub retention_days: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionConfig {
    pub family: String,
    pub network_mode: String,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub containers: Vec<ContainerConfig>,
}

impl TaskDefinitionConfig {
    /// The primary container: first in the list, receives the pushed image.
    pub fn primary_container(&self) -> &ContainerConfig {
        &self.containers[0]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    pub name: String,

    /// Explicit image reference; the primary container defaults to the
    /// pushed repository image at registration time
    pub image: Option<String>,

    pub cpu: Option<i32>,
    pub memory: Option<i32>,
    pub memory_reservation: Option<i32>,
    pub essential: bool,
    pub port_mappings: Vec<PortMapping>,
    pub environment: Vec<EnvVar>,
    pub command: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: i32,
    /// 0 requests a dynamic host port from the container instance
    pub host_port: i32,
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub name: String,

    /// None means "not configured": creation uses 1, the redeploy path
    /// leaves the live count untouched
    pub desired_count: Option<i32>,

    /// Task definition reference; equals the resolved family unless the
    /// user overrode it
    pub task_definition: String,

    pub launch_type: String,

    /// Load balancer binding; always the primary container
    pub container_name: String,
    pub container_port: i32,
}

/// Resolve the descriptor for one environment (or in single-environment mode
/// when `environment` is `None`).
pub fn resolve(
    descriptor: &Descriptor,
    environment: Option<&str>,
) -> Result<ResolvedConfig, ConfigError> {
    let base = descriptor.name.trim();
    if base.is_empty() {
        return Err(ConfigError::MissingField {
            field: "name".to_string(),
        });
    }

    let (env_name, env) = match environment {
        Some(name) => {
            let env = descriptor
                .environments
                .as_ref()
                .and_then(|m| m.get(name))
                .ok_or_else(|| ConfigError::UnknownEnvironment {
                    name: name.to_string(),
                    known: descriptor
                        .environments
                        .as_ref()
                        .map(|m| m.keys().cloned().collect::<Vec<_>>().join(", "))
                        .unwrap_or_else(|| "(none)".to_string()),
                })?;
            (Some(name.to_string()), Some(env))
        }
        None => (None, None),
    };

    let suffix = normalize_suffix(env.and_then(|e| e.suffix.as_deref()).unwrap_or(""));
    let resource_base = format!("{base}{suffix}");

    // Environment override wins over descriptor-level options; computed
    // defaults are applied below as per-field fallbacks.
    let aws = merge_layers(
        env.and_then(|e| e.aws.clone()),
        descriptor.aws.clone(),
        AwsOptions::merge_over,
    );
    let docker = merge_layers(
        env.and_then(|e| e.docker.clone()),
        descriptor.docker.clone(),
        DockerOptions::merge_over,
    );

    let ecs = aws.ecs.unwrap_or_default();

    let task_definition = resolve_task_definition(ecs.task_definition, &resource_base)?;
    let primary = task_definition.primary_container();

    let service_options = ecs.service.unwrap_or_default();
    let service = ServiceConfig {
        name: service_options.name.unwrap_or_else(|| resource_base.clone()),
        desired_count: service_options.desired_count,
        task_definition: service_options
            .task_definition
            .unwrap_or_else(|| task_definition.family.clone()),
        launch_type: service_options.launch_type.unwrap_or_else(|| "EC2".to_string()),
        container_name: primary.name.clone(),
        container_port: primary
            .port_mappings
            .first()
            .map(|p| p.container_port)
            .unwrap_or(DEFAULT_HTTP_PORT),
    };

    let target_group_options = ecs.target_group.unwrap_or_default();
    let target_group = TargetGroupConfig {
        name: target_group_options
            .name
            .unwrap_or_else(|| resource_base.clone()),
        port: target_group_options.port.unwrap_or(DEFAULT_HTTP_PORT),
        protocol: target_group_options
            .protocol
            .unwrap_or_else(|| "HTTP".to_string()),
        vpc_id: target_group_options.vpc_id.or_else(|| aws.vpc_id.clone()),
        health_check_path: target_group_options
            .health_check_path
            .unwrap_or_else(|| "/".to_string()),
    };

    let load_balancer_options = ecs.load_balancer.unwrap_or_default();
    let load_balancer = LoadBalancerConfig {
        name: load_balancer_options
            .name
            .unwrap_or_else(|| resource_base.clone()),
        subnets: load_balancer_options.subnets.unwrap_or_default(),
        security_groups: load_balancer_options.security_groups.unwrap_or_default(),
    };

    let listener_options = ecs.listener.unwrap_or_default();
    let listener = ListenerConfig {
        port: listener_options.port.unwrap_or(DEFAULT_HTTP_PORT),
        protocol: listener_options.protocol.unwrap_or_else(|| "HTTP".to_string()),
    };

    let log_group_options = ecs.log_group.unwrap_or_default();
    let log_group = LogGroupConfig {
        name: log_group_options
            .name
            .unwrap_or_else(|| resource_base.clone()),
        retention_days: log_group_options.retention_days,
    };

    let cluster = ClusterConfig {
        name: ecs
            .cluster
            .unwrap_or_default()
            .name
            .unwrap_or_else(|| resource_base.clone()),
    };

    let repository_options = docker.repository.clone().unwrap_or_default();
    let repository = ResolvedRepository {
        kind: repository_options.kind.unwrap_or_else(|| "aws-ecr".to_string()),
        name: repository_options
            .name
            .unwrap_or_else(|| resource_base.clone()),
    };

    Ok(ResolvedConfig {
        name: base.to_string(),
        environment: env_name,
        ci: descriptor.ci.clone(),
        build_pack: descriptor.build_pack.clone(),
        docker: ResolvedDocker {
            name: docker.name.unwrap_or_else(|| resource_base.clone()),
            dockerfile: docker.dockerfile,
            build_args: docker.build_args.unwrap_or_default(),
            repository,
        },
        aws: ResolvedAws {
            region: aws.region.unwrap_or_else(default_region),
            profile: aws.profile.unwrap_or_else(|| base.to_string()),
            vpc_id: aws.vpc_id,
            ecs: ResolvedEcs {
                cluster,
                load_balancer,
                target_group,
                listener,
                log_group,
                task_definition,
                service,
            },
        },
    })
}

fn resolve_task_definition(
    options: Option<super::TaskDefinitionOptions>,
    resource_base: &str,
) -> Result<TaskDefinitionConfig, ConfigError> {
    let options = options.unwrap_or_default();
    let mut containers = Vec::new();
    for (index, container) in options.containers.unwrap_or_default().into_iter().enumerate() {
        containers.push(resolve_container(container, index, resource_base)?);
    }
    if containers.is_empty() {
        containers.push(resolve_container(
            super::ContainerOptions::default(),
            0,
            resource_base,
        )?);
    }

    Ok(TaskDefinitionConfig {
        family: options.family.unwrap_or_else(|| resource_base.to_string()),
        network_mode: options.network_mode.unwrap_or_else(|| "bridge".to_string()),
        cpu: options.cpu,
        memory: options.memory,
        containers,
    })
}

fn resolve_container(
    options: super::ContainerOptions,
    index: usize,
    resource_base: &str,
) -> Result<ContainerConfig, ConfigError> {
    let name = match options.name {
        Some(name) => name,
        // only the primary container gets a computed name
        None if index == 0 => resource_base.to_string(),
        None => {
            return Err(ConfigError::MissingField {
                field: format!("aws.ecs.taskDefinition.containers[{index}].name"),
            })
        }
    };

    let port_mappings = match options.port_mappings {
        Some(mappings) => mappings
            .into_iter()
            .map(|p| PortMapping {
                container_port: p.container_port.unwrap_or(DEFAULT_HTTP_PORT),
                host_port: p.host_port.unwrap_or(0),
                protocol: p.protocol.unwrap_or_else(|| "tcp".to_string()),
            })
            .collect(),
        // primary container serves HTTP on a dynamic host port by default
        None if index == 0 => vec![PortMapping {
            container_port: DEFAULT_HTTP_PORT,
            host_port: 0,
            protocol: "tcp".to_string(),
        }],
        None => Vec::new(),
    };

    Ok(ContainerConfig {
        name,
        image: options.image,
        cpu: options.cpu,
        memory: options.memory,
        memory_reservation: Some(
            options
                .memory_reservation
                .unwrap_or(DEFAULT_MEMORY_RESERVATION),
        ),
        essential: options.essential.unwrap_or(index == 0),
        port_mappings,
        environment: options.environment.unwrap_or_default(),
        command: options.command,
    })
}

fn merge_layers<T>(over: Option<T>, base: Option<T>, merge: impl FnOnce(T, T) -> T) -> T
where
    T: Default,
{
    match (over, base) {
        (Some(o), Some(b)) => merge(o, b),
        (Some(o), None) => o,
        (None, Some(b)) => b,
        (None, None) => T::default(),
    }
}

/// A non-empty suffix always begins with a separator character.
fn normalize_suffix(suffix: &str) -> String {
    if suffix.is_empty() {
        String::new()
    } else if suffix.starts_with('-') || suffix.starts_with('_') {
        suffix.to_string()
    } else {
        format!("-{suffix}")
    }
}

fn default_region() -> String {
    std::env::var("AWS_DEFAULT_REGION")
        .ok()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvironmentOptions, TargetGroupOptions};
    use std::collections::BTreeMap;

    fn descriptor(yaml: &str) -> Descriptor {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn single_environment_mode_uses_defaults() {
        let resolved = resolve(&descriptor("name: app"), None).unwrap();
        assert_eq!(resolved.aws.ecs.cluster.name, "app");
        assert_eq!(resolved.aws.ecs.service.name, "app");
        assert_eq!(resolved.aws.ecs.task_definition.family, "app");
        assert_eq!(resolved.aws.ecs.log_group.name, "app");
        assert_eq!(resolved.docker.repository.name, "app");
        assert_eq!(resolved.aws.profile, "app");
        assert_eq!(resolved.aws.ecs.target_group.port, 80);
        assert_eq!(resolved.aws.ecs.service.launch_type, "EC2");
    }

    #[test]
    fn unknown_environment_is_an_error() {
        let d = descriptor("name: app\nenvironments:\n  staging: {}\n");
        let err = resolve(&d, Some("production")).unwrap_err();
        match err {
            ConfigError::UnknownEnvironment { name, known } => {
                assert_eq!(name, "production");
                assert!(known.contains("staging"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn suffix_is_normalized_with_leading_separator() {
        for suffix in ["staging", "-staging"] {
            let mut environments = BTreeMap::new();
            environments.insert(
                "staging".to_string(),
                EnvironmentOptions {
                    enabled: true,
                    suffix: Some(suffix.to_string()),
                    branch: None,
                    docker: None,
                    aws: None,
                },
            );
            let d = Descriptor {
                environments: Some(environments),
                ..descriptor("name: app")
            };
            let resolved = resolve(&d, Some("staging")).unwrap();
            assert_eq!(resolved.aws.ecs.cluster.name, "app-staging");
            assert_eq!(resolved.aws.ecs.service.name, "app-staging");
            assert_eq!(resolved.aws.ecs.task_definition.family, "app-staging");
            assert_eq!(resolved.aws.ecs.load_balancer.name, "app-staging");
            assert_eq!(resolved.aws.ecs.target_group.name, "app-staging");
            assert_eq!(resolved.aws.ecs.log_group.name, "app-staging");
            assert_eq!(resolved.docker.name, "app-staging");
            assert_eq!(resolved.docker.repository.name, "app-staging");
        }
    }

    #[test]
    fn environment_override_beats_descriptor_level() {
        let yaml = r#"
name: app
aws:
  region: us-east-1
environments:
  staging:
    aws:
      region: eu-west-1
"#;
        let resolved = resolve(&descriptor(yaml), Some("staging")).unwrap();
        assert_eq!(resolved.aws.region, "eu-west-1");
    }

    #[test]
    fn descriptor_level_beats_computed_defaults() {
        let yaml = r#"
name: app
aws:
  ecs:
    targetGroup:
      port: 8080
"#;
        let resolved = resolve(&descriptor(yaml), None).unwrap();
        assert_eq!(resolved.aws.ecs.target_group.port, 8080);
    }

    #[test]
    fn service_references_task_family_unless_overridden() {
        let resolved = resolve(&descriptor("name: app"), None).unwrap();
        assert_eq!(
            resolved.aws.ecs.service.task_definition,
            resolved.aws.ecs.task_definition.family
        );

        let yaml = r#"
name: app
aws:
  ecs:
    service:
      taskDefinition: custom-family
"#;
        let resolved = resolve(&descriptor(yaml), None).unwrap();
        assert_eq!(resolved.aws.ecs.service.task_definition, "custom-family");
    }

    #[test]
    fn load_balancer_binding_matches_primary_container() {
        let yaml = r#"
name: app
aws:
  ecs:
    taskDefinition:
      containers:
        - name: web
          portMappings:
            - containerPort: 3000
"#;
        let resolved = resolve(&descriptor(yaml), None).unwrap();
        let service = &resolved.aws.ecs.service;
        let primary = resolved.aws.ecs.task_definition.primary_container();
        assert_eq!(service.container_name, primary.name);
        assert_eq!(service.container_name, "web");
        assert_eq!(service.container_port, 3000);
    }

    #[test]
    fn target_group_inherits_vpc_id() {
        let yaml = r#"
name: app
aws:
  vpcId: vpc-12345
"#;
        let resolved = resolve(&descriptor(yaml), None).unwrap();
        assert_eq!(resolved.aws.ecs.target_group.vpc_id.as_deref(), Some("vpc-12345"));

        // explicit target group VPC wins
        let d = Descriptor {
            aws: Some(crate::config::AwsOptions {
                vpc_id: Some("vpc-12345".to_string()),
                ecs: Some(crate::config::EcsOptions {
                    target_group: Some(TargetGroupOptions {
                        vpc_id: Some("vpc-99999".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..descriptor("name: app")
        };
        let resolved = resolve(&d, None).unwrap();
        assert_eq!(resolved.aws.ecs.target_group.vpc_id.as_deref(), Some("vpc-99999"));
    }

    #[test]
    fn desired_count_stays_unset_without_explicit_config() {
        let resolved = resolve(&descriptor("name: app"), None).unwrap();
        assert_eq!(resolved.aws.ecs.service.desired_count, None);

        let yaml = r#"
name: app
aws:
  ecs:
    service:
      desiredCount: 3
"#;
        let resolved = resolve(&descriptor(yaml), None).unwrap();
        assert_eq!(resolved.aws.ecs.service.desired_count, Some(3));
    }

    #[test]
    fn secondary_container_requires_a_name() {
        let yaml = r#"
name: app
aws:
  ecs:
    taskDefinition:
      containers:
        - {}
        - image: redis:6
"#;
        let err = resolve(&descriptor(yaml), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { field } if field.contains("containers[1]")));
    }

    #[test]
    fn resolution_does_not_mutate_the_descriptor() {
        let d = descriptor("name: app\nenvironments:\n  staging:\n    suffix: staging\n");
        let before = d.clone();
        let _ = resolve(&d, Some("staging")).unwrap();
        assert_eq!(d, before);
    }
}
