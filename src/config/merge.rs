//! Layered option merging.
//!
//! Each configuration structure merges with an explicit, per-field rule
//! rather than a generic reflective deep merge:
//!
//! - scalars: the higher-precedence non-null value wins wholesale
//! - nested option structs: merged recursively, field by field
//! - sequences of uniform objects (containers, port mappings): merged
//!   position-by-position — element *i* of the result merges element *i*
//!   from every layer that has one
//! - container `environment` lists: concatenated, lower layers first
//!
//! Precedence across the three layers is strictly increasing: computed
//! defaults ← descriptor-level options ← environment override. The two
//! user-supplied layers are combined here; the defaults layer is applied by
//! the resolver as per-field fallbacks.

use super::{
    AwsOptions, ClusterOptions, ContainerOptions, DockerOptions, EcsOptions, ListenerOptions,
    LoadBalancerOptions, LogGroupOptions, PortMappingOptions, RepositoryOptions, ServiceOptions,
    TargetGroupOptions, TaskDefinitionOptions,
};

/// Merge two optional sub-structures, recursing when both layers are present.
fn merge_opt<T>(over: Option<T>, base: Option<T>, merge: impl FnOnce(T, T) -> T) -> Option<T> {
    match (over, base) {
        (Some(o), Some(b)) => Some(merge(o, b)),
        (o, b) => o.or(b),
    }
}

/// Positional sequence merge: element *i* of the result merges element *i*
/// from every layer that has one; layers with fewer elements simply don't
/// contribute at that position.
pub(super) fn merge_positional<T>(
    over: Option<Vec<T>>,
    base: Option<Vec<T>>,
    merge: impl Fn(T, T) -> T,
) -> Option<Vec<T>> {
    merge_opt(over, base, |over, base| {
        let mut out = Vec::with_capacity(over.len().max(base.len()));
        let mut over = over.into_iter();
        let mut base = base.into_iter();
        loop {
            match (over.next(), base.next()) {
                (Some(o), Some(b)) => out.push(merge(o, b)),
                (Some(o), None) => out.push(o),
                (None, Some(b)) => out.push(b),
                (None, None) => break,
            }
        }
        out
    })
}

/// Concatenating sequence merge for independent key/value entries:
/// lower-precedence entries come first so later layers stay visible.
pub(super) fn concat<T>(over: Option<Vec<T>>, base: Option<Vec<T>>) -> Option<Vec<T>> {
    match (over, base) {
        (None, None) => None,
        (over, base) => {
            let mut out = base.unwrap_or_default();
            out.extend(over.unwrap_or_default());
            Some(out)
        }
    }
}

impl DockerOptions {
    /// `self` wins over `base` on every field.
    pub(super) fn merge_over(self, base: DockerOptions) -> DockerOptions {
        DockerOptions {
            name: self.name.or(base.name),
            dockerfile: self.dockerfile.or(base.dockerfile),
            build_args: concat(self.build_args, base.build_args),
            repository: merge_opt(self.repository, base.repository, RepositoryOptions::merge_over),
        }
    }
}

impl RepositoryOptions {
    fn merge_over(self, base: RepositoryOptions) -> RepositoryOptions {
        RepositoryOptions {
            kind: self.kind.or(base.kind),
            name: self.name.or(base.name),
        }
    }
}

impl AwsOptions {
    pub(super) fn merge_over(self, base: AwsOptions) -> AwsOptions {
        AwsOptions {
            region: self.region.or(base.region),
            profile: self.profile.or(base.profile),
            vpc_id: self.vpc_id.or(base.vpc_id),
            ecs: merge_opt(self.ecs, base.ecs, EcsOptions::merge_over),
        }
    }
}

impl EcsOptions {
    fn merge_over(self, base: EcsOptions) -> EcsOptions {
        EcsOptions {
            cluster: merge_opt(self.cluster, base.cluster, ClusterOptions::merge_over),
            load_balancer: merge_opt(
                self.load_balancer,
                base.load_balancer,
                LoadBalancerOptions::merge_over,
            ),
            target_group: merge_opt(
                self.target_group,
                base.target_group,
                TargetGroupOptions::merge_over,
            ),
            listener: merge_opt(self.listener, base.listener, ListenerOptions::merge_over),
            log_group: merge_opt(self.log_group, base.log_group, LogGroupOptions::merge_over),
            task_definition: merge_opt(
                self.task_definition,
                base.task_definition,
                TaskDefinitionOptions::merge_over,
            ),
            service: merge_opt(self.service, base.service, ServiceOptions::merge_over),
        }
    }
}

impl ClusterOptions {
    fn merge_over(self, base: ClusterOptions) -> ClusterOptions {
        ClusterOptions {
            name: self.name.or(base.name),
        }
    }
}

impl LoadBalancerOptions {
    fn merge_over(self, base: LoadBalancerOptions) -> LoadBalancerOptions {
        LoadBalancerOptions {
            name: self.name.or(base.name),
            subnets: self.subnets.or(base.subnets),
            security_groups: self.security_groups.or(base.security_groups),
        }
    }
}

impl TargetGroupOptions {
    fn merge_over(self, base: TargetGroupOptions) -> TargetGroupOptions {
        TargetGroupOptions {
            name: self.name.or(base.name),
            port: self.port.or(base.port),
            protocol: self.protocol.or(base.protocol),
            vpc_id: self.vpc_id.or(base.vpc_id),
            health_check_path: self.health_check_path.or(base.health_check_path),
        }
    }
}

impl ListenerOptions {
    fn merge_over(self, base: ListenerOptions) -> ListenerOptions {
        ListenerOptions {
            port: self.port.or(base.port),
            protocol: self.protocol.or(base.protocol),
        }
    }
}

impl LogGroupOptions {
    fn merge_over(self, base: LogGroupOptions) -> LogGroupOptions {
        LogGroupOptions {
            name: self.name.or(base.name),
            retention_days: self.retention_days.or(base.retention_days),
        }
    }
}

impl TaskDefinitionOptions {
    fn merge_over(self, base: TaskDefinitionOptions) -> TaskDefinitionOptions {
        TaskDefinitionOptions {
            family: self.family.or(base.family),
            network_mode: self.network_mode.or(base.network_mode),
            cpu: self.cpu.or(base.cpu),
            memory: self.memory.or(base.memory),
            containers: merge_positional(
                self.containers,
                base.containers,
                ContainerOptions::merge_over,
            ),
        }
    }
}

impl ContainerOptions {
    fn merge_over(self, base: ContainerOptions) -> ContainerOptions {
        ContainerOptions {
            name: self.name.or(base.name),
            image: self.image.or(base.image),
            cpu: self.cpu.or(base.cpu),
            memory: self.memory.or(base.memory),
            memory_reservation: self.memory_reservation.or(base.memory_reservation),
            essential: self.essential.or(base.essential),
            port_mappings: merge_positional(
                self.port_mappings,
                base.port_mappings,
                PortMappingOptions::merge_over,
            ),
            environment: concat(self.environment, base.environment),
            command: self.command.or(base.command),
        }
    }
}

impl PortMappingOptions {
    fn merge_over(self, base: PortMappingOptions) -> PortMappingOptions {
        PortMappingOptions {
            container_port: self.container_port.or(base.container_port),
            host_port: self.host_port.or(base.host_port),
            protocol: self.protocol.or(base.protocol),
        }
    }
}

impl ServiceOptions {
    fn merge_over(self, base: ServiceOptions) -> ServiceOptions {
        ServiceOptions {
            name: self.name.or(base.name),
            desired_count: self.desired_count.or(base.desired_count),
            task_definition: self.task_definition.or(base.task_definition),
            launch_type: self.launch_type.or(base.launch_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvVar;

    #[test]
    fn scalar_override_wins_wholesale() {
        let global = AwsOptions {
            region: Some("us-east-1".to_string()),
            profile: Some("myapp".to_string()),
            ..Default::default()
        };
        let env = AwsOptions {
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };
        let merged = env.merge_over(global);
        assert_eq!(merged.region.as_deref(), Some("eu-west-1"));
        // untouched fields fall through to the lower layer
        assert_eq!(merged.profile.as_deref(), Some("myapp"));
    }

    #[test]
    fn nested_structs_merge_field_by_field() {
        let global = AwsOptions {
            ecs: Some(EcsOptions {
                target_group: Some(TargetGroupOptions {
                    port: Some(8080),
                    health_check_path: Some("/health".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = AwsOptions {
            ecs: Some(EcsOptions {
                target_group: Some(TargetGroupOptions {
                    port: Some(9090),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let tg = env.merge_over(global).ecs.unwrap().target_group.unwrap();
        assert_eq!(tg.port, Some(9090));
        assert_eq!(tg.health_check_path.as_deref(), Some("/health"));
    }

    #[test]
    fn containers_merge_positionally() {
        let global = TaskDefinitionOptions {
            containers: Some(vec![
                ContainerOptions {
                    memory_reservation: Some(256),
                    ..Default::default()
                },
                ContainerOptions {
                    name: Some("sidecar".to_string()),
                    image: Some("redis:6".to_string()),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let env = TaskDefinitionOptions {
            containers: Some(vec![ContainerOptions {
                memory_reservation: Some(512),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let containers = env.merge_over(global).containers.unwrap();
        assert_eq!(containers.len(), 2);
        // element 0 merged across both layers
        assert_eq!(containers[0].memory_reservation, Some(512));
        // the layer with fewer elements doesn't contribute at position 1
        assert_eq!(containers[1].name.as_deref(), Some("sidecar"));
    }

    #[test]
    fn environment_entries_concatenate() {
        let global = ContainerOptions {
            environment: Some(vec![EnvVar {
                name: "LOG_LEVEL".to_string(),
                value: "info".to_string(),
            }]),
            ..Default::default()
        };
        let env = ContainerOptions {
            environment: Some(vec![EnvVar {
                name: "FEATURE_FLAG".to_string(),
                value: "on".to_string(),
            }]),
            ..Default::default()
        };
        let merged = env.merge_over(global).environment.unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "LOG_LEVEL");
        assert_eq!(merged[1].name, "FEATURE_FLAG");
    }

    #[test]
    fn merge_is_a_noop_against_empty_layers() {
        let options = AwsOptions {
            region: Some("ap-southeast-2".to_string()),
            ..Default::default()
        };
        let merged = options.clone().merge_over(AwsOptions::default());
        assert_eq!(merged, options);
        let merged = AwsOptions::default().merge_over(options.clone());
        assert_eq!(merged, options);
    }
}
