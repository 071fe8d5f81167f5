//! Resource reconciliation.
//!
//! Each `ensure_*` operation follows describe → decide → act and is
//! idempotent (except task-definition registration, which is versioned by
//! the platform and intentionally registers a new revision on every call).
//!
//! `apply` converges the full resource set in a fixed dependency order;
//! later steps consume identifiers produced by earlier ones. `deploy` is the
//! lighter redeploy path: it registers a new revision and forces a new
//! deployment on the existing service, and refuses to create foundational
//! resources — a missing service means `apply` was never run.
//!
//! Errors the reconciler does not specifically recognize bubble up
//! untouched; permission failures and configuration gaps are intercepted
//! only to produce a better diagnostic before the process terminates.

use super::{
    Cluster, ControlPlane, EcsService, LoadBalancer, Repository, ServicePlan, TargetGroup,
    TaskDefinition,
};
use crate::config::ResolvedConfig;
use crate::error::ProvisionError;
use tracing::{debug, info};

pub struct Reconciler<'a> {
    config: &'a ResolvedConfig,
    cloud: &'a dyn ControlPlane,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a ResolvedConfig, cloud: &'a dyn ControlPlane) -> Self {
        Self { config, cloud }
    }

    /// Converge every resource, in dependency order.
    pub async fn apply(&self) -> Result<(), ProvisionError> {
        let repository = self.ensure_repository().await?;
        let cluster = self.ensure_cluster().await?;
        let load_balancer = self.ensure_load_balancer().await?;
        let target_group = self.ensure_target_group().await?;
        self.ensure_listener(&load_balancer, &target_group).await?;
        self.ensure_log_group().await?;
        let task_definition = self
            .register_task_definition(&format!("{}:latest", repository.uri))
            .await?;
        self.ensure_service(&cluster, &target_group, &task_definition)
            .await?;
        Ok(())
    }

    /// Redeploy: new task-definition revision + forced deployment on the
    /// existing service. Never creates foundational resources.
    pub async fn deploy(&self) -> Result<EcsService, ProvisionError> {
        let repository_name = &self.config.docker.repository.name;
        let repository = self
            .cloud
            .describe_repository(repository_name)
            .await?
            .ok_or_else(|| ProvisionError::MissingPrerequisite {
                resource: "Repository".to_string(),
                name: repository_name.clone(),
            })?;

        let task_definition = self
            .register_task_definition(&format!("{}:latest", repository.uri))
            .await?;

        let ecs = &self.config.aws.ecs;
        let service = self
            .cloud
            .describe_service(&ecs.cluster.name, &ecs.service.name)
            .await?
            .filter(|s| !s.is_inactive())
            .ok_or_else(|| ProvisionError::MissingPrerequisite {
                resource: "Service".to_string(),
                name: ecs.service.name.clone(),
            })?;

        info!("Forcing new deployment of service {}", service.name);
        let service = self
            .cloud
            .update_service(
                &ecs.cluster.name,
                &ecs.service.name,
                &task_definition.arn,
                ecs.service.desired_count,
            )
            .await?;
        Ok(service)
    }

    /// Describe-only repository lookup for the push path.
    pub async fn repository_uri(&self) -> Result<String, ProvisionError> {
        let name = &self.config.docker.repository.name;
        self.cloud
            .describe_repository(name)
            .await?
            .map(|r| r.uri)
            .ok_or_else(|| ProvisionError::MissingPrerequisite {
                resource: "Repository".to_string(),
                name: name.clone(),
            })
    }

    /// Create the repository if absent. Never deletes or recreates.
    pub async fn ensure_repository(&self) -> Result<Repository, ProvisionError> {
        let name = &self.config.docker.repository.name;
        if let Some(repository) = self.cloud.describe_repository(name).await? {
            debug!("Repository {name} already exists");
            return Ok(repository);
        }
        info!("Creating image repository {name}");
        Ok(self.cloud.create_repository(name).await?)
    }

    /// Create the cluster if absent; an INACTIVE leftover is deleted first.
    pub async fn ensure_cluster(&self) -> Result<Cluster, ProvisionError> {
        let name = &self.config.aws.ecs.cluster.name;
        if let Some(cluster) = self.cloud.describe_cluster(name).await? {
            if !cluster.is_inactive() {
                debug!("Cluster {name} already exists");
                return Ok(cluster);
            }
            info!("Cluster {name} is INACTIVE, deleting before re-creating");
            self.cloud.delete_cluster(name).await?;
        }
        info!("Creating ECS cluster {name}");
        Ok(self.cloud.create_cluster(name).await?)
    }

    /// Create the load balancer if absent. Requires configured subnets —
    /// their absence is a configuration gap, not a transient error.
    pub async fn ensure_load_balancer(&self) -> Result<LoadBalancer, ProvisionError> {
        let spec = &self.config.aws.ecs.load_balancer;
        if let Some(load_balancer) = self.cloud.describe_load_balancer(&spec.name).await? {
            debug!("Load balancer {} already exists", spec.name);
            return Ok(load_balancer);
        }
        if spec.subnets.is_empty() {
            return Err(ProvisionError::MissingConfiguration {
                resource: "load balancer".to_string(),
                field: "subnets".to_string(),
                section: "aws.ecs.loadBalancer.subnets".to_string(),
            });
        }
        info!("Creating load balancer {}", spec.name);
        Ok(self.cloud.create_load_balancer(spec).await?)
    }

    /// Create the target group if absent. Requires a VPC id.
    pub async fn ensure_target_group(&self) -> Result<TargetGroup, ProvisionError> {
        let spec = &self.config.aws.ecs.target_group;
        if let Some(target_group) = self.cloud.describe_target_group(&spec.name).await? {
            debug!("Target group {} already exists", spec.name);
            return Ok(target_group);
        }
        let vpc_id = spec
            .vpc_id
            .as_deref()
            .ok_or_else(|| ProvisionError::MissingConfiguration {
                resource: "target group".to_string(),
                field: "vpcId".to_string(),
                section: "aws.vpcId".to_string(),
            })?;
        info!("Creating target group {}", spec.name);
        Ok(self.cloud.create_target_group(spec, vpc_id).await?)
    }

    /// Create a listener only when the load balancer has none. Existing
    /// listeners are never modified.
    pub async fn ensure_listener(
        &self,
        load_balancer: &LoadBalancer,
        target_group: &TargetGroup,
    ) -> Result<(), ProvisionError> {
        let listeners = self.cloud.describe_listeners(&load_balancer.arn).await?;
        if !listeners.is_empty() {
            debug!(
                "Load balancer {} already has {} listener(s)",
                load_balancer.name,
                listeners.len()
            );
            return Ok(());
        }
        let spec = &self.config.aws.ecs.listener;
        info!(
            "Creating {} listener on port {} for {}",
            spec.protocol, spec.port, load_balancer.name
        );
        self.cloud
            .create_listener(&load_balancer.arn, &target_group.arn, spec)
            .await?;
        Ok(())
    }

    /// Create the log group only when no exact name match exists.
    pub async fn ensure_log_group(&self) -> Result<(), ProvisionError> {
        let spec = &self.config.aws.ecs.log_group;
        if self.cloud.describe_log_group(&spec.name).await?.is_some() {
            debug!("Log group {} already exists", spec.name);
            return Ok(());
        }
        info!("Creating log group {}", spec.name);
        self.cloud.create_log_group(spec).await?;
        Ok(())
    }

    /// Register a new task-definition revision with the pushed image merged
    /// into the primary container. Intentionally not idempotent.
    pub async fn register_task_definition(
        &self,
        image: &str,
    ) -> Result<TaskDefinition, ProvisionError> {
        let ecs = &self.config.aws.ecs;
        for (index, container) in ecs.task_definition.containers.iter().enumerate() {
            if index > 0 && container.image.is_none() {
                return Err(ProvisionError::MissingConfiguration {
                    resource: "task definition".to_string(),
                    field: format!("containers[{index}].image"),
                    section: "aws.ecs.taskDefinition.containers".to_string(),
                });
            }
        }
        info!(
            "Registering new revision of task definition {}",
            ecs.task_definition.family
        );
        let task_definition = self
            .cloud
            .register_task_definition(
                &ecs.task_definition,
                image,
                &ecs.log_group,
                &self.config.aws.region,
            )
            .await?;
        debug!(
            "Registered {}:{}",
            task_definition.family, task_definition.revision
        );
        Ok(task_definition)
    }

    /// Create or redeploy the service. An INACTIVE leftover is deleted and
    /// recreated; an active service is updated in place with a forced
    /// deployment, leaving desired count and load-balancer bindings alone
    /// unless explicitly configured.
    pub async fn ensure_service(
        &self,
        cluster: &Cluster,
        target_group: &TargetGroup,
        task_definition: &TaskDefinition,
    ) -> Result<EcsService, ProvisionError> {
        let ecs = &self.config.aws.ecs;
        let spec = &ecs.service;

        let existing = self
            .cloud
            .describe_service(&ecs.cluster.name, &spec.name)
            .await?;

        if let Some(service) = existing {
            if !service.is_inactive() {
                info!("Updating service {} with a forced deployment", spec.name);
                return Ok(self
                    .cloud
                    .update_service(
                        &ecs.cluster.name,
                        &spec.name,
                        &task_definition.arn,
                        spec.desired_count,
                    )
                    .await?);
            }
            info!("Service {} is INACTIVE, deleting before re-creating", spec.name);
            self.cloud.delete_service(&ecs.cluster.name, &spec.name).await?;
        }

        info!("Creating service {}", spec.name);
        let plan = ServicePlan {
            service: spec,
            cluster_arn: &cluster.arn,
            target_group_arn: &target_group.arn,
            task_definition_arn: &task_definition.arn,
        };
        Ok(self.cloud.create_service(&plan).await?)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory control plane that records every call for ordering
    //! assertions.

    use super::super::*;
    use crate::config::{
        ListenerConfig, LoadBalancerConfig, LogGroupConfig, TargetGroupConfig,
        TaskDefinitionConfig,
    };
    use crate::error::CloudError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeState {
        pub repositories: Vec<Repository>,
        pub clusters: Vec<Cluster>,
        pub load_balancers: Vec<LoadBalancer>,
        pub target_groups: Vec<TargetGroup>,
        pub listeners: Vec<Listener>,
        pub log_groups: Vec<LogGroup>,
        pub task_revisions: i32,
        pub services: Vec<EcsService>,
    }

    #[derive(Default)]
    pub struct FakeControlPlane {
        pub state: Mutex<FakeState>,
        pub calls: Mutex<Vec<String>>,
        /// When set, every call fails with this error
        pub deny: Option<String>,
    }

    impl FakeControlPlane {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) -> Result<(), CloudError> {
            self.calls.lock().unwrap().push(call.to_string());
            if let Some(operation) = &self.deny {
                return Err(CloudError::PermissionDenied {
                    operation: operation.clone(),
                    message: "explicit deny".to_string(),
                });
            }
            Ok(())
        }

        pub fn with_cluster(self, name: &str, status: &str) -> Self {
            self.state.lock().unwrap().clusters.push(Cluster {
                name: name.to_string(),
                arn: format!("arn:cluster/{name}"),
                status: status.to_string(),
            });
            self
        }

        pub fn with_repository(self, name: &str) -> Self {
            self.state.lock().unwrap().repositories.push(Repository {
                name: name.to_string(),
                uri: format!("123456789.dkr.ecr.us-east-1.amazonaws.com/{name}"),
            });
            self
        }

        pub fn with_service(self, name: &str, status: &str) -> Self {
            self.state.lock().unwrap().services.push(EcsService {
                name: name.to_string(),
                arn: format!("arn:service/{name}"),
                status: status.to_string(),
            });
            self
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn describe_repository(
            &self,
            name: &str,
        ) -> Result<Option<Repository>, CloudError> {
            self.record("DescribeRepository")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .repositories
                .iter()
                .find(|r| r.name == name)
                .cloned())
        }

        async fn create_repository(&self, name: &str) -> Result<Repository, CloudError> {
            self.record("CreateRepository")?;
            let repository = Repository {
                name: name.to_string(),
                uri: format!("123456789.dkr.ecr.us-east-1.amazonaws.com/{name}"),
            };
            self.state
                .lock()
                .unwrap()
                .repositories
                .push(repository.clone());
            Ok(repository)
        }

        async fn registry_credentials(&self) -> Result<RegistryCredentials, CloudError> {
            self.record("GetAuthorizationToken")?;
            Ok(RegistryCredentials {
                username: "AWS".to_string(),
                password: "token".to_string(),
                endpoint: "https://123456789.dkr.ecr.us-east-1.amazonaws.com".to_string(),
            })
        }

        async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>, CloudError> {
            self.record("DescribeCluster")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .clusters
                .iter()
                .find(|c| c.name == name)
                .cloned())
        }

        async fn create_cluster(&self, name: &str) -> Result<Cluster, CloudError> {
            self.record("CreateCluster")?;
            let cluster = Cluster {
                name: name.to_string(),
                arn: format!("arn:cluster/{name}"),
                status: "ACTIVE".to_string(),
            };
            self.state.lock().unwrap().clusters.push(cluster.clone());
            Ok(cluster)
        }

        async fn delete_cluster(&self, name: &str) -> Result<(), CloudError> {
            self.record("DeleteCluster")?;
            self.state
                .lock()
                .unwrap()
                .clusters
                .retain(|c| c.name != name);
            Ok(())
        }

        async fn describe_load_balancer(
            &self,
            name: &str,
        ) -> Result<Option<LoadBalancer>, CloudError> {
            self.record("DescribeLoadBalancer")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .load_balancers
                .iter()
                .find(|l| l.name == name)
                .cloned())
        }

        async fn create_load_balancer(
            &self,
            spec: &LoadBalancerConfig,
        ) -> Result<LoadBalancer, CloudError> {
            self.record("CreateLoadBalancer")?;
            let load_balancer = LoadBalancer {
                name: spec.name.clone(),
                arn: format!("arn:loadbalancer/{}", spec.name),
                dns_name: Some(format!("{}.elb.amazonaws.com", spec.name)),
            };
            self.state
                .lock()
                .unwrap()
                .load_balancers
                .push(load_balancer.clone());
            Ok(load_balancer)
        }

        async fn describe_target_group(
            &self,
            name: &str,
        ) -> Result<Option<TargetGroup>, CloudError> {
            self.record("DescribeTargetGroup")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .target_groups
                .iter()
                .find(|t| t.name == name)
                .cloned())
        }

        async fn create_target_group(
            &self,
            spec: &TargetGroupConfig,
            _vpc_id: &str,
        ) -> Result<TargetGroup, CloudError> {
            self.record("CreateTargetGroup")?;
            let target_group = TargetGroup {
                name: spec.name.clone(),
                arn: format!("arn:targetgroup/{}", spec.name),
            };
            self.state
                .lock()
                .unwrap()
                .target_groups
                .push(target_group.clone());
            Ok(target_group)
        }

        async fn describe_listeners(
            &self,
            _load_balancer_arn: &str,
        ) -> Result<Vec<Listener>, CloudError> {
            self.record("DescribeListeners")?;
            Ok(self.state.lock().unwrap().listeners.clone())
        }

        async fn create_listener(
            &self,
            load_balancer_arn: &str,
            _target_group_arn: &str,
            spec: &ListenerConfig,
        ) -> Result<Listener, CloudError> {
            self.record("CreateListener")?;
            let listener = Listener {
                arn: format!("{load_balancer_arn}/listener"),
                port: spec.port,
            };
            self.state.lock().unwrap().listeners.push(listener.clone());
            Ok(listener)
        }

        async fn describe_log_group(&self, name: &str) -> Result<Option<LogGroup>, CloudError> {
            self.record("DescribeLogGroups")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .log_groups
                .iter()
                .find(|g| g.name == name)
                .cloned())
        }

        async fn create_log_group(&self, spec: &LogGroupConfig) -> Result<(), CloudError> {
            self.record("CreateLogGroup")?;
            self.state.lock().unwrap().log_groups.push(LogGroup {
                name: spec.name.clone(),
            });
            Ok(())
        }

        async fn register_task_definition(
            &self,
            spec: &TaskDefinitionConfig,
            _primary_image: &str,
            _log_group: &LogGroupConfig,
            _region: &str,
        ) -> Result<TaskDefinition, CloudError> {
            self.record("RegisterTaskDefinition")?;
            let mut state = self.state.lock().unwrap();
            state.task_revisions += 1;
            Ok(TaskDefinition {
                family: spec.family.clone(),
                revision: state.task_revisions,
                arn: format!("arn:task-definition/{}:{}", spec.family, state.task_revisions),
            })
        }

        async fn describe_service(
            &self,
            _cluster: &str,
            name: &str,
        ) -> Result<Option<EcsService>, CloudError> {
            self.record("DescribeServices")?;
            Ok(self
                .state
                .lock()
                .unwrap()
                .services
                .iter()
                .find(|s| s.name == name)
                .cloned())
        }

        async fn create_service(&self, plan: &ServicePlan<'_>) -> Result<EcsService, CloudError> {
            self.record("CreateService")?;
            let service = EcsService {
                name: plan.service.name.clone(),
                arn: format!("arn:service/{}", plan.service.name),
                status: "ACTIVE".to_string(),
            };
            self.state.lock().unwrap().services.push(service.clone());
            Ok(service)
        }

        async fn update_service(
            &self,
            _cluster: &str,
            name: &str,
            _task_definition_arn: &str,
            _desired_count: Option<i32>,
        ) -> Result<EcsService, CloudError> {
            self.record("UpdateService")?;
            Ok(EcsService {
                name: name.to_string(),
                arn: format!("arn:service/{name}"),
                status: "ACTIVE".to_string(),
            })
        }

        async fn delete_service(&self, _cluster: &str, name: &str) -> Result<(), CloudError> {
            self.record("DeleteService")?;
            self.state
                .lock()
                .unwrap()
                .services
                .retain(|s| s.name != name);
            Ok(())
        }
    }
}
