//! Cloud control-plane abstraction.
//!
//! The reconciler talks to the control plane exclusively through the
//! [`ControlPlane`] trait: describe/create/update/delete over the seven
//! resource kinds plus task-definition registration and registry
//! credentials. Any provider offering equivalent semantics can be
//! substituted; the production implementation is [`aws::AwsControlPlane`],
//! tests use an in-memory recording fake.

pub mod aws;
pub mod reconciler;

pub use reconciler::Reconciler;

use crate::config::{
    ListenerConfig, LoadBalancerConfig, LogGroupConfig, ServiceConfig, TargetGroupConfig,
    TaskDefinitionConfig,
};
use crate::error::CloudError;
use async_trait::async_trait;

/// Container image repository
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    pub name: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub name: String,
    pub arn: String,
    pub status: String,
}

impl Cluster {
    /// Terminal, non-usable state: the control plane still reports the
    /// cluster but it must be deleted before a same-named one can exist.
    pub fn is_inactive(&self) -> bool {
        self.status.eq_ignore_ascii_case("INACTIVE")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancer {
    pub name: String,
    pub arn: String,
    pub dns_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetGroup {
    pub name: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listener {
    pub arn: String,
    pub port: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogGroup {
    pub name: String,
}

/// One registered task-definition revision
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub family: String,
    pub revision: i32,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EcsService {
    pub name: String,
    pub arn: String,
    pub status: String,
}

impl EcsService {
    pub fn is_inactive(&self) -> bool {
        self.status.eq_ignore_ascii_case("INACTIVE")
    }
}

/// Docker registry credentials for pushing the built image
#[derive(Debug, Clone)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
    pub endpoint: String,
}

/// Everything `create_service` needs to wire the service together.
#[derive(Debug, Clone)]
pub struct ServicePlan<'a> {
    pub service: &'a ServiceConfig,
    pub cluster_arn: &'a str,
    pub target_group_arn: &'a str,
    pub task_definition_arn: &'a str,
}

/// Capability interface over the cloud control plane.
///
/// All describe operations return `Ok(None)` (or an empty list) for missing
/// resources; errors are reserved for failed calls. Permission failures are
/// classified into [`CloudError::PermissionDenied`] by the implementation.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn describe_repository(&self, name: &str) -> Result<Option<Repository>, CloudError>;
    async fn create_repository(&self, name: &str) -> Result<Repository, CloudError>;
    async fn registry_credentials(&self) -> Result<RegistryCredentials, CloudError>;

    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>, CloudError>;
    async fn create_cluster(&self, name: &str) -> Result<Cluster, CloudError>;
    async fn delete_cluster(&self, name: &str) -> Result<(), CloudError>;

    async fn describe_load_balancer(&self, name: &str)
        -> Result<Option<LoadBalancer>, CloudError>;
    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerConfig,
    ) -> Result<LoadBalancer, CloudError>;

    async fn describe_target_group(&self, name: &str) -> Result<Option<TargetGroup>, CloudError>;
    async fn create_target_group(
        &self,
        spec: &TargetGroupConfig,
        vpc_id: &str,
    ) -> Result<TargetGroup, CloudError>;

    async fn describe_listeners(&self, load_balancer_arn: &str)
        -> Result<Vec<Listener>, CloudError>;
    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        spec: &ListenerConfig,
    ) -> Result<Listener, CloudError>;

    async fn describe_log_group(&self, name: &str) -> Result<Option<LogGroup>, CloudError>;
    async fn create_log_group(&self, spec: &LogGroupConfig) -> Result<(), CloudError>;

    /// Registers a new revision on every call; the platform versions these.
    async fn register_task_definition(
        &self,
        spec: &TaskDefinitionConfig,
        primary_image: &str,
        log_group: &LogGroupConfig,
        region: &str,
    ) -> Result<TaskDefinition, CloudError>;

    async fn describe_service(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<EcsService>, CloudError>;
    async fn create_service(&self, plan: &ServicePlan<'_>) -> Result<EcsService, CloudError>;
    /// Update in place, always forcing a new deployment. `desired_count` is
    /// only sent when explicitly configured.
    async fn update_service(
        &self,
        cluster: &str,
        name: &str,
        task_definition_arn: &str,
        desired_count: Option<i32>,
    ) -> Result<EcsService, CloudError>;
    async fn delete_service(&self, cluster: &str, name: &str) -> Result<(), CloudError>;
}
