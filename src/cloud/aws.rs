//! AWS implementation of the control plane.
//!
//! Thin translation layer: every trait method is one SDK call plus response
//! mapping. Permission failures (access denied, unrecognized client, bad or
//! expired signatures) are classified into [`CloudError::PermissionDenied`]
//! so the top-level handler can print a "missing permissions" diagnostic;
//! everything else is surfaced unchanged as [`CloudError::Api`].

use super::{
    Cluster, ControlPlane, EcsService, Listener, LoadBalancer, LogGroup, RegistryCredentials,
    Repository, ServicePlan, TargetGroup, TaskDefinition,
};
use crate::config::{
    ListenerConfig, LoadBalancerConfig, LogGroupConfig, ResolvedAws, TargetGroupConfig,
    TaskDefinitionConfig,
};
use crate::error::CloudError;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ecs::error::{ProvideErrorMetadata, SdkError};
use base64::Engine;
use tracing::debug;

/// Error codes that indicate an authorization problem rather than a bad
/// request. These are terminal: re-running will not help until the IAM
/// policy or credentials change.
const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "SignatureDoesNotMatch",
    "InvalidClientTokenId",
    "ExpiredToken",
    "ExpiredTokenException",
];

fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> CloudError
where
    SdkError<E, R>: ProvideErrorMetadata,
{
    let code = err.code().unwrap_or_default().to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| "request rejected by AWS".to_string());
    if PERMISSION_CODES.contains(&code.as_str()) {
        CloudError::PermissionDenied {
            operation: operation.to_string(),
            message,
        }
    } else {
        CloudError::Api {
            operation: operation.to_string(),
            message: if code.is_empty() {
                message
            } else {
                format!("{code}: {message}")
            },
        }
    }
}

fn error_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    SdkError<E, R>: ProvideErrorMetadata,
{
    err.code()
}

pub struct AwsControlPlane {
    ecr: aws_sdk_ecr::Client,
    ecs: aws_sdk_ecs::Client,
    elb: aws_sdk_elasticloadbalancingv2::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
}

impl AwsControlPlane {
    /// Build clients for the resolved region and credential profile.
    pub async fn connect(aws: &ResolvedAws) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(aws.region.clone()))
            .profile_name(&aws.profile)
            .load()
            .await;
        debug!(
            region = %aws.region,
            profile = %aws.profile,
            "Connected to AWS control plane"
        );
        Self {
            ecr: aws_sdk_ecr::Client::new(&config),
            ecs: aws_sdk_ecs::Client::new(&config),
            elb: aws_sdk_elasticloadbalancingv2::Client::new(&config),
            logs: aws_sdk_cloudwatchlogs::Client::new(&config),
        }
    }
}

#[async_trait]
impl ControlPlane for AwsControlPlane {
    async fn describe_repository(&self, name: &str) -> Result<Option<Repository>, CloudError> {
        match self
            .ecr
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(output) => Ok(output.repositories().first().map(|r| Repository {
                name: r.repository_name().unwrap_or(name).to_string(),
                uri: r.repository_uri().unwrap_or_default().to_string(),
            })),
            Err(err) if error_code(&err) == Some("RepositoryNotFoundException") => Ok(None),
            Err(err) => Err(classify("ecr:DescribeRepositories", err)),
        }
    }

    async fn create_repository(&self, name: &str) -> Result<Repository, CloudError> {
        let output = self
            .ecr
            .create_repository()
            .repository_name(name)
            .send()
            .await
            .map_err(|e| classify("ecr:CreateRepository", e))?;
        let repository = output.repository().ok_or_else(|| CloudError::Api {
            operation: "ecr:CreateRepository".to_string(),
            message: "response contained no repository".to_string(),
        })?;
        Ok(Repository {
            name: repository.repository_name().unwrap_or(name).to_string(),
            uri: repository.repository_uri().unwrap_or_default().to_string(),
        })
    }

    async fn registry_credentials(&self) -> Result<RegistryCredentials, CloudError> {
        let output = self
            .ecr
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| classify("ecr:GetAuthorizationToken", e))?;
        let data = output
            .authorization_data()
            .first()
            .ok_or_else(|| CloudError::Api {
                operation: "ecr:GetAuthorizationToken".to_string(),
                message: "response contained no authorization data".to_string(),
            })?;
        let token = data.authorization_token().unwrap_or_default();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(token)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| CloudError::Api {
                operation: "ecr:GetAuthorizationToken".to_string(),
                message: "authorization token is not valid base64".to_string(),
            })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| CloudError::Api {
            operation: "ecr:GetAuthorizationToken".to_string(),
            message: "authorization token has no user:password separator".to_string(),
        })?;
        Ok(RegistryCredentials {
            username: username.to_string(),
            password: password.to_string(),
            endpoint: data.proxy_endpoint().unwrap_or_default().to_string(),
        })
    }

    async fn describe_cluster(&self, name: &str) -> Result<Option<Cluster>, CloudError> {
        let output = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| classify("ecs:DescribeClusters", e))?;
        Ok(output
            .clusters()
            .iter()
            .find(|c| c.cluster_name() == Some(name))
            .map(|c| Cluster {
                name: name.to_string(),
                arn: c.cluster_arn().unwrap_or_default().to_string(),
                status: c.status().unwrap_or_default().to_string(),
            }))
    }

    async fn create_cluster(&self, name: &str) -> Result<Cluster, CloudError> {
        let output = self
            .ecs
            .create_cluster()
            .cluster_name(name)
            .send()
            .await
            .map_err(|e| classify("ecs:CreateCluster", e))?;
        let cluster = output.cluster().ok_or_else(|| CloudError::Api {
            operation: "ecs:CreateCluster".to_string(),
            message: "response contained no cluster".to_string(),
        })?;
        Ok(Cluster {
            name: name.to_string(),
            arn: cluster.cluster_arn().unwrap_or_default().to_string(),
            status: cluster.status().unwrap_or("ACTIVE").to_string(),
        })
    }

    async fn delete_cluster(&self, name: &str) -> Result<(), CloudError> {
        self.ecs
            .delete_cluster()
            .cluster(name)
            .send()
            .await
            .map_err(|e| classify("ecs:DeleteCluster", e))?;
        Ok(())
    }

    async fn describe_load_balancer(
        &self,
        name: &str,
    ) -> Result<Option<LoadBalancer>, CloudError> {
        match self.elb.describe_load_balancers().names(name).send().await {
            Ok(output) => Ok(output.load_balancers().first().map(|lb| LoadBalancer {
                name: name.to_string(),
                arn: lb.load_balancer_arn().unwrap_or_default().to_string(),
                dns_name: lb.dns_name().map(str::to_string),
            })),
            Err(err) if error_code(&err) == Some("LoadBalancerNotFound") => Ok(None),
            Err(err) if error_code(&err) == Some("LoadBalancerNotFoundException") => Ok(None),
            Err(err) => Err(classify("elasticloadbalancing:DescribeLoadBalancers", err)),
        }
    }

    async fn create_load_balancer(
        &self,
        spec: &LoadBalancerConfig,
    ) -> Result<LoadBalancer, CloudError> {
        let mut request = self.elb.create_load_balancer().name(&spec.name);
        for subnet in &spec.subnets {
            request = request.subnets(subnet);
        }
        for group in &spec.security_groups {
            request = request.security_groups(group);
        }
        let output = request
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing:CreateLoadBalancer", e))?;
        let lb = output
            .load_balancers()
            .first()
            .ok_or_else(|| CloudError::Api {
                operation: "elasticloadbalancing:CreateLoadBalancer".to_string(),
                message: "response contained no load balancer".to_string(),
            })?;
        Ok(LoadBalancer {
            name: spec.name.clone(),
            arn: lb.load_balancer_arn().unwrap_or_default().to_string(),
            dns_name: lb.dns_name().map(str::to_string),
        })
    }

    async fn describe_target_group(&self, name: &str) -> Result<Option<TargetGroup>, CloudError> {
        match self.elb.describe_target_groups().names(name).send().await {
            Ok(output) => Ok(output.target_groups().first().map(|tg| TargetGroup {
                name: name.to_string(),
                arn: tg.target_group_arn().unwrap_or_default().to_string(),
            })),
            Err(err) if error_code(&err) == Some("TargetGroupNotFound") => Ok(None),
            Err(err) if error_code(&err) == Some("TargetGroupNotFoundException") => Ok(None),
            Err(err) => Err(classify("elasticloadbalancing:DescribeTargetGroups", err)),
        }
    }

    async fn create_target_group(
        &self,
        spec: &TargetGroupConfig,
        vpc_id: &str,
    ) -> Result<TargetGroup, CloudError> {
        use aws_sdk_elasticloadbalancingv2::types::ProtocolEnum;

        let output = self
            .elb
            .create_target_group()
            .name(&spec.name)
            .protocol(ProtocolEnum::from(spec.protocol.as_str()))
            .port(spec.port)
            .vpc_id(vpc_id)
            .health_check_path(&spec.health_check_path)
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing:CreateTargetGroup", e))?;
        let tg = output
            .target_groups()
            .first()
            .ok_or_else(|| CloudError::Api {
                operation: "elasticloadbalancing:CreateTargetGroup".to_string(),
                message: "response contained no target group".to_string(),
            })?;
        Ok(TargetGroup {
            name: spec.name.clone(),
            arn: tg.target_group_arn().unwrap_or_default().to_string(),
        })
    }

    async fn describe_listeners(
        &self,
        load_balancer_arn: &str,
    ) -> Result<Vec<Listener>, CloudError> {
        let output = self
            .elb
            .describe_listeners()
            .load_balancer_arn(load_balancer_arn)
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing:DescribeListeners", e))?;
        Ok(output
            .listeners()
            .iter()
            .map(|l| Listener {
                arn: l.listener_arn().unwrap_or_default().to_string(),
                port: l.port().unwrap_or_default(),
            })
            .collect())
    }

    async fn create_listener(
        &self,
        load_balancer_arn: &str,
        target_group_arn: &str,
        spec: &ListenerConfig,
    ) -> Result<Listener, CloudError> {
        use aws_sdk_elasticloadbalancingv2::types::{Action, ActionTypeEnum, ProtocolEnum};

        let forward = Action::builder()
            .r#type(ActionTypeEnum::Forward)
            .target_group_arn(target_group_arn)
            .build();
        let output = self
            .elb
            .create_listener()
            .load_balancer_arn(load_balancer_arn)
            .protocol(ProtocolEnum::from(spec.protocol.as_str()))
            .port(spec.port)
            .default_actions(forward)
            .send()
            .await
            .map_err(|e| classify("elasticloadbalancing:CreateListener", e))?;
        let listener = output.listeners().first().ok_or_else(|| CloudError::Api {
            operation: "elasticloadbalancing:CreateListener".to_string(),
            message: "response contained no listener".to_string(),
        })?;
        Ok(Listener {
            arn: listener.listener_arn().unwrap_or_default().to_string(),
            port: listener.port().unwrap_or(spec.port),
        })
    }

    async fn describe_log_group(&self, name: &str) -> Result<Option<LogGroup>, CloudError> {
        let output = self
            .logs
            .describe_log_groups()
            .log_group_name_prefix(name)
            .send()
            .await
            .map_err(|e| classify("logs:DescribeLogGroups", e))?;
        // prefix query; only an exact name counts as existing
        Ok(output
            .log_groups()
            .iter()
            .find(|g| g.log_group_name() == Some(name))
            .map(|g| LogGroup {
                name: g.log_group_name().unwrap_or(name).to_string(),
            }))
    }

    async fn create_log_group(&self, spec: &LogGroupConfig) -> Result<(), CloudError> {
        self.logs
            .create_log_group()
            .log_group_name(&spec.name)
            .send()
            .await
            .map_err(|e| classify("logs:CreateLogGroup", e))?;
        if let Some(days) = spec.retention_days {
            self.logs
                .put_retention_policy()
                .log_group_name(&spec.name)
                .retention_in_days(days)
                .send()
                .await
                .map_err(|e| classify("logs:PutRetentionPolicy", e))?;
        }
        Ok(())
    }

    async fn register_task_definition(
        &self,
        spec: &TaskDefinitionConfig,
        primary_image: &str,
        log_group: &LogGroupConfig,
        region: &str,
    ) -> Result<TaskDefinition, CloudError> {
        use aws_sdk_ecs::types::{
            ContainerDefinition, KeyValuePair, LogConfiguration, LogDriver, NetworkMode,
            PortMapping, TransportProtocol,
        };

        let mut request = self
            .ecs
            .register_task_definition()
            .family(&spec.family)
            .network_mode(NetworkMode::from(spec.network_mode.as_str()));
        if let Some(cpu) = &spec.cpu {
            request = request.cpu(cpu);
        }
        if let Some(memory) = &spec.memory {
            request = request.memory(memory);
        }

        for (index, container) in spec.containers.iter().enumerate() {
            let image = match (&container.image, index) {
                (Some(image), _) => image.clone(),
                // the primary container always runs the freshly pushed image
                (None, 0) => primary_image.to_string(),
                (None, _) => {
                    return Err(CloudError::Api {
                        operation: "ecs:RegisterTaskDefinition".to_string(),
                        message: format!("container {index} has no image configured"),
                    })
                }
            };

            let log_configuration = LogConfiguration::builder()
                .log_driver(LogDriver::Awslogs)
                .options("awslogs-group", &log_group.name)
                .options("awslogs-region", region)
                .options("awslogs-stream-prefix", &container.name)
                .build()
                .map_err(|e| CloudError::Api {
                    operation: "ecs:RegisterTaskDefinition".to_string(),
                    message: e.to_string(),
                })?;

            let mut builder = ContainerDefinition::builder()
                .name(&container.name)
                .image(image)
                .essential(container.essential)
                .log_configuration(log_configuration);
            if let Some(cpu) = container.cpu {
                builder = builder.cpu(cpu);
            }
            if let Some(memory) = container.memory {
                builder = builder.memory(memory);
            }
            if let Some(reservation) = container.memory_reservation {
                builder = builder.memory_reservation(reservation);
            }
            for mapping in &container.port_mappings {
                builder = builder.port_mappings(
                    PortMapping::builder()
                        .container_port(mapping.container_port)
                        .host_port(mapping.host_port)
                        .protocol(TransportProtocol::from(mapping.protocol.as_str()))
                        .build(),
                );
            }
            for env in &container.environment {
                builder = builder.environment(
                    KeyValuePair::builder()
                        .name(&env.name)
                        .value(&env.value)
                        .build(),
                );
            }
            if let Some(command) = &container.command {
                for part in command {
                    builder = builder.command(part);
                }
            }
            request = request.container_definitions(builder.build());
        }

        let output = request
            .send()
            .await
            .map_err(|e| classify("ecs:RegisterTaskDefinition", e))?;
        let td = output.task_definition().ok_or_else(|| CloudError::Api {
            operation: "ecs:RegisterTaskDefinition".to_string(),
            message: "response contained no task definition".to_string(),
        })?;
        Ok(TaskDefinition {
            family: td.family().unwrap_or(&spec.family).to_string(),
            revision: td.revision(),
            arn: td.task_definition_arn().unwrap_or_default().to_string(),
        })
    }

    async fn describe_service(
        &self,
        cluster: &str,
        name: &str,
    ) -> Result<Option<EcsService>, CloudError> {
        let output = match self
            .ecs
            .describe_services()
            .cluster(cluster)
            .services(name)
            .send()
            .await
        {
            Ok(output) => output,
            // a cluster that was never provisioned has no services either
            Err(err) if error_code(&err) == Some("ClusterNotFoundException") => return Ok(None),
            Err(err) => return Err(classify("ecs:DescribeServices", err)),
        };
        Ok(output
            .services()
            .iter()
            .find(|s| s.service_name() == Some(name))
            .map(|s| EcsService {
                name: name.to_string(),
                arn: s.service_arn().unwrap_or_default().to_string(),
                status: s.status().unwrap_or_default().to_string(),
            }))
    }

    async fn create_service(&self, plan: &ServicePlan<'_>) -> Result<EcsService, CloudError> {
        use aws_sdk_ecs::types::{LaunchType, LoadBalancer as ServiceLoadBalancer};

        let binding = ServiceLoadBalancer::builder()
            .target_group_arn(plan.target_group_arn)
            .container_name(&plan.service.container_name)
            .container_port(plan.service.container_port)
            .build();
        let output = self
            .ecs
            .create_service()
            .cluster(plan.cluster_arn)
            .service_name(&plan.service.name)
            .task_definition(plan.task_definition_arn)
            .desired_count(plan.service.desired_count.unwrap_or(1))
            .launch_type(LaunchType::from(plan.service.launch_type.as_str()))
            .load_balancers(binding)
            .send()
            .await
            .map_err(|e| classify("ecs:CreateService", e))?;
        let service = output.service().ok_or_else(|| CloudError::Api {
            operation: "ecs:CreateService".to_string(),
            message: "response contained no service".to_string(),
        })?;
        Ok(EcsService {
            name: plan.service.name.clone(),
            arn: service.service_arn().unwrap_or_default().to_string(),
            status: service.status().unwrap_or("ACTIVE").to_string(),
        })
    }

    async fn update_service(
        &self,
        cluster: &str,
        name: &str,
        task_definition_arn: &str,
        desired_count: Option<i32>,
    ) -> Result<EcsService, CloudError> {
        let mut request = self
            .ecs
            .update_service()
            .cluster(cluster)
            .service(name)
            .task_definition(task_definition_arn)
            .force_new_deployment(true);
        if let Some(count) = desired_count {
            request = request.desired_count(count);
        }
        let output = request
            .send()
            .await
            .map_err(|e| classify("ecs:UpdateService", e))?;
        let service = output.service().ok_or_else(|| CloudError::Api {
            operation: "ecs:UpdateService".to_string(),
            message: "response contained no service".to_string(),
        })?;
        Ok(EcsService {
            name: name.to_string(),
            arn: service.service_arn().unwrap_or_default().to_string(),
            status: service.status().unwrap_or("ACTIVE").to_string(),
        })
    }

    async fn delete_service(&self, cluster: &str, name: &str) -> Result<(), CloudError> {
        self.ecs
            .delete_service()
            .cluster(cluster)
            .service(name)
            .force(true)
            .send()
            .await
            .map_err(|e| classify("ecs:DeleteService", e))?;
        Ok(())
    }
}
