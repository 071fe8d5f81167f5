//! `slipway serve`: build the image and run it locally with the resolved
//! task-definition ports and environment, for parity with the deployed
//! container.

use crate::config::{resolve, substitute, Descriptor, SubstitutionMode};
use crate::{docker, ui};
use anyhow::Result;

pub async fn execute(environment: Option<String>) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let descriptor = Descriptor::load(&project_dir)?;

    let resolved = resolve(&descriptor, environment.as_deref())?;
    // strict: the container gets real values, exactly like a deployment
    let resolved = substitute(&resolved, SubstitutionMode::Strict)?;

    docker::build(&resolved, &project_dir).await?;

    let primary = resolved.aws.ecs.task_definition.primary_container();
    for mapping in &primary.port_mappings {
        let port = if mapping.host_port == 0 {
            mapping.container_port
        } else {
            mapping.host_port
        };
        ui::print_info(&format!("Serving {} on http://localhost:{port}", resolved.name));
    }

    docker::run(&resolved, &project_dir).await
}
