//! `slipway apply`: converge the AWS infrastructure for every enabled
//! environment (or a single one via `--environment`), sequentially.

use crate::cloud::{aws::AwsControlPlane, Reconciler};
use crate::config::{resolve, substitute, Descriptor, SubstitutionMode};
use crate::ui;
use anyhow::Result;

pub async fn execute(environment: Option<String>) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let descriptor = Descriptor::load(&project_dir)?;

    ui::print_info(&format!(
        "Creating AWS infrastructure for {} 🤞",
        descriptor.name
    ));

    match (&environment, &descriptor.environments) {
        (Some(name), _) => provision(&descriptor, Some(name.as_str())).await?,
        (None, Some(environments)) if !environments.is_empty() => {
            // one environment at a time: a failure must not leave the next
            // one partially applied
            for (name, env) in environments {
                if !env.enabled {
                    ui::print_warning(&format!("Skipping disabled environment {name}"));
                    continue;
                }
                ui::print_info(&format!("Provisioning {name} environment..."));
                provision(&descriptor, Some(name.as_str())).await?;
            }
        }
        (None, _) => provision(&descriptor, None).await?,
    }

    ui::print_success(&format!(
        "Successfully provisioned AWS infrastructure for {} 🏆",
        descriptor.name
    ));
    Ok(())
}

async fn provision(descriptor: &Descriptor, environment: Option<&str>) -> Result<()> {
    let resolved = resolve(descriptor, environment)?;
    // pre-flight: every referenced variable must exist before anything is
    // created
    let resolved = substitute(&resolved, SubstitutionMode::Strict)?;

    let cloud = AwsControlPlane::connect(&resolved.aws).await;
    let reconciler = Reconciler::new(&resolved, &cloud);
    reconciler.apply().await?;
    Ok(())
}
