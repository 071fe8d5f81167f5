//! `slipway deploy` (the default command): build → push → redeploy for
//! every enabled environment whose branch selector matches the current CI
//! branch.
//!
//! Environments are processed strictly one at a time; a failure stops the
//! run before the next environment is touched. Deployment never creates
//! foundational resources — that is `apply`'s job.

use crate::ci::{self, CiProvider};
use crate::cloud::{aws::AwsControlPlane, ControlPlane, Reconciler};
use crate::config::{resolve, select_environments, substitute, Descriptor, SubstitutionMode};
use crate::{docker, ui};
use anyhow::{bail, Result};
use std::path::Path;

pub async fn execute(environment: Option<String>, skip_build: bool) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let descriptor = Descriptor::load(&project_dir)?;

    ui::print_info(&format!("Starting deployment of {} 🤞", descriptor.name));

    let targets: Vec<Option<String>> = match (&environment, &descriptor.environments) {
        (Some(name), _) => vec![Some(name.clone())],
        (None, Some(environments)) if !environments.is_empty() => {
            let provider = CiProvider::from_config(descriptor.ci.as_ref())?;
            let Some(branch) = ci::current_branch(provider) else {
                bail!(
                    "Could not determine the current branch from {} variables.\n  \
                     Outside CI, pick the target explicitly with --environment",
                    provider.name()
                );
            };
            let selected = select_environments(environments, &branch)?;
            if selected.is_empty() {
                ui::print_warning(&format!(
                    "No enabled environment matches branch '{branch}', nothing to deploy"
                ));
                return Ok(());
            }
            selected
                .into_iter()
                .map(|(name, _)| Some(name.to_string()))
                .collect()
        }
        (None, _) => vec![None],
    };

    for target in targets {
        match &target {
            Some(name) => ui::print_info(&format!("Deploying {name} environment...")),
            None => ui::print_info("Deploying..."),
        }
        deploy_one(&descriptor, target.as_deref(), &project_dir, skip_build).await?;
    }

    ui::print_success(&format!("Successfully deployed {} 🏆", descriptor.name));
    Ok(())
}

async fn deploy_one(
    descriptor: &Descriptor,
    environment: Option<&str>,
    project_dir: &Path,
    skip_build: bool,
) -> Result<()> {
    let resolved = resolve(descriptor, environment)?;
    let resolved = substitute(&resolved, SubstitutionMode::Strict)?;

    let cloud = AwsControlPlane::connect(&resolved.aws).await;
    let reconciler = Reconciler::new(&resolved, &cloud);

    // fails with a "run apply first" diagnostic when the repository is
    // missing, before any image is built
    let repository_uri = reconciler.repository_uri().await?;

    if skip_build {
        ui::print_warning("Skipping build step");
    } else {
        docker::build(&resolved, project_dir).await?;
    }
    let credentials = cloud.registry_credentials().await?;
    docker::push(&resolved, &repository_uri, &credentials).await?;

    reconciler.deploy().await?;
    Ok(())
}
