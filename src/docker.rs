//! Container engine collaborator: build, push, and local run via the
//! docker binary.
//!
//! The binary path honors the `DOCKER_BIN` override. All invocations are
//! awaited sequentially; a non-zero exit status fails the command with the
//! subcommand name in the message.

use crate::buildpack;
use crate::cloud::RegistryCredentials;
use crate::config::ResolvedConfig;
use crate::tools::get_tool_path;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Build the image, generating a Dockerfile from the build pack when the
/// project doesn't carry its own.
pub async fn build(config: &ResolvedConfig, project_dir: &Path) -> Result<()> {
    prepare_dockerfile(config, project_dir)?;

    let mut args = vec![
        "build".to_string(),
        "-t".to_string(),
        config.docker.name.clone(),
    ];
    for build_arg in &config.docker.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", build_arg.name, build_arg.value));
    }
    args.push(".".to_string());

    info!("Building image {}", config.docker.name);
    run_docker(&args, project_dir).await
}

/// Tag the built image with the repository URI and push `:latest`.
pub async fn push(
    config: &ResolvedConfig,
    repository_uri: &str,
    credentials: &RegistryCredentials,
) -> Result<()> {
    login(credentials).await?;

    let remote = format!("{repository_uri}:latest");
    run_docker(
        &[
            "tag".to_string(),
            config.docker.name.clone(),
            remote.clone(),
        ],
        Path::new("."),
    )
    .await?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(format!("Pushing {remote}..."));
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = run_docker(&["push".to_string(), remote.clone()], Path::new(".")).await;
    match &result {
        Ok(()) => pb.finish_with_message(format!("Pushed {remote}")),
        Err(_) => pb.finish_and_clear(),
    }
    result
}

/// Run the image locally with the resolved container ports and environment
/// (local-run parity with the deployed task definition).
pub async fn run(config: &ResolvedConfig, project_dir: &Path) -> Result<()> {
    let primary = config.aws.ecs.task_definition.primary_container();

    let mut args = vec!["run".to_string(), "--rm".to_string()];
    for mapping in &primary.port_mappings {
        // dynamic host ports only exist on the cluster; locally the
        // container port is exposed one-to-one
        let host_port = if mapping.host_port == 0 {
            mapping.container_port
        } else {
            mapping.host_port
        };
        args.push("-p".to_string());
        args.push(format!("{host_port}:{}", mapping.container_port));
    }
    for env in &primary.environment {
        args.push("-e".to_string());
        args.push(format!("{}={}", env.name, env.value));
    }
    args.push(config.docker.name.clone());

    info!("Starting {} locally", config.docker.name);
    run_docker(&args, project_dir).await
}

/// Write the Dockerfile (and .dockerignore) when the project doesn't have
/// its own. Precedence: existing project Dockerfile > inline descriptor
/// Dockerfile > build pack.
fn prepare_dockerfile(config: &ResolvedConfig, project_dir: &Path) -> Result<()> {
    let dockerfile = project_dir.join("Dockerfile");
    if config.docker.dockerfile.is_none() && config.build_pack.is_none() {
        if dockerfile.exists() {
            return Ok(());
        }
        bail!(
            "No Dockerfile found and no build pack configured. \
             Add a Dockerfile or set `buildPack` in slipway.yml"
        );
    }

    if dockerfile.exists() && config.docker.dockerfile.is_none() {
        debug!("Project has its own Dockerfile, leaving it alone");
        return Ok(());
    }

    let content = match (&config.docker.dockerfile, &config.build_pack) {
        (Some(inline), _) => inline.clone(),
        (None, Some(pack_config)) => {
            let pack = pack_config.materialize();
            if !pack.dockerignore.trim().is_empty() {
                let ignore_path = project_dir.join(".dockerignore");
                if !ignore_path.exists() {
                    std::fs::write(&ignore_path, &pack.dockerignore)
                        .with_context(|| format!("Failed to write {}", ignore_path.display()))?;
                }
            }
            buildpack::dockerfile(&pack, None)
        }
        (None, None) => unreachable!("guarded above"),
    };

    std::fs::write(&dockerfile, content)
        .with_context(|| format!("Failed to write {}", dockerfile.display()))?;
    debug!("Generated {}", dockerfile.display());
    Ok(())
}

async fn login(credentials: &RegistryCredentials) -> Result<()> {
    let docker = get_tool_path("docker");
    let mut child = Command::new(&docker)
        .args([
            "login",
            "-u",
            &credentials.username,
            "--password-stdin",
            &credentials.endpoint,
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .context("Failed to spawn docker login")?;

    let mut stdin = child
        .stdin
        .take()
        .context("Failed to open docker login stdin")?;
    stdin
        .write_all(credentials.password.as_bytes())
        .await
        .context("Failed to pass registry password to docker")?;
    drop(stdin);

    let status = child.wait().await.context("docker login did not finish")?;
    if !status.success() {
        bail!("docker login failed with {status}");
    }
    debug!("Authenticated against {}", credentials.endpoint);
    Ok(())
}

async fn run_docker(args: &[String], working_dir: &Path) -> Result<()> {
    let docker = get_tool_path("docker");
    debug!("Running {docker} {}", args.join(" "));
    let status = Command::new(&docker)
        .args(args)
        .current_dir(working_dir)
        .status()
        .await
        .with_context(|| format!("Failed to spawn {docker}"))?;
    if !status.success() {
        bail!("docker {} failed with {status}", args[0]);
    }
    Ok(())
}
