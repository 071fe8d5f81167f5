//! `slipway init`: write the descriptor and CI pipeline config, detecting
//! the build pack from project marker files.

use crate::buildpack::{self, BuildPackConfig, BuildPackId};
use crate::ci::{self, CiProvider};
use crate::config::{CiConfig, Descriptor};
use crate::error::ConfigError;
use crate::ui;
use anyhow::{Context, Result};

pub async fn execute(name: String, ci_provider: String, build_pack: Option<String>) -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let provider = CiProvider::parse(&ci_provider)?;

    let pack = match build_pack {
        Some(value) => Some(BuildPackId::parse(&value).ok_or(ConfigError::InvalidValue {
            field: "buildPack".to_string(),
            message: format!("unsupported build pack '{value}' (nodejs, php, maven)"),
        })?),
        None => {
            let detected = buildpack::detect(&project_dir);
            if let Some(id) = detected {
                ui::print_info(&format!("Detected {id:?} project"));
            } else if !project_dir.join("Dockerfile").exists() {
                ui::print_warning(
                    "No build pack detected and no Dockerfile present; \
                     set `buildPack` in slipway.yml before deploying",
                );
            }
            detected
        }
    };

    let descriptor = Descriptor {
        name: name.clone(),
        ci: Some(CiConfig::Provider(ci_provider.to_ascii_lowercase())),
        build_pack: pack.map(BuildPackConfig::Named),
        environments: None,
        docker: None,
        aws: None,
    };

    let yaml = serde_yaml::to_string(&descriptor).context("Failed to render slipway.yml")?;
    let descriptor_path = project_dir.join("slipway.yml");
    std::fs::write(&descriptor_path, yaml)
        .with_context(|| format!("Failed to write {}", descriptor_path.display()))?;

    ci::create(provider, &project_dir, descriptor.ci.as_ref())?;

    ui::print_success(&format!("slipway is now enabled for {name}"));
    ui::print_info(&format!(
        "Added config files for slipway and {}. You SHOULD commit these files to source control",
        provider.name()
    ));
    Ok(())
}
