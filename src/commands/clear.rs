//! `slipway clear`: remove the files slipway generated for this project —
//! the CI pipeline config, the generated Dockerfile (only when a build pack
//! produced it), and the descriptor itself.

use crate::ci::{self, CiProvider};
use crate::config::Descriptor;
use crate::ui;
use anyhow::{Context, Result};

pub async fn execute() -> Result<()> {
    let project_dir = std::env::current_dir()?;
    let descriptor = Descriptor::load(&project_dir)?;

    let provider = CiProvider::from_config(descriptor.ci.as_ref())?;
    ci::delete(provider, &project_dir)?;

    // a hand-written Dockerfile is the user's; only remove what we generated
    let dockerfile = project_dir.join("Dockerfile");
    if descriptor.build_pack.is_some() && dockerfile.exists() {
        std::fs::remove_file(&dockerfile)
            .with_context(|| format!("Failed to remove {}", dockerfile.display()))?;
    }

    if let Some(path) = Descriptor::find(&project_dir) {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }

    ui::print_success(&format!(
        "slipway is now completely removed for {}",
        descriptor.name
    ));
    Ok(())
}
