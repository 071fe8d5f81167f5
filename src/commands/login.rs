//! `slipway login`: store the project's AWS credentials under its profile
//! in `~/.aws/credentials`, preserving every other profile in the file.

use crate::config::{resolve, Descriptor};
use crate::ui;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

pub async fn execute(access_key_id: Option<String>, secret_access_key: Option<String>) -> Result<()> {
    let (Some(access_key_id), Some(secret_access_key)) = (access_key_id, secret_access_key) else {
        bail!(
            "AWS credentials missing. Pass --aws-access-key-id and \
             --aws-secret-access-key, or export AWS_ACCESS_KEY_ID and \
             AWS_SECRET_ACCESS_KEY"
        );
    };

    let project_dir = std::env::current_dir()?;
    let descriptor = Descriptor::load(&project_dir)?;
    let resolved = resolve(&descriptor, None)?;
    let profile = &resolved.aws.profile;

    let path = credentials_path()?;
    write_profile(&path, profile, &access_key_id, &secret_access_key)?;

    ui::print_success(&format!(
        "Stored AWS credentials for profile '{profile}' in {}",
        path.display()
    ));
    Ok(())
}

fn credentials_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine the home directory")?;
    Ok(home.join(".aws").join("credentials"))
}

/// Rewrite one profile section, leaving all others byte-identical.
fn write_profile(path: &Path, profile: &str, key_id: &str, secret: &str) -> Result<()> {
    let existing = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    let mut out = String::new();
    let mut in_profile = false;
    let mut replaced = false;
    for line in existing.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            in_profile = trimmed == format!("[{profile}]");
            if in_profile {
                replaced = true;
                push_section(&mut out, profile, key_id, secret);
            }
            if !in_profile {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        }
        if !in_profile {
            out.push_str(line);
            out.push('\n');
        }
    }
    if !replaced {
        if !out.is_empty() && !out.ends_with("\n\n") {
            out.push('\n');
        }
        push_section(&mut out, profile, key_id, secret);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, out).with_context(|| format!("Failed to write {}", path.display()))
}

fn push_section(out: &mut String, profile: &str, key_id: &str, secret: &str) {
    out.push_str(&format!(
        "[{profile}]\naws_access_key_id = {key_id}\naws_secret_access_key = {secret}\n"
    ));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_file_with_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".aws/credentials");
        write_profile(&path, "myapp", "AKIA123", "secret").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[myapp]"));
        assert!(content.contains("aws_access_key_id = AKIA123"));
    }

    #[test]
    fn preserves_other_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[default]\naws_access_key_id = OTHER\naws_secret_access_key = OTHERSECRET\n",
        )
        .unwrap();

        write_profile(&path, "myapp", "AKIA123", "secret").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[default]"));
        assert!(content.contains("OTHERSECRET"));
        assert!(content.contains("[myapp]"));
    }

    #[test]
    fn replaces_existing_profile_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials");
        std::fs::write(
            &path,
            "[myapp]\naws_access_key_id = OLD\naws_secret_access_key = OLDSECRET\n[default]\naws_access_key_id = KEEP\n",
        )
        .unwrap();

        write_profile(&path, "myapp", "NEW", "NEWSECRET").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("OLD"));
        assert!(content.contains("NEW"));
        assert!(content.contains("[default]"));
        assert!(content.contains("KEEP"));
        assert_eq!(content.matches("[myapp]").count(), 1);
    }
}
