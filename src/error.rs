//! Centralized error types for slipway
//!
//! Uses thiserror for typed errors that can be matched on,
//! while still being compatible with anyhow for propagation.
//!
//! Every fatal path surfaces exactly one of these to the top-level handler
//! in `main`, which prints the message and exits non-zero. No module calls
//! `process::exit` itself.

use thiserror::Error;

/// Configuration errors: malformed or incomplete descriptor
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No slipway.yml found at {path}. Run `slipway init` first")]
    FileNotFound { path: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Unknown environment '{name}'. Defined environments: {known}")]
    UnknownEnvironment { name: String, known: String },

    #[error("Required configuration missing: {field}")]
    MissingField { field: String },

    #[error("Invalid configuration value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

/// Strict placeholder substitution encountered unresolved variables.
///
/// Always carries the full aggregated list so the user can fix the
/// environment in one pass instead of one variable at a time.
#[derive(Error, Debug)]
#[error("Missing environment variable(s): {}", missing.join(", "))]
pub struct MissingVariablesError {
    pub missing: Vec<String>,
}

/// Errors returned by the cloud control plane
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Insufficient AWS permissions for {operation}: {message}")]
    PermissionDenied { operation: String, message: String },

    #[error("AWS {operation} failed: {message}")]
    Api { operation: String, message: String },
}

impl CloudError {
    /// Permission failures get a dedicated diagnostic and are never retried.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, CloudError::PermissionDenied { .. })
    }
}

/// Errors raised while reconciling AWS resources
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error(
        "Cannot create {resource}: {field} is not configured.\n  \
         Add `{section}` to slipway.yml and re-run"
    )]
    MissingConfiguration {
        resource: String,
        field: String,
        section: String,
    },

    #[error(
        "{resource} '{name}' does not exist yet. Run `slipway apply` first \
         to provision the AWS infrastructure"
    )]
    MissingPrerequisite { resource: String, name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variables_lists_every_name() {
        let err = MissingVariablesError {
            missing: vec!["DB_HOST".to_string(), "DB_PASS".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Missing environment variable(s): DB_HOST, DB_PASS"
        );
    }

    #[test]
    fn provision_error_wraps_cloud_error() {
        let cloud = CloudError::PermissionDenied {
            operation: "CreateCluster".to_string(),
            message: "not authorized".to_string(),
        };
        let err: ProvisionError = cloud.into();
        assert!(matches!(err, ProvisionError::Cloud(c) if c.is_permission_denied()));
    }

    #[test]
    fn missing_prerequisite_mentions_apply() {
        let err = ProvisionError::MissingPrerequisite {
            resource: "Service".to_string(),
            name: "myapp-staging".to_string(),
        };
        assert!(err.to_string().contains("slipway apply"));
    }
}
