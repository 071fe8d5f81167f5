//! `.circleci/config.yml` generation.
//!
//! Splices the descriptor's `ci.predeploy` / `ci.postdeploy` hook jobs
//! around the generated build job: predeploy jobs run as a sequential chain
//! before `build`, postdeploy jobs as a sequential chain after it. Hook
//! bodies come straight from the descriptor's `ci` sub-tree, which is
//! exempt from placeholder substitution.

use crate::config::CiConfig;
use anyhow::{bail, Context, Result};
use serde_yaml::{Mapping, Value};

const BUILD_JOB: &str = "build";

pub fn render(ci: Option<&CiConfig>) -> Result<String> {
    let predeploy = hook_jobs(ci.and_then(|c| c.predeploy()), "ci.predeploy")?;
    let postdeploy = hook_jobs(ci.and_then(|c| c.postdeploy()), "ci.postdeploy")?;

    let mut jobs = Mapping::new();
    for (name, job) in &predeploy {
        jobs.insert(Value::String(name.clone()), job.clone());
    }
    jobs.insert(Value::String(BUILD_JOB.to_string()), build_job());
    for (name, job) in &postdeploy {
        jobs.insert(Value::String(name.clone()), job.clone());
    }

    let mut root = Mapping::new();
    root.insert(Value::String("version".to_string()), Value::Number(2.into()));
    root.insert(Value::String("jobs".to_string()), Value::Mapping(jobs));
    root.insert(
        Value::String("workflows".to_string()),
        workflows(&predeploy, &postdeploy),
    );

    serde_yaml::to_string(&Value::Mapping(root)).context("Failed to render CircleCI config")
}

/// Hook jobs as (name, definition) pairs, in declaration order.
fn hook_jobs(hooks: Option<&Value>, section: &str) -> Result<Vec<(String, Value)>> {
    let Some(hooks) = hooks else {
        return Ok(Vec::new());
    };
    let Some(mapping) = hooks.as_mapping() else {
        bail!("{section} must be a mapping of job name to job definition");
    };
    let mut jobs = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        let Some(name) = key.as_str() else {
            bail!("{section} job names must be strings");
        };
        if name == BUILD_JOB {
            bail!("{section} must not define a job named '{BUILD_JOB}'");
        }
        jobs.push((name.to_string(), value.clone()));
    }
    Ok(jobs)
}

fn build_job() -> Value {
    let yaml = r#"
docker:
  - image: cimg/rust:1.79
steps:
  - checkout
  - setup_remote_docker
  - run:
      command: |
        cargo install slipway --locked
        slipway login --aws-access-key-id $AWS_ACCESS_KEY_ID --aws-secret-access-key $AWS_SECRET_ACCESS_KEY
        slipway
"#;
    serde_yaml::from_str(yaml).expect("static build job is valid YAML")
}

/// Workflow wiring: predeploy chain → build → postdeploy chain.
fn workflows(predeploy: &[(String, Value)], postdeploy: &[(String, Value)]) -> Value {
    let mut entries: Vec<Value> = Vec::new();

    for (index, (name, _)) in predeploy.iter().enumerate() {
        if index == 0 {
            entries.push(Value::String(name.clone()));
        } else {
            entries.push(job_with_requires(name, &[predeploy[index - 1].0.clone()]));
        }
    }

    if predeploy.is_empty() {
        entries.push(Value::String(BUILD_JOB.to_string()));
    } else {
        let all: Vec<String> = predeploy.iter().map(|(n, _)| n.clone()).collect();
        entries.push(job_with_requires(BUILD_JOB, &all));
    }

    for (index, (name, _)) in postdeploy.iter().enumerate() {
        let requires = if index == 0 {
            vec![BUILD_JOB.to_string()]
        } else {
            vec![postdeploy[index - 1].0.clone()]
        };
        entries.push(job_with_requires(name, &requires));
    }

    let mut workflow = Mapping::new();
    workflow.insert(Value::String("jobs".to_string()), Value::Sequence(entries));

    let mut workflows = Mapping::new();
    workflows.insert(
        Value::String("version".to_string()),
        Value::Number(2.into()),
    );
    workflows.insert(
        Value::String("slipway".to_string()),
        Value::Mapping(workflow),
    );
    Value::Mapping(workflows)
}

fn job_with_requires(name: &str, requires: &[String]) -> Value {
    let mut spec = Mapping::new();
    spec.insert(
        Value::String("requires".to_string()),
        Value::Sequence(requires.iter().cloned().map(Value::String).collect()),
    );
    let mut entry = Mapping::new();
    entry.insert(Value::String(name.to_string()), Value::Mapping(spec));
    Value::Mapping(entry)
}
