//! CLI definitions for slipway
//!
//! This module contains all CLI argument parsing structures using clap.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "slipway",
    version,
    about = "Zero-config provisioning and deployment of containerized apps to AWS ECS",
    long_about = "Provisions ECS clusters, load balancers, target groups, log groups and \
                  services from a declarative slipway.yml, then builds, pushes and deploys \
                  the application container.\nRunning without a subcommand deploys."
)]
pub struct Cli {
    /// Deploys when no subcommand is given
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Enable slipway for this project: write slipway.yml and the CI config
    Init {
        /// Project name (also used as the Docker image name)
        #[arg(long)]
        name: String,

        /// CI provider generating the pipeline config (travis, circleci)
        #[arg(long, default_value = "travis")]
        ci: String,

        /// Build pack (nodejs, php, maven); detected from marker files when
        /// omitted
        #[arg(long)]
        build_pack: Option<String>,
    },

    /// Provision the AWS infrastructure for every enabled environment
    Apply {
        /// Provision only this environment
        #[arg(long)]
        environment: Option<String>,
    },

    /// Build, push and deploy to every environment matching the current branch
    Deploy {
        /// Deploy only this environment, bypassing branch selection
        #[arg(long)]
        environment: Option<String>,

        /// Skip the docker build (push and redeploy the existing image)
        #[arg(long)]
        skip_build: bool,
    },

    /// Build the image and run it locally with the resolved task environment
    Serve {
        /// Resolve configuration for this environment
        #[arg(long)]
        environment: Option<String>,
    },

    /// Store AWS credentials for this project's profile
    Login {
        /// AWS API access key id
        #[arg(long, env = "AWS_ACCESS_KEY_ID")]
        aws_access_key_id: Option<String>,

        /// AWS API secret access key
        #[arg(long, env = "AWS_SECRET_ACCESS_KEY")]
        aws_secret_access_key: Option<String>,
    },

    /// Remove the files slipway generated for this project
    Clear,
}
