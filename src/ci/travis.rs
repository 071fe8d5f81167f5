//! `.travis.yml` generation.
//!
//! The generated pipeline installs slipway, authenticates against AWS with
//! the repository's secret variables, and runs the default deploy command.
//! The `${...}` tokens are Travis's own and must survive into the file.

pub fn render() -> String {
    r#"sudo: required
language: rust
rust: stable

services:
- docker

before_install:
- export AWS_ACCESS_KEY_ID=${AWS_ACCESS_KEY_ID}
- export AWS_SECRET_ACCESS_KEY=${AWS_SECRET_ACCESS_KEY}
- cargo install slipway --locked
- slipway login

script:
- slipway
"#
    .to_string()
}
