//! Build packs: template bundles that produce a base image reference,
//! Dockerfile body, startup command, and ignore list for projects without a
//! hand-written Dockerfile.
//!
//! The supported set is a closed enum; an inline definition in the
//! descriptor covers everything else. Detection walks the project directory
//! for marker files.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Build pack selection as written in the descriptor: either a well-known
/// identifier or an inline definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BuildPackConfig {
    Named(BuildPackId),
    Inline(InlineBuildPack),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildPackId {
    Nodejs,
    Php,
    Maven,
}

impl BuildPackId {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "nodejs" | "node" => Some(BuildPackId::Nodejs),
            "php" => Some(BuildPackId::Php),
            "maven" => Some(BuildPackId::Maven),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineBuildPack {
    pub image: String,

    #[serde(default = "default_tag")]
    pub tag: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub command: String,

    #[serde(default)]
    pub dockerignore: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

/// Materialized build pack data.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildPack {
    pub image: String,
    pub tag: String,
    pub body: String,
    pub command: String,
    pub dockerignore: String,
}

impl BuildPackConfig {
    pub fn materialize(&self) -> BuildPack {
        match self {
            BuildPackConfig::Inline(inline) => BuildPack {
                image: inline.image.clone(),
                tag: inline.tag.clone(),
                body: inline.body.clone(),
                command: inline.command.clone(),
                dockerignore: inline.dockerignore.clone(),
            },
            BuildPackConfig::Named(BuildPackId::Nodejs) => BuildPack {
                image: "node".to_string(),
                tag: "8".to_string(),
                body: NODEJS_BODY.to_string(),
                command: r#"CMD ["npm", "start"]"#.to_string(),
                dockerignore: "node_modules\n.npmrc\n".to_string(),
            },
            BuildPackConfig::Named(BuildPackId::Php) => BuildPack {
                image: "php".to_string(),
                tag: "7-apache".to_string(),
                body: PHP_BODY.to_string(),
                command: String::new(),
                dockerignore: String::new(),
            },
            BuildPackConfig::Named(BuildPackId::Maven) => BuildPack {
                image: "tomcat".to_string(),
                tag: "8.0-jre8".to_string(),
                body: String::new(),
                command: String::new(),
                dockerignore: "target\n".to_string(),
            },
        }
    }
}

/// Detect the build pack from project marker files. An existing Dockerfile
/// always wins over detection; callers check for it first.
pub fn detect(project_dir: &Path) -> Option<BuildPackId> {
    if project_dir.join("pom.xml").exists() {
        Some(BuildPackId::Maven)
    } else if project_dir.join("composer.json").exists() {
        Some(BuildPackId::Php)
    } else if project_dir.join("package.json").exists() {
        Some(BuildPackId::Nodejs)
    } else {
        None
    }
}

/// Render the Dockerfile: base image, pack body, optional user extension,
/// startup command.
pub fn dockerfile(pack: &BuildPack, custom: Option<&str>) -> String {
    let mut sections = vec![format!("FROM {}:{}", pack.image, pack.tag)];
    if !pack.body.trim().is_empty() {
        sections.push(pack.body.trim().to_string());
    }
    if let Some(custom) = custom {
        if !custom.trim().is_empty() {
            sections.push(custom.trim().to_string());
        }
    }
    if !pack.command.trim().is_empty() {
        sections.push(pack.command.trim().to_string());
    }
    let mut out = sections.join("\n\n");
    out.push('\n');
    out
}

const NODEJS_BODY: &str = r#"WORKDIR /opt
COPY ./package.json package.json
COPY ./package-lock.json package-lock.json
RUN npm install
COPY . ./"#;

const PHP_BODY: &str = r#"RUN apt-get update; \
  apt-get install -y \
  apt-utils \
  apt-transport-https \
  lsb-release \
  ca-certificates \
  software-properties-common \
  build-essential \
  gnupg \
  git \
  curl \
  wget \
  unzip \
  libbz2-dev \
  libzip-dev \
  libcurl4-openssl-dev \
  libpq-dev \
  libedit-dev \
  zlib1g-dev \
  libpng-dev \
  libonig-dev \
  libjpeg-dev; \
  wget -O /etc/apt/trusted.gpg.d/php.gpg https://packages.sury.org/php/apt.gpg; \
  echo "deb https://packages.sury.org/php/ $(lsb_release -sc) main" > /etc/apt/sources.list.d/php.list; \
  apt-get update; \
  cd /tmp; \
  php -r "copy('https://getcomposer.org/installer', 'composer-setup.php');"; \
  php composer-setup.php --install-dir=/usr/bin --filename=composer; \
  php -r "unlink('composer-setup.php');"; \
  a2enmod rewrite; \
  docker-php-ext-install bz2 curl mbstring pdo_mysql mysqli opcache pdo_pgsql readline sockets zip gd;

COPY . /var/www/html/
RUN composer install --no-plugins --no-scripts --working-dir /var/www/html/;"#;
