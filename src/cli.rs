use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::model::Field;

#[derive(Debug, Parser)]
#[command(
    name = "wpdev",
    version,
    about = "Local WordPress development environments"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Environment to operate on
    #[arg(short = 's', long, global = true, env = "WPDEV_SLUG")]
    pub slug: Option<String>,

    /// Verbose logging to stderr
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory holding the environments
    #[arg(long, global = true, env = "WPDEV_HOME")]
    pub home: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new environment
    Create {
        #[command(flatten)]
        options: EnvOptions,
    },
    /// Change the configuration of an environment
    Update {
        #[command(flatten)]
        options: EnvOptions,
    },
    /// Start an environment
    Start {
        /// Restart the existing containers without pulling or recreating
        #[arg(long)]
        skip_rebuild: bool,
        /// Do not offer newer WordPress releases
        #[arg(long)]
        skip_wp_versions_check: bool,
        /// How long to wait for the environment to come up
        #[arg(long, default_value = "120s", value_parser = humantime::parse_duration)]
        timeout: Duration,
    },
    /// Stop an environment
    Stop,
    /// Remove an environment
    Destroy {
        /// Keep the environment's files on disk
        #[arg(long)]
        soft: bool,
    },
    /// Show an environment's configuration and status
    Info {
        /// Show every environment
        #[arg(long)]
        all: bool,
        /// Include per-container details
        #[arg(long)]
        extended: bool,
    },
    /// List every environment (same as `info --all`)
    List,
    /// Run a tool inside the environment, e.g. `wpdev exec -- wp plugin list`
    Exec {
        /// Tool name followed by its arguments
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Open a shell inside a service
    Shell {
        /// Run as root
        #[arg(long)]
        root: bool,
        /// Service to attach to (default: php)
        #[arg(short = 'S', long)]
        service: Option<String>,
        /// Command to run instead of a login shell
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Show service logs
    Logs {
        /// Keep streaming new output
        #[arg(short = 'f', long)]
        follow: bool,
        /// Only this service
        #[arg(long)]
        service: Option<String>,
    },
}

/// Descriptor fields settable from the command line.
///
/// Toggles take an optional value: `--xdebug`, `--xdebug=false`,
/// `--xdebug n`.
#[derive(Debug, Clone, Default, Args)]
pub struct EnvOptions {
    /// Site title
    #[arg(long)]
    pub title: Option<String>,
    /// false, subdomain or subdirectory
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub multisite: Option<String>,
    /// PHP version alias or full image reference
    #[arg(long)]
    pub php: Option<String>,
    /// WordPress version tag, or `trunk`
    #[arg(long)]
    pub wordpress: Option<String>,
    /// `image` or a local directory
    #[arg(long = "mu-plugins")]
    pub mu_plugins: Option<String>,
    /// `image` or a local directory
    #[arg(long = "app-code")]
    pub app_code: Option<String>,
    /// Enable Enterprise Search
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub elasticsearch: Option<String>,
    /// Enable phpMyAdmin
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub phpmyadmin: Option<String>,
    /// Enable XDebug
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub xdebug: Option<String>,
    /// Extra XDEBUG_CONFIG settings
    #[arg(long = "xdebug-config")]
    pub xdebug_config: Option<String>,
    /// Enable the Mailpit mail catcher
    #[arg(long, alias = "mailhog", num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub mailpit: Option<String>,
    /// Serve missing media through a proxy
    #[arg(long = "media-proxy", alias = "photon", num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub media_proxy: Option<String>,
    /// Domain missing media is fetched from
    #[arg(long = "media-redirect-domain")]
    pub media_redirect_domain: Option<String>,
}

impl EnvOptions {
    /// The flags that were given, keyed by field.
    pub fn fields(&self) -> BTreeMap<Field, String> {
        [
            (Field::Title, &self.title),
            (Field::Multisite, &self.multisite),
            (Field::Php, &self.php),
            (Field::WordPress, &self.wordpress),
            (Field::MuPlugins, &self.mu_plugins),
            (Field::AppCode, &self.app_code),
            (Field::Elasticsearch, &self.elasticsearch),
            (Field::PhpMyAdmin, &self.phpmyadmin),
            (Field::Xdebug, &self.xdebug),
            (Field::XdebugConfig, &self.xdebug_config),
            (Field::MailCatcher, &self.mailpit),
            (Field::MediaProxy, &self.media_proxy),
            (Field::MediaRedirectDomain, &self.media_redirect_domain),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.clone().map(|v| (field, v)))
        .collect()
    }
}
