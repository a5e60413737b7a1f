// The miette/thiserror derive macros generate code that triggers false
// positive unused_assignments warnings on enum variant fields.
#![allow(unused_assignments)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the environment orchestrator.
///
/// Variants fall into three groups: user errors (bad input, missing
/// environment, invalid paths, unknown versions), transient infrastructure
/// errors (engine or registry unreachable, probes timing out) and fatal
/// orchestration errors (the stack definition is rejected even after
/// regeneration). Only the command layer prints them.
#[derive(Debug, Error, Diagnostic)]
pub enum EnvError {
    #[error("invalid environment slug `{slug}`: {reason}")]
    #[diagnostic(
        code(wpdev::invalid_slug),
        help("slugs use lowercase letters, digits and hyphens, e.g. `my-site`")
    )]
    InvalidSlug { slug: String, reason: String },

    #[error("environment `{slug}` does not exist")]
    #[diagnostic(
        code(wpdev::not_found),
        help("create it first with `wpdev create --slug {slug}`, or list environments with `wpdev info --all`")
    )]
    NotFound { slug: String },

    #[error("environment `{slug}` already exists")]
    #[diagnostic(
        code(wpdev::already_exists),
        help("use `wpdev update --slug {slug}` to change it, or pick another slug")
    )]
    AlreadyExists { slug: String },

    #[error("could not read environment `{slug}` at {}", path.display())]
    #[diagnostic(
        code(wpdev::unreadable),
        help("check the permissions of the environment directory")
    )]
    Unreadable {
        slug: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("environment `{slug}` has a corrupt descriptor at {}", path.display())]
    #[diagnostic(
        code(wpdev::corrupt),
        help("recreate the environment: `wpdev destroy --slug {slug}` then `wpdev create --slug {slug}`")
    )]
    Corrupt {
        slug: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not write {}", path.display())]
    #[diagnostic(code(wpdev::write_failed))]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {component} directory {}: {reason}", path.display())]
    #[diagnostic(
        code(wpdev::invalid_component_path),
        help("pass an existing, non-empty directory, or `image` to use the demo image")
    )]
    InvalidComponentPath {
        component: String,
        path: PathBuf,
        reason: String,
    },

    #[error("invalid value `{value}` for {field}")]
    #[diagnostic(code(wpdev::invalid_value), help("expected {expected}"))]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("unknown or unsupported version `{requested}`{}", suggestion.as_ref().map(|s| format!(" (did you mean `{}`?)", s)).unwrap_or_default())]
    #[diagnostic(code(wpdev::unknown_version), help("available versions: {available}"))]
    UnknownVersion {
        requested: String,
        suggestion: Option<String>,
        available: String,
    },

    #[error("invalid configuration file {}: {reason}", path.display())]
    #[diagnostic(code(wpdev::invalid_config_file))]
    InvalidConfigFile { path: PathBuf, reason: String },

    #[error("unsupported configuration-version `{version}` in {}", path.display())]
    #[diagnostic(
        code(wpdev::unsupported_config_version),
        help("set `configuration-version` to one of: {supported}")
    )]
    UnsupportedConfigVersion {
        path: PathBuf,
        version: String,
        supported: String,
    },

    #[error("missing value for {field}")]
    #[diagnostic(
        code(wpdev::missing_value),
        help("pass `--{flag}` or add `{flag}` to the project configuration file")
    )]
    MissingValue { field: String, flag: String },

    #[error("unknown tool `{tool}`{}", suggestion.as_ref().map(|s| format!(" (did you mean `{}`?)", s)).unwrap_or_default())]
    #[diagnostic(code(wpdev::unknown_tool), help("available tools: {available}"))]
    UnknownTool {
        tool: String,
        suggestion: Option<String>,
        available: String,
    },

    #[error("unknown service `{service}`")]
    #[diagnostic(code(wpdev::unknown_service), help("available services: {available}"))]
    UnknownService { service: String, available: String },

    #[error("environment `{slug}` is not running")]
    #[diagnostic(code(wpdev::not_running), help("start it with `wpdev start --slug {slug}`"))]
    NotRunning { slug: String },

    #[error("{domain} resolves to {resolved} instead of 127.0.0.1")]
    #[diagnostic(
        code(wpdev::dns_misconfigured),
        help("your DNS resolver rewrites local addresses (DNS rebinding protection). Allow `{domain}` in your router or resolver, or add `127.0.0.1 {domain}` to your hosts file")
    )]
    DnsMisconfigured { domain: String, resolved: String },

    #[error("{domain} does not resolve")]
    #[diagnostic(
        code(wpdev::dns_unresolved),
        help("check your network connection, or add `127.0.0.1 {domain}` to your hosts file")
    )]
    DnsUnresolved { domain: String },

    #[error("cannot connect to the container engine: {reason}")]
    #[diagnostic(
        code(wpdev::engine_unavailable),
        help("make sure Docker is running and DOCKER_HOST points at it, then try again")
    )]
    EngineUnavailable { reason: String },

    #[error("invalid TLS material in {}: {reason}", path.display())]
    #[diagnostic(code(wpdev::invalid_tls), help("check DOCKER_CERT_PATH"))]
    InvalidTls { path: PathBuf, reason: String },

    #[error("`{operation}` failed: {message}")]
    #[diagnostic(code(wpdev::engine_failed), help("try again; run with --debug for details"))]
    EngineFailed { operation: String, message: String },

    #[error("environment `{slug}` did not become ready within {timeout}")]
    #[diagnostic(
        code(wpdev::not_ready),
        help("try again in a moment with `wpdev info --slug {slug}`, or inspect `wpdev logs --slug {slug}`")
    )]
    NotReady { slug: String, timeout: String },

    #[error("the stack definition for `{slug}` was rejected twice (first: {first}; after regeneration: {retry})")]
    #[diagnostic(
        code(wpdev::stack_init_failed),
        help("recreate the environment with `wpdev destroy --slug {slug}` and `wpdev create`, or contact support with the output of --debug")
    )]
    StackInitFailed {
        slug: String,
        first: String,
        retry: String,
    },

    #[error("prompt failed: {0}")]
    #[diagnostic(
        code(wpdev::prompt),
        help("pass the value as a flag, or set WPDEV_NON_INTERACTIVE=1 to use defaults")
    )]
    Prompt(#[from] dialoguer::Error),
}

impl EnvError {
    pub fn engine(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::EngineFailed {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EngineUnavailable { .. }
                | Self::EngineFailed { .. }
                | Self::NotReady { .. }
                | Self::DnsUnresolved { .. }
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::StackInitFailed { .. })
    }

    pub fn is_user_error(&self) -> bool {
        !self.is_transient() && !self.is_fatal()
    }
}

pub type Result<T> = std::result::Result<T, EnvError>;

/// Find the closest candidate using Jaro-Winkler similarity.
pub fn closest_match<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::jaro_winkler(name, candidate);
        if score >= 0.8 && best.is_none_or(|(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }
    best.map(|(c, _)| c.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_is_exclusive() {
        let user = EnvError::NotFound { slug: "a".into() };
        let transient = EnvError::EngineUnavailable { reason: "x".into() };
        let fatal = EnvError::StackInitFailed {
            slug: "a".into(),
            first: "x".into(),
            retry: "y".into(),
        };
        assert!(user.is_user_error() && !user.is_transient() && !user.is_fatal());
        assert!(transient.is_transient() && !transient.is_user_error());
        assert!(fatal.is_fatal() && !fatal.is_user_error());
    }

    #[test]
    fn closest_match_suggests_near_names() {
        assert_eq!(closest_match("wpp", ["wp", "php", "db"]), Some("wp".to_string()));
        assert_eq!(closest_match("zzz", ["wp", "php", "db"]), None);
    }

    #[test]
    fn unknown_version_message_includes_suggestion() {
        let err = EnvError::UnknownVersion {
            requested: "6.44".into(),
            suggestion: Some("6.4".into()),
            available: "6.4, 6.3".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown or unsupported version `6.44`"));
        assert!(msg.contains("did you mean `6.4`"));
    }

    #[test]
    fn diagnostics_carry_help() {
        let err = EnvError::NotFound { slug: "demo".into() };
        let diag: &dyn Diagnostic = &err;
        assert!(diag.help().is_some());
        assert!(diag.code().is_some());
    }
}
