use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::coerce::yaml_scalar;
use crate::error::{EnvError, Result};

/// File name searched for by project configuration discovery.
pub const CONFIG_FILE_NAME: &str = ".wpdev.yml";

/// Accepted values of `configuration-version`.
pub const SUPPORTED_VERSIONS: &[&str] = &["0.preview-unstable", "1"];

/// A user-facing descriptor field that can be preselected or prompted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Title,
    Multisite,
    Php,
    WordPress,
    MuPlugins,
    AppCode,
    Elasticsearch,
    PhpMyAdmin,
    Xdebug,
    XdebugConfig,
    MailCatcher,
    MediaProxy,
    MediaRedirectDomain,
}

impl Field {
    pub const ALL: [Field; 13] = [
        Field::Title,
        Field::Multisite,
        Field::Php,
        Field::WordPress,
        Field::MuPlugins,
        Field::AppCode,
        Field::Elasticsearch,
        Field::PhpMyAdmin,
        Field::Xdebug,
        Field::XdebugConfig,
        Field::MailCatcher,
        Field::MediaProxy,
        Field::MediaRedirectDomain,
    ];

    /// Hyphenated name used both as the config file key and the CLI flag.
    pub fn key(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Multisite => "multisite",
            Field::Php => "php",
            Field::WordPress => "wordpress",
            Field::MuPlugins => "mu-plugins",
            Field::AppCode => "app-code",
            Field::Elasticsearch => "elasticsearch",
            Field::PhpMyAdmin => "phpmyadmin",
            Field::Xdebug => "xdebug",
            Field::XdebugConfig => "xdebug-config",
            Field::MailCatcher => "mailpit",
            Field::MediaProxy => "media-proxy",
            Field::MediaRedirectDomain => "media-redirect-domain",
        }
    }

    /// Older key names still accepted in configuration files.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::AppCode => &["client-code"],
            Field::MailCatcher => &["mailhog", "mail-catcher"],
            Field::MediaProxy => &["photon"],
            Field::Elasticsearch => &["enterprise-search"],
            _ => &[],
        }
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL
            .into_iter()
            .find(|f| f.key() == key || f.aliases().contains(&key))
    }

    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "Site title",
            Field::Multisite => "Multisite",
            Field::Php => "PHP version",
            Field::WordPress => "WordPress version",
            Field::MuPlugins => "MU plugins",
            Field::AppCode => "Application code",
            Field::Elasticsearch => "Enterprise Search (Elasticsearch)",
            Field::PhpMyAdmin => "phpMyAdmin",
            Field::Xdebug => "XDebug",
            Field::XdebugConfig => "XDebug configuration",
            Field::MailCatcher => "Mail catcher (Mailpit)",
            Field::MediaProxy => "Media proxy",
            Field::MediaRedirectDomain => "Media redirect domain",
        }
    }

    /// Components that may be mounted from a host directory.
    pub fn allows_local(self) -> bool {
        matches!(self, Field::MuPlugins | Field::AppCode)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a preselected value came from, lowest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Origin {
    File,
    Prior,
    Flag,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub value: String,
    pub origin: Origin,
}

/// Values known before any prompting.
pub type Preselected = BTreeMap<Field, Selection>;

/// Layer `upper` over `lower`; values from `upper` win.
pub fn merge(lower: &Preselected, upper: &Preselected) -> Preselected {
    let mut merged = lower.clone();
    merged.extend(upper.iter().map(|(k, v)| (*k, v.clone())));
    merged
}

/// Tag every value of a raw map with its origin.
pub fn preselect(values: &BTreeMap<Field, String>, origin: Origin) -> Preselected {
    values
        .iter()
        .map(|(field, value)| {
            (
                *field,
                Selection {
                    value: value.clone(),
                    origin,
                },
            )
        })
        .collect()
}

/// A parsed `.wpdev.yml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub path: PathBuf,
    pub slug: String,
    pub values: BTreeMap<Field, String>,
}

impl ProjectConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let invalid = |reason: String| EnvError::InvalidConfigFile {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
        let doc: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        let map = doc
            .as_mapping()
            .ok_or_else(|| invalid("expected a mapping at the top level".to_string()))?;

        let version = map
            .get("configuration-version")
            .and_then(yaml_scalar)
            .ok_or_else(|| invalid("missing required key `configuration-version`".to_string()))?;
        if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
            return Err(EnvError::UnsupportedConfigVersion {
                path: path.to_path_buf(),
                version,
                supported: SUPPORTED_VERSIONS.join(", "),
            });
        }

        let slug = map
            .get("slug")
            .and_then(yaml_scalar)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| invalid("missing required key `slug`".to_string()))?;

        let base = path.parent().unwrap_or(Path::new("."));
        let mut values = BTreeMap::new();
        for (key, value) in map {
            let Some(key) = key.as_str() else { continue };
            if key == "configuration-version" || key == "slug" {
                continue;
            }
            let Some(field) = Field::from_key(key) else {
                tracing::warn!(key, file = %path.display(), "ignoring unknown configuration key");
                continue;
            };
            let Some(value) = yaml_scalar(value) else {
                continue;
            };
            let value = if field.allows_local() {
                resolve_component_value(&value, base)
            } else {
                value
            };
            values.insert(field, value);
        }

        Ok(Self {
            path: path.to_path_buf(),
            slug,
            values,
        })
    }
}

/// Whether a component value names a directory rather than an image tag.
pub fn looks_like_path(value: &str) -> bool {
    value.contains('/')
        || value.contains(std::path::MAIN_SEPARATOR)
        || value == "."
        || value == ".."
        || value.starts_with('~')
}

/// Resolve a relative directory value against `base`. Image tags pass
/// through unchanged.
pub fn resolve_component_value(value: &str, base: &Path) -> String {
    if !looks_like_path(value) {
        return value.to_string();
    }
    let expanded = PathBuf::from(crate::platform::expand_home(value));
    let joined = if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    };
    joined
        .canonicalize()
        .unwrap_or(joined)
        .to_string_lossy()
        .into_owned()
}
