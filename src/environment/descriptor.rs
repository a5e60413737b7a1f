use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Name of the descriptor file inside an environment directory.
pub const DESCRIPTOR_FILE: &str = "instance_data.json";

/// How often remote images are refreshed.
pub const PULL_CADENCE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const AUTOLOGIN_KEY_LEN: usize = 32;

/// Multisite mode of the WordPress install.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Multisite {
    #[default]
    Off,
    Subdomain,
    Subdirectory,
}

impl Multisite {
    /// Parse a user-supplied value. Boolean tokens map to off/subdomain.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "subdomain" => Some(Self::Subdomain),
            "subdirectory" => Some(Self::Subdirectory),
            other => crate::config::coerce::parse_bool(other).map(|on| {
                if on {
                    Self::Subdomain
                } else {
                    Self::Off
                }
            }),
        }
    }
}

impl fmt::Display for Multisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "false",
            Self::Subdomain => "subdomain",
            Self::Subdirectory => "subdirectory",
        })
    }
}

impl Serialize for Multisite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Off => serializer.serialize_bool(false),
            Self::Subdomain => serializer.serialize_str("subdomain"),
            Self::Subdirectory => serializer.serialize_str("subdirectory"),
        }
    }
}

impl<'de> Deserialize<'de> for Multisite {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Bool(false) => Ok(Self::Off),
            // Older descriptors stored a plain `true`.
            Raw::Bool(true) => Ok(Self::Subdomain),
            Raw::Text(text) => Self::parse(&text).ok_or_else(|| {
                serde::de::Error::custom(format!("invalid multisite value `{}`", text))
            }),
        }
    }
}

/// WordPress core is always image-sourced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    #[default]
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordPressSource {
    #[serde(default)]
    pub mode: ImageMode,
    /// User-facing tag, e.g. `6.4` or `trunk`.
    pub tag: String,
    /// Concrete build the tag pointed to when it was selected.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_not_upgrade: Option<bool>,
}

impl WordPressSource {
    pub fn image(tag: &str, reference: Option<&str>) -> Self {
        Self {
            mode: ImageMode::Image,
            tag: tag.to_string(),
            reference: reference.map(String::from),
            do_not_upgrade: None,
        }
    }
}

/// Where a user-code component comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ComponentSource {
    /// Mounted read-write from a host directory.
    Local { dir: PathBuf },
    /// Read-only demo or released content from an image.
    Image {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
}

impl Default for ComponentSource {
    fn default() -> Self {
        Self::Image { tag: None }
    }
}

impl fmt::Display for ComponentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { dir } => write!(f, "{}", dir.display()),
            Self::Image { tag: None } => f.write_str("image"),
            Self::Image { tag: Some(tag) } => write!(f, "image ({})", tag),
        }
    }
}

/// The persisted configuration of one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub multisite: Multisite,
    /// Image reference of the PHP runtime.
    pub php_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maria_db_version: Option<String>,
    pub wordpress: WordPressSource,
    #[serde(default)]
    pub mu_plugins: ComponentSource,
    #[serde(default)]
    pub app_code: ComponentSource,
    #[serde(default)]
    pub elasticsearch: bool,
    #[serde(default)]
    pub php_my_admin: bool,
    #[serde(default)]
    pub xdebug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdebug_config: Option<String>,
    #[serde(default)]
    pub mail_catcher: bool,
    #[serde(default)]
    pub media_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_redirect_domain: Option<String>,
    /// Epoch milliseconds after which remote images may be pulled again.
    #[serde(default)]
    pub pull_after: i64,
    #[serde(default)]
    pub autologin_key: String,
}

impl InstanceDescriptor {
    /// Parse a descriptor, migrating legacy field names first.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let mut value: Value = serde_json::from_str(text)?;
        migrate_legacy(&mut value);
        serde_json::from_value(value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Compose project name: the slug without separators, prefixed.
    pub fn project_name(&self) -> String {
        project_name(&self.slug)
    }

    /// The environment's conventional local host name.
    pub fn host(&self, domain: &str) -> String {
        format!("{}.{}", self.slug, domain)
    }

    /// Generate an autologin key if the descriptor has none yet.
    /// Returns true when a key was generated.
    pub fn ensure_autologin_key(&mut self) -> bool {
        if !self.autologin_key.is_empty() {
            return false;
        }
        self.autologin_key = generate_autologin_key();
        true
    }

    /// The convenience URL that logs the browser in as the admin user.
    pub fn autologin_url(&self, domain: &str) -> Option<String> {
        if self.autologin_key.is_empty() {
            return None;
        }
        Some(format!(
            "http://{}/wp-admin/?vip-dev-autologin={}",
            self.host(domain),
            self.autologin_key
        ))
    }

    /// Whether the pull gate has elapsed at `now_ms`.
    pub fn pull_due(&self, now_ms: i64) -> bool {
        now_ms >= self.pull_after
    }

    pub fn advance_pull_after(&mut self, now_ms: i64) {
        self.pull_after = now_ms + PULL_CADENCE.as_millis() as i64;
    }
}

/// Compose project name for a slug.
pub fn project_name(slug: &str) -> String {
    let cleaned: String = slug
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect();
    format!("wpdev{}", cleaned)
}

pub fn generate_autologin_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTOLOGIN_KEY_LEN)
        .map(char::from)
        .collect()
}

/// Old field name -> current field name.
const RENAMED_FIELDS: &[(&str, &str)] = &[
    ("photon", "mediaProxy"),
    ("enterpriseSearchEnabled", "elasticsearch"),
    ("elasticsearchEnabled", "elasticsearch"),
    ("mailhog", "mailCatcher"),
    ("mailpit", "mailCatcher"),
    ("phpmyadmin", "phpMyAdmin"),
    ("clientCode", "appCode"),
    ("mariadb", "mariaDbVersion"),
];

const DROPPED_FIELDS: &[&str] = &["statsd"];

/// Rewrite legacy descriptor shapes into the current one, in place.
///
/// A current field always wins over its legacy alias.
pub fn migrate_legacy(value: &mut Value) {
    let Some(object) = value.as_object_mut() else {
        return;
    };

    for (old, new) in RENAMED_FIELDS {
        if let Some(legacy) = object.remove(*old) {
            object.entry(new.to_string()).or_insert(legacy);
        }
    }
    for field in DROPPED_FIELDS {
        object.remove(*field);
    }

    if let Some(Value::String(tag)) = object.get("wordpress").cloned() {
        let mut source = Map::new();
        source.insert("mode".into(), Value::String("image".into()));
        source.insert("tag".into(), Value::String(tag));
        object.insert("wordpress".into(), Value::Object(source));
    }

    for key in ["muPlugins", "appCode"] {
        if let Some(component) = object.get_mut(key) {
            migrate_component(component);
        }
    }
}

fn migrate_component(component: &mut Value) {
    match component {
        Value::String(text) => {
            let mut source = Map::new();
            if text.contains('/') || text.contains('\\') {
                source.insert("mode".into(), Value::String("local".into()));
                source.insert("dir".into(), Value::String(text.clone()));
            } else {
                source.insert("mode".into(), Value::String("image".into()));
                if !text.is_empty() && text != "image" {
                    source.insert("tag".into(), Value::String(text.clone()));
                }
            }
            *component = Value::Object(source);
        }
        Value::Object(source) if !source.contains_key("mode") => {
            let mode = if source.contains_key("dir") {
                "local"
            } else {
                "image"
            };
            source.insert("mode".into(), Value::String(mode.into()));
        }
        Value::Null => *component = serde_json::json!({ "mode": "image" }),
        _ => {}
    }
}

#[cfg(test)]
pub(crate) fn sample(slug: &str) -> InstanceDescriptor {
    InstanceDescriptor {
        slug: slug.to_string(),
        title: "Demo".to_string(),
        multisite: Multisite::Off,
        php_version: "ghcr.io/automattic/vip-container-images/php-fpm:8.2".to_string(),
        maria_db_version: None,
        wordpress: WordPressSource::image("6.4", Some("6.4.2")),
        mu_plugins: ComponentSource::Image { tag: None },
        app_code: ComponentSource::Image { tag: None },
        elasticsearch: false,
        php_my_admin: false,
        xdebug: false,
        xdebug_config: None,
        mail_catcher: false,
        media_proxy: false,
        media_redirect_domain: None,
        pull_after: 0,
        autologin_key: "key".to_string(),
    }
}
