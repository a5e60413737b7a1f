use std::path::PathBuf;

/// Default source of the WordPress version manifest.
pub const DEFAULT_VERSIONS_URL: &str =
    "https://raw.githubusercontent.com/Automattic/vip-container-images/master/wordpress/versions.json";

/// Default repository prefix for every image the stack uses.
pub const DEFAULT_IMAGE_REPOSITORY: &str = "ghcr.io/automattic/vip-container-images";

/// Wildcard domain whose subdomains resolve to 127.0.0.1.
pub const DEFAULT_DOMAIN: &str = "vipdev.lndo.site";

/// Process-wide settings resolved from the environment.
///
/// Recomputed on every invocation and never persisted.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding one sub-directory per environment.
    pub environments_dir: PathBuf,
    /// Directory for the version manifest cache.
    pub cache_dir: PathBuf,
    pub versions_url: String,
    pub image_repository: String,
    pub domain: String,
    pub non_interactive: bool,
}

impl Settings {
    /// Resolve settings from `WPDEV_*` variables, falling back to the
    /// platform data and cache directories.
    pub fn from_env(home_override: Option<PathBuf>) -> Self {
        let environments_dir = home_override
            .or_else(|| env_path("WPDEV_HOME"))
            .unwrap_or_else(|| crate::platform::data_dir().join("environments"));
        let cache_dir =
            env_path("WPDEV_CACHE_DIR").unwrap_or_else(crate::platform::cache_dir);

        Self {
            environments_dir,
            cache_dir,
            versions_url: env_string("WPDEV_VERSIONS_URL")
                .unwrap_or_else(|| DEFAULT_VERSIONS_URL.to_string()),
            image_repository: env_string("WPDEV_IMAGE_REPOSITORY")
                .unwrap_or_else(|| DEFAULT_IMAGE_REPOSITORY.to_string()),
            domain: env_string("WPDEV_DOMAIN").unwrap_or_else(|| DEFAULT_DOMAIN.to_string()),
            non_interactive: env_string("WPDEV_NON_INTERACTIVE")
                .and_then(|v| crate::config::coerce::parse_bool(&v))
                .unwrap_or(false),
        }
    }

    /// Settings rooted in a scratch directory, for tests.
    pub fn for_dir(root: &std::path::Path) -> Self {
        Self {
            environments_dir: root.join("environments"),
            cache_dir: root.join("cache"),
            versions_url: DEFAULT_VERSIONS_URL.to_string(),
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_string(),
            domain: DEFAULT_DOMAIN.to_string(),
            non_interactive: true,
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env_string(key).map(|v| PathBuf::from(crate::platform::expand_home(&v)))
}
