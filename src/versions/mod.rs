//! WordPress version manifest: cached, refreshed from a remote source, and
//! resolved against user requests.

pub mod advisory;

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context};
use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{closest_match, EnvError, Result};

/// Tag of the latest development snapshot.
pub const TRUNK: &str = "trunk";

/// Cache file name inside the cache directory.
pub const CACHE_FILE: &str = "wordpress-versions.json";

/// How long a cached manifest is considered fresh.
pub const MANIFEST_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// One entry of the version manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordPressTag {
    /// Concrete build the tag currently points to.
    #[serde(rename = "ref")]
    pub reference: String,
    /// User-facing label, e.g. `6.4` or `trunk`.
    pub tag: String,
    #[serde(default)]
    pub cacheable: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub prerelease: bool,
}

impl WordPressTag {
    fn new(tag: &str, reference: &str, prerelease: bool) -> Self {
        Self {
            reference: reference.to_string(),
            tag: tag.to_string(),
            cacheable: true,
            locked: false,
            prerelease,
        }
    }
}

/// Manifest used when nothing better is available, so a first run works
/// offline.
pub fn seed_manifest() -> Vec<WordPressTag> {
    let mut seed = vec![
        WordPressTag::new(TRUNK, TRUNK, true),
        WordPressTag::new("6.7", "6.7.1", false),
        WordPressTag::new("6.6", "6.6.2", false),
        WordPressTag::new("6.5", "6.5.5", false),
        WordPressTag::new("6.4", "6.4.5", false),
    ];
    sort_newest_first(&mut seed);
    seed
}

/// Numeric components of a dotted version, or `None` for labels like
/// `trunk`.
pub fn version_key(tag: &str) -> Option<Vec<u64>> {
    tag.split('.').map(|part| part.parse().ok()).collect()
}

/// Compare two tags as versions; non-numeric tags sort above numeric ones.
pub fn compare_tags(a: &str, b: &str) -> Ordering {
    match (version_key(a), version_key(b)) {
        (Some(a), Some(b)) => a.cmp(&b),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Order the manifest newest-first: development snapshots, then releases
/// in descending version order.
pub fn sort_newest_first(manifest: &mut [WordPressTag]) {
    manifest.sort_by(|a, b| compare_tags(&b.tag, &a.tag));
}

/// The most recent entry that is not a prerelease.
pub fn newest_stable(manifest: &[WordPressTag]) -> Option<&WordPressTag> {
    manifest.iter().find(|t| !t.prerelease)
}

/// Resolve a requested tag to a manifest entry.
///
/// `None` (or `latest`) selects the newest non-prerelease entry. An explicit
/// tag must match an entry exactly; the `trunk` sentinel is always accepted.
pub fn resolve(manifest: &[WordPressTag], requested: Option<&str>) -> Result<WordPressTag> {
    let requested = requested.map(str::trim).filter(|r| !r.is_empty());
    match requested {
        None | Some("latest") => newest_stable(manifest).cloned().ok_or_else(|| {
            EnvError::UnknownVersion {
                requested: "latest".to_string(),
                suggestion: None,
                available: available_tags(manifest),
            }
        }),
        Some(tag) => {
            if let Some(entry) = manifest.iter().find(|t| t.tag == tag) {
                return Ok(entry.clone());
            }
            if tag == TRUNK {
                return Ok(WordPressTag::new(TRUNK, TRUNK, true));
            }
            Err(EnvError::UnknownVersion {
                requested: tag.to_string(),
                suggestion: closest_match(tag, manifest.iter().map(|t| t.tag.as_str())),
                available: available_tags(manifest),
            })
        }
    }
}

fn available_tags(manifest: &[WordPressTag]) -> String {
    manifest
        .iter()
        .map(|t| t.tag.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads the manifest from the TTL cache, refreshing it when stale.
pub struct ManifestSource {
    cache_path: PathBuf,
    url: String,
    ttl: Duration,
    client: reqwest::Client,
}

impl ManifestSource {
    pub fn new(cache_dir: &Path, url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            cache_path: cache_dir.join(CACHE_FILE),
            url: url.to_string(),
            ttl: MANIFEST_TTL,
            client,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// The current manifest, newest-first. Never fails: a failed refresh
    /// serves the stale cache, and with no cache the seed list.
    pub async fn manifest(&self) -> Vec<WordPressTag> {
        let cached = self.read_cache();
        if let Some((manifest, true)) = &cached {
            debug!(path = %self.cache_path.display(), "using cached version manifest");
            return manifest.clone();
        }

        match self.refresh().await {
            Ok(manifest) => manifest,
            Err(e) => match cached {
                Some((manifest, _)) => {
                    warn!(error = %format!("{:#}", e), "could not refresh version manifest, using cached copy");
                    manifest
                }
                None => {
                    warn!(error = %format!("{:#}", e), "could not fetch version manifest, using built-in list");
                    seed_manifest()
                }
            },
        }
    }

    /// Cached manifest and whether it is still fresh.
    fn read_cache(&self) -> Option<(Vec<WordPressTag>, bool)> {
        let content = std::fs::read_to_string(&self.cache_path).ok()?;
        let mut manifest: Vec<WordPressTag> = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "ignoring unreadable manifest cache");
                return None;
            }
        };
        if manifest.is_empty() {
            return None;
        }
        sort_newest_first(&mut manifest);

        let fresh = std::fs::metadata(&self.cache_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age < self.ttl);
        Some((manifest, fresh))
    }

    async fn refresh(&self) -> anyhow::Result<Vec<WordPressTag>> {
        let mut manifest = (|| async { self.fetch().await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_delay(Duration::from_secs(2))
                    .with_max_times(2),
            )
            .notify(|err: &anyhow::Error, dur: Duration| {
                debug!("manifest fetch failed: {:#}, retrying in {:?}", err, dur);
            })
            .await?;

        sort_newest_first(&mut manifest);
        let json = serde_json::to_string_pretty(&manifest)?;
        if let Err(e) = crate::io::atomic_write(&self.cache_path, json.as_bytes()) {
            warn!(error = %e, "could not persist version manifest cache");
        }
        Ok(manifest)
    }

    async fn fetch(&self) -> anyhow::Result<Vec<WordPressTag>> {
        debug!(url = %self.url, "fetching version manifest");
        let manifest: Vec<WordPressTag> = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("requesting version manifest")?
            .error_for_status()?
            .json()
            .await
            .context("parsing version manifest")?;
        if manifest.is_empty() {
            bail!("version manifest is empty");
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn scenario_manifest() -> Vec<WordPressTag> {
        vec![
            WordPressTag::new("6.4", "6.4.2", false),
            WordPressTag::new("trunk", "HEAD", true),
        ]
    }

    #[test]
    fn resolves_exact_tag_to_ref() {
        let manifest = scenario_manifest();
        assert_eq!(resolve(&manifest, Some("6.4")).unwrap().reference, "6.4.2");
    }

    #[test]
    fn unknown_explicit_tag_is_an_error() {
        let err = resolve(&scenario_manifest(), Some("6.9")).unwrap_err();
        assert!(err.to_string().contains("unknown or unsupported version `6.9`"));
        assert!(matches!(err, EnvError::UnknownVersion { .. }));
    }

    #[test]
    fn resolve_is_idempotent() {
        let manifest = scenario_manifest();
        assert_eq!(
            resolve(&manifest, Some("6.4")).unwrap(),
            resolve(&manifest, Some("6.4")).unwrap()
        );
    }

    #[test]
    fn unpinned_request_picks_newest_stable() {
        let mut manifest = scenario_manifest();
        manifest.push(WordPressTag::new("6.5", "6.5.1", false));
        sort_newest_first(&mut manifest);
        assert_eq!(resolve(&manifest, None).unwrap().tag, "6.5");
        assert_eq!(resolve(&manifest, Some("latest")).unwrap().tag, "6.5");
    }

    #[test]
    fn trunk_sentinel_always_accepted() {
        let manifest = vec![WordPressTag::new("6.4", "6.4.2", false)];
        let trunk = resolve(&manifest, Some(TRUNK)).unwrap();
        assert!(trunk.prerelease);
    }

    #[test]
    fn sort_puts_snapshots_first_then_descending() {
        let mut manifest = vec![
            WordPressTag::new("6.4", "6.4.2", false),
            WordPressTag::new("6.10", "6.10.0", false),
            WordPressTag::new("trunk", "HEAD", true),
            WordPressTag::new("6.9", "6.9.1", false),
        ];
        sort_newest_first(&mut manifest);
        let tags: Vec<_> = manifest.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["trunk", "6.10", "6.9", "6.4"]);
    }

    #[test]
    fn seed_is_sorted_and_has_a_stable_release() {
        let seed = seed_manifest();
        assert_eq!(seed[0].tag, TRUNK);
        assert!(newest_stable(&seed).is_some());
    }

    fn manifest_json() -> serde_json::Value {
        serde_json::json!([
            {"ref": "6.3.2", "tag": "6.3", "cacheable": true, "locked": false, "prerelease": false},
            {"ref": "6.4.2", "tag": "6.4", "cacheable": true, "locked": false, "prerelease": false},
            {"ref": "HEAD", "tag": "trunk", "cacheable": false, "locked": false, "prerelease": true}
        ])
    }

    #[tokio::test]
    async fn refresh_persists_sorted_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/versions.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(manifest_json()))
            .expect(1)
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let source = ManifestSource::new(tmp.path(), &format!("{}/versions.json", server.uri()));
        let manifest = source.manifest().await;
        let tags: Vec<_> = manifest.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(tags, vec!["trunk", "6.4", "6.3"]);
        assert!(source.cache_path().is_file());

        // Fresh cache: no second request (the mock expects exactly one).
        let again = source.manifest().await;
        assert_eq!(again, manifest);
    }

    #[tokio::test]
    async fn stale_cache_served_when_refresh_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let cached = vec![WordPressTag::new("6.1", "6.1.4", false)];
        std::fs::write(
            tmp.path().join(CACHE_FILE),
            serde_json::to_string(&cached).unwrap(),
        )
        .unwrap();

        let source = ManifestSource::new(tmp.path(), &server.uri()).with_ttl(Duration::ZERO);
        assert_eq!(source.manifest().await, cached);
    }

    #[tokio::test]
    async fn seed_served_without_cache_or_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let source = ManifestSource::new(tmp.path(), &server.uri());
        assert_eq!(source.manifest().await, seed_manifest());
        assert!(!source.cache_path().exists());
    }
}
