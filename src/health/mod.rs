//! Up/partial/down status of an environment and its local DNS.
//!
//! Status is computed in two steps: probing, which does the network I/O,
//! and [`evaluate`], a pure function of the URLs, the running services and
//! the probe outcomes.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tokio::task::JoinSet;
use tracing::debug;

use crate::compose::stack::StackDefinition;
use crate::error::{EnvError, Result};
use crate::orchestrator::engine::Engine;

/// Statuses returned while a service is still starting behind the proxy.
pub const WARMING_UP: [u16; 3] = [502, 503, 504];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_RETRIES: usize = 3;
const PROBE_MIN_DELAY: Duration = Duration::from_millis(500);
const DNS_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallStatus {
    Up,
    PartiallyUp,
    Down,
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "UP",
            Self::PartiallyUp => "PARTIALLY UP",
            Self::Down => "DOWN",
        })
    }
}

/// A URL a service answers on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServiceUrl {
    pub service: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlHealth {
    pub service: String,
    pub url: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// Service -> whether every URL of it is healthy.
    pub services: BTreeMap<String, bool>,
    pub urls: Vec<UrlHealth>,
    pub overall: OverallStatus,
}

impl HealthReport {
    /// At least one URL, and every URL healthy.
    pub fn is_up(&self) -> bool {
        self.overall == OverallStatus::Up
    }
}

/// Whether a URL only works from the host itself.
pub fn is_loopback_url(url: &str) -> bool {
    let Ok(parsed) = reqwest::Url::parse(url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok_and(|ip| ip.is_loopback())
}

/// The routed URLs of a stack, without loopback-only ones.
pub fn reachable_urls(definition: &StackDefinition) -> Vec<ServiceUrl> {
    definition
        .urls()
        .filter(|(_, url)| !is_loopback_url(url))
        .map(|(service, url)| ServiceUrl {
            service: service.to_string(),
            url: url.to_string(),
        })
        .collect()
}

/// Combine URLs, running services and probe outcomes into a report.
///
/// A URL whose service is not running is down whatever its probe says.
pub fn evaluate(
    urls: &[ServiceUrl],
    running: &BTreeSet<String>,
    probes: &BTreeMap<String, bool>,
) -> HealthReport {
    let mut services: BTreeMap<String, bool> = BTreeMap::new();
    let mut checked = Vec::with_capacity(urls.len());
    for entry in urls {
        let healthy =
            running.contains(&entry.service) && probes.get(&entry.url).copied().unwrap_or(false);
        let service = services.entry(entry.service.clone()).or_insert(true);
        *service &= healthy;
        checked.push(UrlHealth {
            service: entry.service.clone(),
            url: entry.url.clone(),
            healthy,
        });
    }

    let healthy = checked.iter().filter(|u| u.healthy).count();
    let overall = if checked.is_empty() || healthy == 0 {
        OverallStatus::Down
    } else if healthy == checked.len() {
        OverallStatus::Up
    } else {
        OverallStatus::PartiallyUp
    };

    HealthReport {
        services,
        urls: checked,
        overall,
    }
}

#[derive(Debug, thiserror::Error)]
enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("still warming up (HTTP {0})")]
    WarmingUp(u16),
}

/// Issues HTTP probes with bounded retries.
#[derive(Debug, Clone)]
pub struct Prober {
    client: reqwest::Client,
    retries: usize,
    min_delay: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            retries: PROBE_RETRIES,
            min_delay: PROBE_MIN_DELAY,
        }
    }

    pub fn with_backoff(mut self, retries: usize, min_delay: Duration) -> Self {
        self.retries = retries;
        self.min_delay = min_delay;
        self
    }

    /// Whether `url` answers with a non-5xx status. Transport errors and
    /// warming-up statuses are retried.
    pub async fn probe(&self, url: &str) -> bool {
        let attempt = || async {
            let response = self.client.get(url).send().await?;
            let status = response.status().as_u16();
            if WARMING_UP.contains(&status) {
                return Err(ProbeError::WarmingUp(status));
            }
            Ok(status)
        };

        let result = attempt
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(self.min_delay)
                    .with_max_times(self.retries),
            )
            .notify(|err: &ProbeError, dur: Duration| {
                debug!(url, "probe failed: {}, retrying in {:?}", err, dur);
            })
            .await;

        match result {
            Ok(status) => status < 500,
            Err(e) => {
                debug!(url, error = %e, "probe gave up");
                false
            }
        }
    }
}

/// Probe the given URLs of a project concurrently and evaluate them.
pub async fn check_urls(
    engine: &dyn Engine,
    project: &str,
    urls: &[ServiceUrl],
    prober: &Prober,
) -> Result<HealthReport> {
    let running: BTreeSet<String> = engine
        .project_containers(project)
        .await?
        .into_iter()
        .filter(|c| c.running)
        .filter_map(|c| c.service)
        .collect();

    let mut probes = JoinSet::new();
    for entry in urls.iter().filter(|u| running.contains(&u.service)) {
        let prober = prober.clone();
        let url = entry.url.clone();
        probes.spawn(async move {
            let healthy = prober.probe(&url).await;
            (url, healthy)
        });
    }

    let mut outcomes = BTreeMap::new();
    while let Some(joined) = probes.join_next().await {
        match joined {
            Ok((url, healthy)) => {
                outcomes.insert(url, healthy);
            }
            Err(e) => debug!(error = %e, "probe task failed"),
        }
    }

    Ok(evaluate(urls, &running, &outcomes))
}

/// Health of every routed service of a stack.
pub async fn check_health(
    engine: &dyn Engine,
    project: &str,
    definition: &StackDefinition,
    prober: &Prober,
) -> Result<HealthReport> {
    check_urls(engine, project, &reachable_urls(definition), prober).await
}

/// Poll until the stack is up, giving up after `timeout`.
pub async fn wait_until_up(
    engine: &dyn Engine,
    slug: &str,
    project: &str,
    definition: &StackDefinition,
    prober: &Prober,
    timeout: Duration,
    interval: Duration,
) -> Result<HealthReport> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let report = check_health(engine, project, definition, prober).await?;
        if report.is_up() {
            return Ok(report);
        }
        if tokio::time::Instant::now() + interval > deadline {
            return Err(EnvError::NotReady {
                slug: slug.to_string(),
                timeout: humantime::format_duration(timeout).to_string(),
            });
        }
        debug!(slug, status = %report.overall, "waiting for environment");
        tokio::time::sleep(interval).await;
    }
}

/// Require `host` to resolve to loopback addresses only.
pub async fn verify_dns(host: &str) -> Result<()> {
    let unresolved = || EnvError::DnsUnresolved {
        domain: host.to_string(),
    };
    let addrs: Vec<IpAddr> = tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((host, 80)))
        .await
        .map_err(|_| unresolved())?
        .map_err(|_| unresolved())?
        .map(|a| a.ip())
        .collect();
    check_resolution(host, &addrs)
}

/// Validate the addresses `host` resolved to.
pub fn check_resolution(host: &str, addrs: &[IpAddr]) -> Result<()> {
    if addrs.is_empty() {
        return Err(EnvError::DnsUnresolved {
            domain: host.to_string(),
        });
    }
    if addrs.iter().all(IpAddr::is_loopback) {
        return Ok(());
    }
    let resolved = addrs
        .iter()
        .map(IpAddr::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Err(EnvError::DnsMisconfigured {
        domain: host.to_string(),
        resolved,
    })
}

/// Whether a registry host name resolves at all.
pub async fn registry_reachable(host: &str) -> bool {
    match tokio::time::timeout(DNS_TIMEOUT, tokio::net::lookup_host((host, 443))).await {
        Ok(Ok(mut addrs)) => addrs.next().is_some(),
        Ok(Err(e)) => {
            debug!(host, error = %e, "registry does not resolve");
            false
        }
        Err(_) => {
            debug!(host, "registry lookup timed out");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::stack::{render, write_stack, RenderSettings, STACK_FILE};
    use crate::environment::descriptor::sample;
    use crate::orchestrator::engine::mock::{MockEngine, MockProject};
    use crate::orchestrator::engine::StackRef;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn url(service: &str, url: &str) -> ServiceUrl {
        ServiceUrl {
            service: service.to_string(),
            url: url.to_string(),
        }
    }

    fn fast() -> Prober {
        Prober::new().with_backoff(2, Duration::from_millis(10))
    }

    fn running_project(engine: &MockEngine, project: &str, services: &[&str]) {
        engine.with(|s| {
            let mut p = MockProject::default();
            for service in services {
                p.services.insert(service.to_string(), true);
            }
            s.projects.insert(project.to_string(), p);
        });
    }

    #[test]
    fn evaluation_is_pure() {
        let urls = vec![url("nginx", "http://a.test/"), url("mailpit", "http://m.test/")];
        let running = BTreeSet::from(["nginx".to_string(), "mailpit".to_string()]);
        let probes = BTreeMap::from([
            ("http://a.test/".to_string(), true),
            ("http://m.test/".to_string(), false),
        ]);
        let first = evaluate(&urls, &running, &probes);
        let second = evaluate(&urls, &running, &probes);
        assert_eq!(first, second);
        assert_eq!(first.overall, OverallStatus::PartiallyUp);
        assert_eq!(first.services["nginx"], true);
        assert_eq!(first.services["mailpit"], false);
    }

    #[test]
    fn stopped_service_is_down_even_if_probe_passed() {
        let urls = vec![url("nginx", "http://a.test/")];
        let probes = BTreeMap::from([("http://a.test/".to_string(), true)]);
        let report = evaluate(&urls, &BTreeSet::new(), &probes);
        assert_eq!(report.overall, OverallStatus::Down);
        assert!(!report.is_up());
    }

    #[test]
    fn no_urls_means_down() {
        let report = evaluate(&[], &BTreeSet::new(), &BTreeMap::new());
        assert_eq!(report.overall, OverallStatus::Down);
        assert_eq!(report.overall.to_string(), "DOWN");
    }

    #[test]
    fn all_healthy_is_up() {
        let urls = vec![url("nginx", "http://a.test/")];
        let running = BTreeSet::from(["nginx".to_string()]);
        let probes = BTreeMap::from([("http://a.test/".to_string(), true)]);
        assert!(evaluate(&urls, &running, &probes).is_up());
    }

    #[test]
    fn loopback_urls_are_excluded() {
        assert!(is_loopback_url("http://localhost:8080/"));
        assert!(is_loopback_url("http://127.0.0.1/"));
        assert!(is_loopback_url("http://[::1]:80/"));
        assert!(!is_loopback_url("http://demo.vipdev.lndo.site/"));

        let mut stack = render(
            &sample("demo"),
            &RenderSettings {
                image_repository: "repo".into(),
                domain: "vipdev.lndo.site".into(),
            },
        );
        stack
            .routes
            .entry("nginx".to_string())
            .or_default()
            .push("http://localhost:8080/".to_string());
        let urls = reachable_urls(&stack);
        assert_eq!(urls, vec![url("nginx", "http://demo.vipdev.lndo.site/")]);
    }

    #[tokio::test]
    async fn healthy_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        assert!(fast().probe(&server.uri()).await);
    }

    #[tokio::test]
    async fn warming_up_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .with_priority(2)
            .mount(&server)
            .await;
        assert!(fast().probe(&server.uri()).await);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn server_errors_are_unhealthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        assert!(!fast().probe(&server.uri()).await);
        // 500 is not a warming-up status, so it is not retried.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persistent_warm_up_gives_up() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        assert!(!fast().probe(&server.uri()).await);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn only_running_services_are_probed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let engine = MockEngine::default();
        running_project(&engine, "wpdevdemo", &["nginx"]);

        let urls = vec![
            url("nginx", &format!("{}/", server.uri())),
            url("phpmyadmin", &format!("{}/pma", server.uri())),
        ];
        let report = check_urls(&engine, "wpdevdemo", &urls, &fast()).await.unwrap();
        assert_eq!(report.overall, OverallStatus::PartiallyUp);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn environment_that_never_started_is_down() {
        let tmp = tempfile::tempdir().unwrap();
        let stack = StackRef {
            project: "wpdevdemo1".to_string(),
            file: tmp.path().join(STACK_FILE),
        };
        let definition = render(
            &sample("demo-1"),
            &RenderSettings {
                image_repository: "repo".into(),
                domain: "vipdev.lndo.site".into(),
            },
        );
        write_stack(&stack.file, &definition).unwrap();
        let engine = MockEngine::default();

        let report = check_health(&engine, &stack.project, &definition, &fast())
            .await
            .unwrap();
        assert_eq!(report.overall, OverallStatus::Down);
        assert!(report.urls.iter().all(|u| !u.healthy));

        let err = wait_until_up(
            &engine,
            "demo-1",
            &stack.project,
            &definition,
            &fast(),
            Duration::from_millis(30),
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EnvError::NotReady { .. }));
    }

    #[test]
    fn resolution_must_be_loopback() {
        let loopback: IpAddr = "127.0.0.1".parse().unwrap();
        let public: IpAddr = "192.168.1.10".parse().unwrap();
        assert!(check_resolution("a.test", &[loopback]).is_ok());
        assert!(matches!(
            check_resolution("a.test", &[loopback, public]).unwrap_err(),
            EnvError::DnsMisconfigured { ref resolved, .. } if resolved == "127.0.0.1, 192.168.1.10"
        ));
        assert!(matches!(
            check_resolution("a.test", &[]).unwrap_err(),
            EnvError::DnsUnresolved { .. }
        ));
    }

    #[tokio::test]
    async fn localhost_resolves_to_loopback() {
        verify_dns("localhost").await.unwrap();
    }
}
