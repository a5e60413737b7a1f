//! Rendering an instance descriptor into a compose stack file.
//!
//! The stack file is the only engine-facing artifact. Besides the regular
//! compose keys it carries two extension keys: `x-wpdev-tooling` with the
//! tools `exec` can run, and `x-wpdev-routes` with the URLs each
//! HTTP-facing service answers on.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::pipeline::APP_CODE_LAYOUT;
use crate::environment::{ComponentSource, InstanceDescriptor, Multisite};
use crate::orchestrator::proxy::EDGE_NETWORK;

/// Name of the stack file inside an environment directory.
pub const STACK_FILE: &str = "docker-compose.yml";

/// Compose key of the shared proxy network.
pub const EDGE_NETWORK_KEY: &str = "edge";

/// Named volumes seeded from tool and content images. They are dropped on
/// rebuild so fresh images are not masked by old volume content.
pub const TOOLING_VOLUMES: &[&str] = &["devtools", "wordpress", "mu-plugins", "app-code"];

const DEFAULT_MARIADB: &str = "11.4";
const DEVTOOLS_TAG: &str = "0.9";

/// A parsed or rendered stack file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub services: BTreeMap<String, ServiceDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, VolumeDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkDefinition>,
    #[serde(rename = "x-wpdev-tooling", default)]
    pub tooling: BTreeMap<String, ToolDefinition>,
    #[serde(rename = "x-wpdev-routes", default)]
    pub routes: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Short-form mounts, `source:target[:ro]`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDefinition {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
}

/// A named command `exec` can run inside a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub service: String,
    pub cmd: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl StackDefinition {
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.tooling.keys().map(String::as_str)
    }

    /// Every URL the stack serves, paired with the owning service.
    pub fn urls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes
            .iter()
            .flat_map(|(service, urls)| urls.iter().map(move |u| (service.as_str(), u.as_str())))
    }
}

/// Inputs to rendering that are not part of the descriptor.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub image_repository: String,
    pub domain: String,
}

/// Render the stack of one environment.
pub fn render(descriptor: &InstanceDescriptor, settings: &RenderSettings) -> StackDefinition {
    let repo = settings.image_repository.as_str();
    let project = descriptor.project_name();
    let host = descriptor.host(&settings.domain);

    let mut services = BTreeMap::new();
    let mut volumes: BTreeMap<String, VolumeDefinition> =
        ["wordpress", "devtools", "uploads", "database"]
            .into_iter()
            .map(|v| (v.to_string(), VolumeDefinition::default()))
            .collect();
    let mut routes = BTreeMap::new();

    let mut code_mounts = vec![
        "wordpress:/wp".to_string(),
        "uploads:/wp/wp-content/uploads".to_string(),
    ];
    let mut content_services = vec!["wordpress".to_string(), "devtools".to_string()];

    services.insert(
        "wordpress".to_string(),
        data_service(
            format!("{}/wordpress:{}", repo, descriptor.wordpress.tag),
            "wordpress:/wp",
        ),
    );
    services.insert(
        "devtools".to_string(),
        data_service(
            format!("{}/dev-tools:{}", repo, DEVTOOLS_TAG),
            "devtools:/dev-tools",
        ),
    );

    match &descriptor.mu_plugins {
        ComponentSource::Local { dir } => {
            code_mounts.push(format!("{}:/wp/wp-content/mu-plugins", dir.display()));
        }
        ComponentSource::Image { tag } => {
            services.insert(
                "mu-plugins".to_string(),
                data_service(
                    format!(
                        "{}/vip-go-mu-plugins:{}",
                        repo,
                        tag.as_deref().unwrap_or("latest")
                    ),
                    "mu-plugins:/shared",
                ),
            );
            volumes.insert("mu-plugins".to_string(), VolumeDefinition::default());
            code_mounts.push("mu-plugins:/wp/wp-content/mu-plugins".to_string());
            content_services.push("mu-plugins".to_string());
        }
    }

    match &descriptor.app_code {
        ComponentSource::Local { dir } => {
            for sub in APP_CODE_LAYOUT {
                code_mounts.push(format!("{}:{}", dir.join(sub).display(), app_code_target(sub)));
            }
        }
        ComponentSource::Image { tag } => {
            services.insert(
                "app-code".to_string(),
                data_service(
                    format!("{}/skeleton:{}", repo, tag.as_deref().unwrap_or("latest")),
                    "app-code:/app-code",
                ),
            );
            volumes.insert("app-code".to_string(), VolumeDefinition::default());
            code_mounts.push("app-code:/app-code".to_string());
            content_services.push("app-code".to_string());
        }
    }

    let mut php_env = BTreeMap::from([
        ("DB_HOST".to_string(), "database".to_string()),
        ("MEMCACHED_HOST".to_string(), "memcached:11211".to_string()),
        ("WPDEV_SLUG".to_string(), descriptor.slug.clone()),
        ("WPDEV_HOST".to_string(), host.clone()),
        ("WPDEV_TITLE".to_string(), descriptor.title.clone()),
        ("WPDEV_MULTISITE".to_string(), descriptor.multisite.to_string()),
        (
            "WPDEV_AUTOLOGIN_KEY".to_string(),
            descriptor.autologin_key.clone(),
        ),
        (
            "XDEBUG_MODE".to_string(),
            if descriptor.xdebug { "debug" } else { "off" }.to_string(),
        ),
    ]);
    if let Some(config) = &descriptor.xdebug_config {
        php_env.insert("XDEBUG_CONFIG".to_string(), config.clone());
    }
    if descriptor.elasticsearch {
        php_env.insert("ES_HOST".to_string(), "elasticsearch:9200".to_string());
    }
    if descriptor.mail_catcher {
        php_env.insert("SMTP_HOST".to_string(), "mailpit:1025".to_string());
    }

    let mut php_mounts = code_mounts.clone();
    php_mounts.push("devtools:/dev-tools".to_string());
    let mut php_depends = vec!["database".to_string(), "memcached".to_string()];
    php_depends.extend(content_services);
    services.insert(
        "php".to_string(),
        ServiceDefinition {
            image: descriptor.php_version.clone(),
            environment: php_env,
            volumes: php_mounts,
            depends_on: php_depends,
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        },
    );

    let mut nginx_env = BTreeMap::new();
    if let Some(domain) = &descriptor.media_redirect_domain {
        nginx_env.insert("MEDIA_REDIRECT_URL".to_string(), format!("https://{}", domain));
    }
    if descriptor.media_proxy {
        nginx_env.insert("MEDIA_PROXY_HOST".to_string(), "photon:80".to_string());
    }
    let mut nginx_depends = vec!["php".to_string()];
    if descriptor.media_proxy {
        nginx_depends.push("photon".to_string());
    }
    services.insert(
        "nginx".to_string(),
        ServiceDefinition {
            image: format!("{}/nginx:latest", repo),
            environment: nginx_env,
            volumes: code_mounts.iter().map(|m| format!("{}:ro", m)).collect(),
            depends_on: nginx_depends,
            labels: edge_labels(&project, "nginx", &host, 80, descriptor.multisite),
            networks: vec!["default".to_string(), EDGE_NETWORK_KEY.to_string()],
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        },
    );
    routes.insert("nginx".to_string(), vec![format!("http://{}/", host)]);

    services.insert(
        "database".to_string(),
        ServiceDefinition {
            image: format!(
                "mariadb:{}",
                descriptor
                    .maria_db_version
                    .as_deref()
                    .unwrap_or(DEFAULT_MARIADB)
            ),
            environment: BTreeMap::from([
                ("MARIADB_ALLOW_EMPTY_ROOT_PASSWORD".to_string(), "1".to_string()),
                ("MARIADB_DATABASE".to_string(), "wordpress".to_string()),
            ]),
            volumes: vec!["database:/var/lib/mysql".to_string()],
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        },
    );

    services.insert(
        "memcached".to_string(),
        ServiceDefinition {
            image: "memcached:1.6-alpine".to_string(),
            restart: Some("unless-stopped".to_string()),
            ..Default::default()
        },
    );

    if descriptor.media_proxy {
        services.insert(
            "photon".to_string(),
            ServiceDefinition {
                image: format!("{}/photon:latest", repo),
                volumes: vec!["uploads:/wp/wp-content/uploads:ro".to_string()],
                restart: Some("unless-stopped".to_string()),
                ..Default::default()
            },
        );
    }

    if descriptor.elasticsearch {
        services.insert(
            "elasticsearch".to_string(),
            ServiceDefinition {
                image: "elasticsearch:7.17.21".to_string(),
                environment: BTreeMap::from([
                    ("discovery.type".to_string(), "single-node".to_string()),
                    ("xpack.security.enabled".to_string(), "false".to_string()),
                    ("ES_JAVA_OPTS".to_string(), "-Xms512m -Xmx512m".to_string()),
                ]),
                volumes: vec!["search-data:/usr/share/elasticsearch/data".to_string()],
                restart: Some("unless-stopped".to_string()),
                ..Default::default()
            },
        );
        volumes.insert("search-data".to_string(), VolumeDefinition::default());
    }

    if descriptor.php_my_admin {
        let pma_host = format!("{}-pma.{}", descriptor.slug, settings.domain);
        services.insert(
            "phpmyadmin".to_string(),
            ServiceDefinition {
                image: "phpmyadmin:5".to_string(),
                environment: BTreeMap::from([
                    ("PMA_HOST".to_string(), "database".to_string()),
                    ("PMA_USER".to_string(), "root".to_string()),
                ]),
                depends_on: vec!["database".to_string()],
                labels: edge_labels(&project, "phpmyadmin", &pma_host, 80, Multisite::Off),
                networks: vec!["default".to_string(), EDGE_NETWORK_KEY.to_string()],
                restart: Some("unless-stopped".to_string()),
                ..Default::default()
            },
        );
        routes.insert("phpmyadmin".to_string(), vec![format!("http://{}/", pma_host)]);
    }

    if descriptor.mail_catcher {
        let mail_host = format!("{}-mailpit.{}", descriptor.slug, settings.domain);
        services.insert(
            "mailpit".to_string(),
            ServiceDefinition {
                image: "axllent/mailpit:latest".to_string(),
                labels: edge_labels(&project, "mailpit", &mail_host, 8025, Multisite::Off),
                networks: vec!["default".to_string(), EDGE_NETWORK_KEY.to_string()],
                restart: Some("unless-stopped".to_string()),
                ..Default::default()
            },
        );
        routes.insert("mailpit".to_string(), vec![format!("http://{}/", mail_host)]);
    }

    let networks = BTreeMap::from([(
        EDGE_NETWORK_KEY.to_string(),
        NetworkDefinition {
            name: Some(EDGE_NETWORK.to_string()),
            external: Some(true),
        },
    )]);

    StackDefinition {
        name: Some(project),
        services,
        volumes,
        networks,
        tooling: default_tooling(),
        routes,
    }
}

fn data_service(image: String, mount: &str) -> ServiceDefinition {
    ServiceDefinition {
        image,
        volumes: vec![mount.to_string()],
        ..Default::default()
    }
}

fn app_code_target(sub: &str) -> String {
    match sub {
        "private" | "vip-config" => format!("/wp/{}", sub),
        other => format!("/wp/wp-content/{}", other),
    }
}

/// Routing labels read by the shared proxy.
fn edge_labels(
    project: &str,
    service: &str,
    host: &str,
    port: u16,
    multisite: Multisite,
) -> BTreeMap<String, String> {
    let router = format!("{}-{}", project, service);
    let rule = match multisite {
        Multisite::Subdomain => format!(
            "Host(`{host}`) || HostRegexp(`{{subdomain:[a-z0-9-]+}}.{host}`)"
        ),
        _ => format!("Host(`{host}`)"),
    };
    BTreeMap::from([
        ("traefik.enable".to_string(), "true".to_string()),
        ("traefik.docker.network".to_string(), EDGE_NETWORK.to_string()),
        (format!("traefik.http.routers.{}.rule", router), rule),
        (
            format!("traefik.http.routers.{}.entrypoints", router),
            "web".to_string(),
        ),
        (
            format!("traefik.http.services.{}.loadbalancer.server.port", router),
            port.to_string(),
        ),
    ])
}

/// Tools every environment offers to `exec`.
pub fn default_tooling() -> BTreeMap<String, ToolDefinition> {
    let tool = |service: &str, cmd: &[&str], user: Option<&str>, description: &str| ToolDefinition {
        service: service.to_string(),
        cmd: cmd.iter().map(|c| c.to_string()).collect(),
        user: user.map(String::from),
        description: description.to_string(),
    };
    BTreeMap::from([
        (
            "wp".to_string(),
            tool("php", &["wp", "--path=/wp"], Some("www-data"), "Run WP-CLI"),
        ),
        (
            "php".to_string(),
            tool("php", &["php"], Some("www-data"), "Run the PHP interpreter"),
        ),
        (
            "db".to_string(),
            tool(
                "database",
                &["mariadb", "-uroot", "wordpress"],
                None,
                "Open a MariaDB client on the WordPress schema",
            ),
        ),
    ])
}

pub fn write_stack(path: &Path, definition: &StackDefinition) -> crate::error::Result<()> {
    let yaml = serde_yaml::to_string(definition).map_err(|e| crate::error::EnvError::WriteFailed {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    crate::io::atomic_write(path, yaml.as_bytes())
}

pub fn read_stack(path: &Path) -> Result<StackDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading stack file {}", path.display()))?;
    serde_yaml::from_str(&content).with_context(|| format!("parsing stack file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::descriptor::sample;
    use std::path::PathBuf;

    fn settings() -> RenderSettings {
        RenderSettings {
            image_repository: "ghcr.io/automattic/vip-container-images".to_string(),
            domain: "vipdev.lndo.site".to_string(),
        }
    }

    #[test]
    fn default_stack_services() {
        let stack = render(&sample("demo-1"), &settings());
        let names: Vec<&str> = stack.services.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["app-code", "database", "devtools", "memcached", "mu-plugins", "nginx", "php", "wordpress"]
        );
        assert_eq!(stack.name.as_deref(), Some("wpdevdemo1"));
        assert_eq!(
            stack.services["wordpress"].image,
            "ghcr.io/automattic/vip-container-images/wordpress:6.4"
        );
        assert_eq!(stack.services["database"].image, "mariadb:11.4");
        assert_eq!(
            stack.routes["nginx"],
            vec!["http://demo-1.vipdev.lndo.site/".to_string()]
        );
        assert_eq!(stack.networks[EDGE_NETWORK_KEY].name.as_deref(), Some(EDGE_NETWORK));
    }

    #[test]
    fn only_http_services_join_the_edge_network() {
        let mut d = sample("demo");
        d.php_my_admin = true;
        d.mail_catcher = true;
        let stack = render(&d, &settings());
        let edge: Vec<&str> = stack
            .services
            .iter()
            .filter(|(_, s)| s.networks.iter().any(|n| n == EDGE_NETWORK_KEY))
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(edge, ["mailpit", "nginx", "phpmyadmin"]);
        assert_eq!(
            stack.routes["mailpit"],
            vec!["http://demo-mailpit.vipdev.lndo.site/".to_string()]
        );
        assert_eq!(
            stack.services["mailpit"].labels["traefik.http.services.wpdevdemo-mailpit.loadbalancer.server.port"],
            "8025"
        );
    }

    #[test]
    fn local_components_are_bind_mounted() {
        let mut d = sample("demo");
        d.mu_plugins = ComponentSource::Local { dir: PathBuf::from("/src/mu") };
        d.app_code = ComponentSource::Local { dir: PathBuf::from("/src/site") };
        let stack = render(&d, &settings());

        assert!(!stack.services.contains_key("mu-plugins"));
        assert!(!stack.services.contains_key("app-code"));
        assert!(!stack.volumes.contains_key("app-code"));
        let php = &stack.services["php"].volumes;
        assert!(php.contains(&"/src/mu:/wp/wp-content/mu-plugins".to_string()));
        assert!(php.contains(&"/src/site/themes:/wp/wp-content/themes".to_string()));
        assert!(php.contains(&"/src/site/vip-config:/wp/vip-config".to_string()));
        assert!(stack.services["nginx"]
            .volumes
            .contains(&"/src/site/plugins:/wp/wp-content/plugins:ro".to_string()));
    }

    #[test]
    fn subdomain_multisite_routes_wildcards() {
        let mut d = sample("demo");
        d.multisite = Multisite::Subdomain;
        let stack = render(&d, &settings());
        let rule = &stack.services["nginx"].labels["traefik.http.routers.wpdevdemo-nginx.rule"];
        assert!(rule.contains("HostRegexp"));
        assert!(rule.starts_with("Host(`demo.vipdev.lndo.site`)"));
    }

    #[test]
    fn feature_toggles_reach_php() {
        let mut d = sample("demo");
        d.xdebug = true;
        d.xdebug_config = Some("client_host=host.docker.internal".to_string());
        d.elasticsearch = true;
        let stack = render(&d, &settings());
        let env = &stack.services["php"].environment;
        assert_eq!(env["XDEBUG_MODE"], "debug");
        assert_eq!(env["XDEBUG_CONFIG"], "client_host=host.docker.internal");
        assert_eq!(env["WPDEV_AUTOLOGIN_KEY"], "key");
        assert!(stack.services.contains_key("elasticsearch"));
        assert!(stack.volumes.contains_key("search-data"));
    }

    #[test]
    fn tooling_is_written_and_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STACK_FILE);
        let stack = render(&sample("demo"), &settings());
        write_stack(&path, &stack).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("x-wpdev-tooling"));
        let back = read_stack(&path).unwrap();
        assert_eq!(back, stack);
        let tools: Vec<&str> = back.tool_names().collect();
        assert_eq!(tools, ["db", "php", "wp"]);
        assert_eq!(back.tooling["wp"].cmd, ["wp", "--path=/wp"]);
    }

    #[test]
    fn garbage_stack_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(STACK_FILE);
        std::fs::write(&path, "services: [not, a, map").unwrap();
        assert!(read_stack(&path).is_err());
        assert!(read_stack(&tmp.path().join("missing.yml")).is_err());
    }
}
