//! The reverse proxy shared by every environment.
//!
//! One Traefik container on one bridge network routes `*.domain` requests
//! to whichever environments are running. Creation and cleanup are
//! idempotent because environments start and stop independently.

use tracing::{debug, info};

use super::engine::{Engine, ProxySpec};
use crate::error::Result;

pub const PROXY_NAME: &str = "wpdev_proxy";
pub const EDGE_NETWORK: &str = "wpdev_edge";
pub const PROXY_IMAGE: &str = "traefik:v2.11";
pub const PROXY_HTTP_PORT: u16 = 80;

pub fn proxy_spec() -> ProxySpec {
    ProxySpec {
        name: PROXY_NAME.to_string(),
        image: PROXY_IMAGE.to_string(),
        network: EDGE_NETWORK.to_string(),
        http_port: PROXY_HTTP_PORT,
    }
}

/// Command line of the proxy container.
pub fn proxy_args(network: &str) -> Vec<String> {
    vec![
        "--providers.docker=true".to_string(),
        "--providers.docker.exposedbydefault=false".to_string(),
        format!("--providers.docker.network={}", network),
        "--entrypoints.web.address=:80".to_string(),
        "--log.level=WARN".to_string(),
    ]
}

/// Remove a proxy container that exists but is not running. The engine
/// cannot reattach it to a recreated network.
pub async fn remove_orphaned_proxy(engine: &dyn Engine) -> Result<bool> {
    match engine.container_running(PROXY_NAME).await? {
        Some(false) => {
            info!(container = PROXY_NAME, "removing stopped proxy container");
            engine.remove_container(PROXY_NAME).await?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Make sure the edge network exists and the proxy runs on it.
pub async fn ensure_proxy(engine: &dyn Engine) -> Result<()> {
    engine.ensure_network(EDGE_NETWORK).await?;
    if engine.container_running(PROXY_NAME).await? == Some(true) {
        debug!(container = PROXY_NAME, "proxy already running");
        return Ok(());
    }
    engine.start_proxy(&proxy_spec()).await
}

/// Remove the proxy container once no environment uses it. Returns true
/// when it was removed. The edge network stays: stopped environments keep
/// referring to it, and another environment may be about to join it.
pub async fn release_proxy_if_unused(engine: &dyn Engine) -> Result<bool> {
    let members = engine.network_members(EDGE_NETWORK).await?;
    let users: Vec<&String> = members.iter().filter(|m| *m != PROXY_NAME).collect();
    if !users.is_empty() {
        debug!(users = users.len(), "proxy still in use");
        return Ok(false);
    }

    if engine.container_running(PROXY_NAME).await?.is_some() {
        info!(container = PROXY_NAME, "removing unused proxy");
        engine.remove_container(PROXY_NAME).await?;
    }
    Ok(true)
}
