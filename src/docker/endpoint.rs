use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EnvError, Result};

/// Conventional system-wide engine socket.
pub const SYSTEM_SOCKET: &str = "/var/run/docker.sock";

/// Per-user socket used by desktop engine distributions, relative to `$HOME`.
pub const USER_SOCKET: &str = ".docker/run/docker.sock";

/// Canonical TLS port of the engine API.
pub const TLS_PORT: u16 = 2376;

const PLAIN_PORT: u16 = 2375;

/// Where the container engine can be reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

/// Client certificates loaded from the configured certificate directory.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    /// Individual PEM certificates of the CA bundle, in file order.
    pub ca_chain: Vec<String>,
    pub ca_path: PathBuf,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Connection parameters for one process lifetime. Never persisted.
#[derive(Debug, Clone)]
pub struct EngineConnectionConfig {
    /// `None` means "use the engine client's default transport".
    pub endpoint: Option<Endpoint>,
    pub protocol: Protocol,
    pub tls: Option<TlsMaterial>,
    pub timeout: Option<Duration>,
}

/// Engine-related environment variables, using the names of the standard
/// container CLI so existing shells keep working.
#[derive(Debug, Clone, Default)]
pub struct EngineEnv {
    pub docker_host: Option<String>,
    pub tls_verify: bool,
    pub cert_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub home: Option<PathBuf>,
}

impl EngineEnv {
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            docker_host: var("DOCKER_HOST"),
            // Set and not "0" enables verification.
            tls_verify: var("DOCKER_TLS_VERIFY").is_some_and(|v| v != "0"),
            cert_path: var("DOCKER_CERT_PATH").map(PathBuf::from),
            timeout_secs: var("DOCKER_CLIENT_TIMEOUT")
                .or_else(|| var("COMPOSE_HTTP_TIMEOUT"))
                .and_then(|v| v.parse().ok()),
            home: crate::platform::home_dir(),
        }
    }
}

/// Parse a `DOCKER_HOST`-style connection string.
///
/// Returns `None` for schemes the resolver does not handle (e.g. `ssh://`).
pub fn parse_host(value: &str, tls: bool) -> Option<Endpoint> {
    if let Some(path) = value.strip_prefix("unix://") {
        return Some(Endpoint::Unix(PathBuf::from(path)));
    }
    let rest = value
        .strip_prefix("tcp://")
        .or_else(|| value.strip_prefix("http://"))
        .or_else(|| value.strip_prefix("https://"))?;
    let rest = rest.trim_end_matches('/');
    let default_port = if tls || value.starts_with("https://") {
        TLS_PORT
    } else {
        PLAIN_PORT
    };
    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => (rest, default_port),
    };
    if host.is_empty() {
        return None;
    }
    Some(Endpoint::Tcp {
        host: host.to_string(),
        port,
    })
}

/// Discover how to reach the engine.
///
/// An explicit non-unix `DOCKER_HOST` wins. Otherwise the candidates are the
/// `DOCKER_HOST` socket path, the system socket and the per-user socket, in
/// that order; the first one that is a socket the current user can read and
/// write is used. `None` signals "fall back to the default transport".
pub fn resolve_socket(env: &EngineEnv) -> Option<Endpoint> {
    resolve_socket_with(env, crate::platform::is_usable_socket)
}

fn resolve_socket_with(env: &EngineEnv, usable: impl Fn(&Path) -> bool) -> Option<Endpoint> {
    let mut candidates: Vec<PathBuf> = Vec::new();

    if let Some(host) = &env.docker_host {
        match parse_host(host, env.tls_verify) {
            Some(Endpoint::Unix(path)) => candidates.push(path),
            Some(tcp) => return Some(tcp),
            None => {
                warn!(docker_host = %host, "unsupported DOCKER_HOST scheme, using default transport");
                return None;
            }
        }
    }

    candidates.push(PathBuf::from(SYSTEM_SOCKET));
    if let Some(home) = &env.home {
        candidates.push(home.join(USER_SOCKET));
    }

    for candidate in candidates {
        if usable(&candidate) {
            debug!(socket = %candidate.display(), "using engine socket");
            return Some(Endpoint::Unix(candidate));
        }
    }
    None
}

/// Derive protocol, TLS material and timeout for `endpoint`.
pub fn build_connection_config(
    endpoint: Option<Endpoint>,
    env: &EngineEnv,
) -> Result<EngineConnectionConfig> {
    let on_tls_port = matches!(&endpoint, Some(Endpoint::Tcp { port, .. }) if *port == TLS_PORT);
    let protocol = if env.tls_verify || on_tls_port {
        Protocol::Https
    } else {
        Protocol::Http
    };

    let tls = match &env.cert_path {
        Some(dir) => Some(load_tls_material(dir)?),
        None => None,
    };

    Ok(EngineConnectionConfig {
        endpoint,
        protocol,
        tls,
        timeout: env.timeout_secs.map(Duration::from_secs),
    })
}

fn load_tls_material(dir: &Path) -> Result<TlsMaterial> {
    let ca_path = dir.join("ca.pem");
    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");

    let content = std::fs::read_to_string(&ca_path).map_err(|e| EnvError::InvalidTls {
        path: ca_path.clone(),
        reason: e.to_string(),
    })?;
    let ca_chain = parse_pem_bundle(&content).map_err(|reason| EnvError::InvalidTls {
        path: ca_path.clone(),
        reason,
    })?;

    for path in [&cert_path, &key_path] {
        if let Err(e) = std::fs::metadata(path) {
            return Err(EnvError::InvalidTls {
                path: path.clone(),
                reason: e.to_string(),
            });
        }
    }

    Ok(TlsMaterial {
        ca_chain,
        ca_path,
        cert_path,
        key_path,
    })
}

/// Split a PEM bundle into individual certificates on `END CERTIFICATE`
/// boundaries.
pub fn parse_pem_bundle(content: &str) -> std::result::Result<Vec<String>, String> {
    if !content.contains("BEGIN CERTIFICATE") && !content.contains("END CERTIFICATE") {
        return Err("no PEM certificate markers found".to_string());
    }

    let mut chain = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if current.is_empty() && line.trim().is_empty() {
            continue;
        }
        current.push(line.trim_end());
        if line.contains("END CERTIFICATE") {
            chain.push(current.join("\n"));
            current.clear();
        }
    }

    if chain.is_empty() {
        return Err("certificate bundle has no complete certificate".to_string());
    }
    Ok(chain)
}
