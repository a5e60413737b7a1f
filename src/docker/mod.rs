pub mod container;
pub mod endpoint;
pub mod exec;
pub mod image;
pub mod network;
pub mod volume;

use anyhow::Context;
use async_trait::async_trait;
use bollard::Docker;

use crate::compose::lifecycle::{ComposeProject, UpMode};
use crate::docker::endpoint::{Endpoint, EngineConnectionConfig, Protocol};
use crate::error::{EnvError, Result};
use crate::orchestrator::engine::{
    ContainerDetails, ContainerSummary, Engine, ExecRequest, ProxySpec, StackRef,
};

/// Seconds bollard waits for an API response when no timeout is configured.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Map an `anyhow` failure of a low-level helper into an engine error.
fn engine_err(operation: &str) -> impl FnOnce(anyhow::Error) -> EnvError + '_ {
    move |e| EnvError::engine(operation, format!("{:#}", e))
}

/// Open a client for the resolved connection config.
pub fn connect(config: &EngineConnectionConfig) -> anyhow::Result<Docker> {
    let timeout = config
        .timeout
        .map(|t| t.as_secs())
        .unwrap_or(DEFAULT_TIMEOUT_SECS);

    let docker = match (&config.endpoint, config.protocol, &config.tls) {
        (None, _, _) => Docker::connect_with_local_defaults()?,
        (Some(Endpoint::Unix(path)), _, _) => Docker::connect_with_socket(
            &path.to_string_lossy(),
            timeout,
            bollard::API_DEFAULT_VERSION,
        )?,
        (Some(Endpoint::Tcp { host, port }), Protocol::Https, Some(tls)) => {
            Docker::connect_with_ssl(
                &format!("https://{}:{}", host, port),
                &tls.key_path,
                &tls.cert_path,
                &tls.ca_path,
                timeout,
                bollard::API_DEFAULT_VERSION,
            )?
        }
        (Some(Endpoint::Tcp { host, port }), Protocol::Https, None) => {
            anyhow::bail!(
                "{}:{} expects TLS but DOCKER_CERT_PATH is not set",
                host,
                port
            )
        }
        (Some(Endpoint::Tcp { host, port }), Protocol::Http, _) => Docker::connect_with_http(
            &format!("http://{}:{}", host, port),
            timeout,
            bollard::API_DEFAULT_VERSION,
        )?,
    };
    Ok(docker)
}

/// Environment for `docker` subprocesses so they reach the same engine.
pub fn subprocess_env(config: &EngineConnectionConfig) -> Vec<(String, String)> {
    let mut env = Vec::new();
    if let Some(endpoint) = &config.endpoint {
        env.push(("DOCKER_HOST".to_string(), endpoint.to_string()));
    }
    if config.protocol == Protocol::Https {
        env.push(("DOCKER_TLS_VERIFY".to_string(), "1".to_string()));
    }
    if let Some(tls) = &config.tls {
        if let Some(dir) = tls.ca_path.parent() {
            env.push((
                "DOCKER_CERT_PATH".to_string(),
                dir.to_string_lossy().into_owned(),
            ));
        }
    }
    env
}

/// The container engine, reached through the API for container-level work
/// and through `docker compose` for project-level work.
pub struct DockerEngine {
    docker: Docker,
    compose_env: Vec<(String, String)>,
    /// Socket the proxy mounts to watch containers.
    socket: String,
}

impl DockerEngine {
    /// Connect and verify the engine answers.
    pub async fn connect(config: &EngineConnectionConfig) -> Result<Self> {
        let docker = connect(config).map_err(|e| EnvError::EngineUnavailable {
            reason: format!("{:#}", e),
        })?;
        docker
            .ping()
            .await
            .map_err(|e| EnvError::EngineUnavailable {
                reason: e.to_string(),
            })?;

        let socket = match &config.endpoint {
            Some(Endpoint::Unix(path)) => path.to_string_lossy().into_owned(),
            _ => endpoint::SYSTEM_SOCKET.to_string(),
        };
        tracing::debug!(endpoint = ?config.endpoint, "connected to container engine");

        Ok(Self {
            docker,
            compose_env: subprocess_env(config),
            socket,
        })
    }

    fn project(&self, stack: &StackRef) -> ComposeProject {
        ComposeProject::new(&stack.file, &stack.project).with_env(self.compose_env.clone())
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn validate_stack(&self, stack: &StackRef) -> Result<()> {
        self.project(stack)
            .config_check()
            .await
            .map_err(engine_err("docker compose config"))
    }

    async fn pull(&self, stack: &StackRef) -> Result<()> {
        self.project(stack)
            .pull()
            .await
            .map_err(engine_err("docker compose pull"))
    }

    async fn up(&self, stack: &StackRef, mode: UpMode) -> Result<()> {
        self.project(stack)
            .up(mode)
            .await
            .map_err(engine_err("docker compose up"))
    }

    async fn stop(&self, stack: &StackRef) -> Result<()> {
        self.project(stack)
            .stop()
            .await
            .map_err(engine_err("docker compose stop"))
    }

    async fn down(&self, stack: &StackRef, remove_volumes: bool) -> Result<()> {
        self.project(stack)
            .down(remove_volumes)
            .await
            .map_err(engine_err("docker compose down"))
    }

    async fn project_containers(&self, project: &str) -> Result<Vec<ContainerSummary>> {
        let containers = container::list_project_containers(&self.docker, project)
            .await
            .map_err(engine_err("list containers"))?;
        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id,
                name: c.name,
                service: c.service,
                image: c.image,
                running: c.running,
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
        let info = container::inspect_container(&self.docker, id)
            .await
            .map_err(engine_err("inspect container"))?;
        let network = info.network_settings.unwrap_or_default();

        let mut ip_addresses: Vec<String> = network
            .networks
            .unwrap_or_default()
            .into_values()
            .filter_map(|n| n.ip_address)
            .filter(|ip| !ip.is_empty())
            .collect();
        ip_addresses.sort();

        let mut ports: Vec<String> = network
            .ports
            .unwrap_or_default()
            .into_iter()
            .flat_map(|(container_port, bindings)| {
                bindings
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(move |b| {
                        b.host_port
                            .map(|host| format!("{}->{}", host, container_port))
                    })
            })
            .collect();
        ports.sort();
        ports.dedup();

        let state = info.state.unwrap_or_default();
        Ok(ContainerDetails {
            id: info.id.unwrap_or_else(|| id.to_string()),
            name: info
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            image: info.config.and_then(|c| c.image).unwrap_or_default(),
            running: state.running.unwrap_or(false),
            started_at: state.started_at,
            ip_addresses,
            ports,
        })
    }

    async fn container_running(&self, name: &str) -> Result<Option<bool>> {
        container::container_running(&self.docker, name)
            .await
            .map_err(engine_err("inspect container"))
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        container::remove_container(&self.docker, name, true)
            .await
            .map_err(engine_err("remove container"))
    }

    async fn ensure_network(&self, name: &str) -> Result<()> {
        network::ensure_network(&self.docker, name, network::resource_labels("edge"))
            .await
            .map_err(engine_err("create network"))
    }

    async fn network_members(&self, name: &str) -> Result<Vec<String>> {
        container::running_on_network(&self.docker, name)
            .await
            .map_err(engine_err("list network containers"))
    }

    async fn start_proxy(&self, proxy: &ProxySpec) -> Result<()> {
        let start = |e: anyhow::Error| EnvError::engine("start proxy", format!("{:#}", e));

        if container::container_running(&self.docker, &proxy.name)
            .await
            .map_err(start)?
            .is_none()
        {
            if !image::check_image_exists(&self.docker, &proxy.image).await {
                image::pull_image(&self.docker, &proxy.image)
                    .await
                    .map_err(start)?;
            }
            let spec = container::ContainerSpec {
                name: proxy.name.clone(),
                image: proxy.image.clone(),
                cmd: crate::orchestrator::proxy::proxy_args(&proxy.network),
                ports: vec![(proxy.http_port, 80)],
                binds: vec![format!("{}:/var/run/docker.sock:ro", self.socket)],
                network: proxy.network.clone(),
                role: "proxy".to_string(),
            };
            match container::create_container(&self.docker, &spec).await {
                Ok(_) => {}
                // Lost a creation race with a concurrent invocation.
                Err(e)
                    if e.chain().any(|c| {
                        matches!(
                            c.downcast_ref::<bollard::errors::Error>(),
                            Some(bollard::errors::Error::DockerResponseServerError {
                                status_code: 409,
                                ..
                            })
                        )
                    }) =>
                {
                    tracing::debug!(container = %proxy.name, "proxy already created");
                }
                Err(e) => return Err(start(e)),
            }
        }

        container::start_container(&self.docker, &proxy.name)
            .await
            .map_err(start)
    }

    async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>> {
        volume::list_volumes_with_prefix(&self.docker, prefix)
            .await
            .map_err(engine_err("list volumes"))
    }

    async fn remove_volume(&self, name: &str) -> Result<()> {
        volume::remove_volume(&self.docker, name)
            .await
            .map_err(engine_err("remove volume"))
    }

    async fn exec(&self, stack: &StackRef, request: &ExecRequest) -> Result<i32> {
        self.project(stack)
            .exec(
                &request.service,
                request.user.as_deref(),
                &request.env,
                &request.command,
                request.interactive,
            )
            .await
            .map_err(engine_err("docker compose exec"))
    }

    async fn has_binary(&self, container_id: &str, binary: &str) -> Result<bool> {
        exec::has_binary(&self.docker, container_id, binary)
            .await
            .context("probing container")
            .map_err(engine_err("exec"))
    }

    async fn logs(&self, stack: &StackRef, service: Option<&str>, follow: bool) -> Result<()> {
        self.project(stack)
            .logs(service, follow)
            .await
            .map_err(engine_err("docker compose logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::endpoint::TlsMaterial;
    use std::path::PathBuf;

    #[test]
    fn subprocess_env_mirrors_connection() {
        let config = EngineConnectionConfig {
            endpoint: Some(Endpoint::Tcp {
                host: "10.0.0.5".into(),
                port: 2376,
            }),
            protocol: Protocol::Https,
            tls: Some(TlsMaterial {
                ca_chain: vec![],
                ca_path: PathBuf::from("/certs/ca.pem"),
                cert_path: PathBuf::from("/certs/cert.pem"),
                key_path: PathBuf::from("/certs/key.pem"),
            }),
            timeout: None,
        };
        let env = subprocess_env(&config);
        assert!(env.contains(&("DOCKER_HOST".into(), "tcp://10.0.0.5:2376".into())));
        assert!(env.contains(&("DOCKER_TLS_VERIFY".into(), "1".into())));
        assert!(env.contains(&("DOCKER_CERT_PATH".into(), "/certs".into())));
    }

    #[test]
    fn default_transport_sets_nothing() {
        let config = EngineConnectionConfig {
            endpoint: None,
            protocol: Protocol::Http,
            tls: None,
            timeout: None,
        };
        assert!(subprocess_env(&config).is_empty());
    }

    #[test]
    fn https_without_certs_is_rejected() {
        let config = EngineConnectionConfig {
            endpoint: Some(Endpoint::Tcp {
                host: "h".into(),
                port: 2376,
            }),
            protocol: Protocol::Https,
            tls: None,
            timeout: None,
        };
        assert!(connect(&config).is_err());
    }
}
