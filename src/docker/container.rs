use anyhow::{Context, Result};
use bollard::models::{ContainerCreateBody, HostConfig, PortBinding};
use bollard::query_parameters::{
    CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use bollard::Docker;
use std::collections::{BTreeSet, HashMap};

use crate::docker::network::resource_labels;

/// Label compose puts on every container of a project.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
/// Label compose puts on every container with its service name.
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";

/// A standalone container managed outside any compose project.
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// `host_port -> container_port`, bound on all interfaces.
    pub ports: Vec<(u16, u16)>,
    /// Bind mounts in `source:target[:mode]` form.
    pub binds: Vec<String>,
    pub network: String,
    pub role: String,
}

/// A container as seen by the engine, reduced to what callers need.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    pub image: String,
    pub service: Option<String>,
    pub running: bool,
}

/// Create a container from `spec`. Returns the container ID.
pub async fn create_container(docker: &Docker, spec: &ContainerSpec) -> Result<String> {
    let mut port_bindings: HashMap<String, Option<Vec<PortBinding>>> = HashMap::new();
    let mut exposed_ports: Vec<String> = Vec::new();
    for (host_port, container_port) in &spec.ports {
        let key = format!("{}/tcp", container_port);
        port_bindings.insert(
            key.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some(host_port.to_string()),
            }]),
        );
        exposed_ports.push(key);
    }

    let host_config = HostConfig {
        port_bindings: Some(port_bindings),
        binds: Some(spec.binds.clone()),
        network_mode: Some(spec.network.clone()),
        ..Default::default()
    };

    let config = ContainerCreateBody {
        image: Some(spec.image.clone()),
        cmd: Some(spec.cmd.clone()),
        exposed_ports: Some(exposed_ports),
        host_config: Some(host_config),
        labels: Some(resource_labels(&spec.role)),
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: Some(spec.name.clone()),
        ..Default::default()
    };

    let response = docker
        .create_container(Some(options), config)
        .await
        .with_context(|| format!("creating container {}", spec.name))?;

    tracing::debug!(container = %spec.name, id = %response.id, "container created");
    Ok(response.id)
}

/// Start a container by name or ID. Already-running containers are fine.
pub async fn start_container(docker: &Docker, container: &str) -> Result<()> {
    match docker
        .start_container(container, None::<StartContainerOptions>)
        .await
    {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 304, ..
        }) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("starting container {}", container)),
    }
}

/// Remove a container by name or ID.
pub async fn remove_container(docker: &Docker, container: &str, force: bool) -> Result<()> {
    let options = RemoveContainerOptions {
        force,
        ..Default::default()
    };
    match docker.remove_container(container, Some(options)).await {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(e) => Err(e).context("removing container"),
    }
}

/// Whether a container exists and is running; `None` if it does not exist.
pub async fn container_running(docker: &Docker, container: &str) -> Result<Option<bool>> {
    match docker
        .inspect_container(container, None::<InspectContainerOptions>)
        .await
    {
        Ok(info) => Ok(Some(info.state.and_then(|s| s.running).unwrap_or(false))),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("inspecting container {}", container)),
    }
}

/// Inspect a container, returning the raw engine response.
pub async fn inspect_container(
    docker: &Docker,
    container: &str,
) -> Result<bollard::models::ContainerInspectResponse> {
    docker
        .inspect_container(container, None::<InspectContainerOptions>)
        .await
        .with_context(|| format!("inspecting container {}", container))
}

async fn list_containers(
    docker: &Docker,
    filters: HashMap<String, Vec<String>>,
    all: bool,
) -> Result<Vec<bollard::models::ContainerSummary>> {
    let options = ListContainersOptions {
        all,
        filters: Some(filters),
        ..Default::default()
    };
    docker
        .list_containers(Some(options))
        .await
        .context("listing containers")
}

/// List every container of a compose project, running or not.
pub async fn list_project_containers(docker: &Docker, project: &str) -> Result<Vec<ContainerInfo>> {
    let filters = HashMap::from([(
        "label".to_string(),
        vec![format!("{}={}", COMPOSE_PROJECT_LABEL, project)],
    )]);
    let all = list_containers(docker, filters.clone(), true).await?;
    let running: BTreeSet<String> = list_containers(docker, filters, false)
        .await?
        .into_iter()
        .filter_map(|c| c.id)
        .collect();

    Ok(all
        .into_iter()
        .filter_map(|c| {
            let id = c.id?;
            Some(ContainerInfo {
                running: running.contains(&id),
                name: primary_name(c.names.as_deref()).unwrap_or_else(|| id.clone()),
                image: c.image.unwrap_or_default(),
                service: c.labels.and_then(|mut l| l.remove(COMPOSE_SERVICE_LABEL)),
                id,
            })
        })
        .collect())
}

/// Names of the running containers attached to `network`.
pub async fn running_on_network(docker: &Docker, network: &str) -> Result<Vec<String>> {
    let filters = HashMap::from([("network".to_string(), vec![network.to_string()])]);
    Ok(list_containers(docker, filters, false)
        .await?
        .into_iter()
        .filter_map(|c| primary_name(c.names.as_deref()))
        .collect())
}

/// The engine reports names with a leading slash.
fn primary_name(names: Option<&[String]>) -> Option<String> {
    names?
        .first()
        .map(|n| n.trim_start_matches('/').to_string())
}
