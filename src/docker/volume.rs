use anyhow::{Context, Result};
use bollard::query_parameters::{ListVolumesOptions, RemoveVolumeOptions};
use bollard::Docker;

/// Remove a Docker volume, ignoring 404 (already removed).
pub async fn remove_volume(docker: &Docker, volume_name: &str) -> Result<()> {
    let options = RemoveVolumeOptions { force: false };
    match docker.remove_volume(volume_name, Some(options)).await {
        Ok(()) => Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing Docker volume {}", volume_name)),
    }
}

/// List the names of volumes whose name starts with `prefix`.
pub async fn list_volumes_with_prefix(docker: &Docker, prefix: &str) -> Result<Vec<String>> {
    let response = docker
        .list_volumes(None::<ListVolumesOptions>)
        .await
        .context("listing Docker volumes")?;
    Ok(filter_prefixed(
        response.volumes.unwrap_or_default().into_iter().map(|v| v.name),
        prefix,
    ))
}

fn filter_prefixed(names: impl Iterator<Item = String>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = names.filter(|n| n.starts_with(prefix)).collect();
    names.sort();
    names
}
