use anyhow::{Context, Result};
use bollard::models::NetworkCreateRequest;
use bollard::Docker;
use std::collections::HashMap;

/// Create a bridge network if it doesn't already exist.
pub async fn ensure_network(
    docker: &Docker,
    network_name: &str,
    labels: HashMap<String, String>,
) -> Result<()> {
    match docker.inspect_network(network_name, None).await {
        Ok(_) => return Ok(()),
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) => {}
        Err(e) => return Err(e).context("inspecting network"),
    }

    let config = NetworkCreateRequest {
        name: network_name.to_string(),
        driver: Some("bridge".to_string()),
        labels: Some(labels),
        ..Default::default()
    };
    match docker.create_network(config).await {
        Ok(_) => Ok(()),
        // Another invocation created it between inspect and create.
        Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 409, ..
        }) => Ok(()),
        Err(e) => Err(e).context("creating Docker network"),
    }
}

/// Build the standard set of wpdev labels for a shared Docker resource.
pub fn resource_labels(role: &str) -> HashMap<String, String> {
    HashMap::from([
        ("wpdev.role".to_string(), role.to_string()),
        ("wpdev.managed-by".to_string(), "wpdev".to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_mark_resource_as_managed() {
        let labels = resource_labels("proxy");
        assert_eq!(labels.get("wpdev.role").map(String::as_str), Some("proxy"));
        assert_eq!(
            labels.get("wpdev.managed-by").map(String::as_str),
            Some("wpdev")
        );
    }
}
