use anyhow::{bail, Context, Result};
use bollard::models::CreateImageInfo;
use bollard::query_parameters::CreateImageOptions;
use bollard::Docker;
use futures_util::StreamExt;

/// Parse an image reference into (name, tag).
/// "traefik:v2.11" -> ("traefik", "v2.11")
/// "mariadb" -> ("mariadb", "latest")
/// "localhost:5000/nginx" -> ("localhost:5000/nginx", "latest")
pub fn parse_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((name, tag)) if !name.is_empty() && !tag.is_empty() && !tag.contains('/') => {
            (name, tag)
        }
        _ => (image, "latest"),
    }
}

/// The registry host of an image reference, defaulting to Docker Hub.
pub fn registry_host(image: &str) -> &str {
    match image.split_once('/') {
        Some((first, _)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            first
        }
        _ => "registry-1.docker.io",
    }
}

/// Check if an image exists locally.
pub async fn check_image_exists(docker: &Docker, image: &str) -> bool {
    docker.inspect_image(image).await.is_ok()
}

/// Pull a single Docker image.
pub async fn pull_image(docker: &Docker, image: &str) -> Result<()> {
    let (name, tag) = parse_image_ref(image);
    tracing::debug!(image = %image, "pulling image");

    let options = CreateImageOptions {
        from_image: Some(name.to_string()),
        tag: Some(tag.to_string()),
        ..Default::default()
    };

    let mut stream = docker.create_image(Some(options), None, None);
    while let Some(result) = stream.next().await {
        let info: CreateImageInfo = result.context("pulling image")?;
        if let Some(err) = &info.error_detail {
            bail!("image pull failed for {}: {:?}", image, err);
        }
    }

    tracing::debug!(image = %image, "image pulled successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_image_with_tag() {
        assert_eq!(parse_image_ref("traefik:v2.11"), ("traefik", "v2.11"));
    }

    #[test]
    fn parse_image_without_tag() {
        assert_eq!(parse_image_ref("mariadb"), ("mariadb", "latest"));
    }

    #[test]
    fn parse_image_with_registry_port() {
        assert_eq!(
            parse_image_ref("localhost:5000/nginx"),
            ("localhost:5000/nginx", "latest")
        );
        assert_eq!(
            parse_image_ref("ghcr.io/automattic/vip-container-images/wordpress:6.4.2"),
            ("ghcr.io/automattic/vip-container-images/wordpress", "6.4.2")
        );
    }

    #[test]
    fn registry_host_of_reference() {
        assert_eq!(
            registry_host("ghcr.io/automattic/vip-container-images"),
            "ghcr.io"
        );
        assert_eq!(registry_host("axllent/mailpit"), "registry-1.docker.io");
        assert_eq!(registry_host("mariadb:11"), "registry-1.docker.io");
        assert_eq!(registry_host("localhost:5000/x"), "localhost:5000");
    }
}
