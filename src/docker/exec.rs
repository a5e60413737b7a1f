use anyhow::{Context, Result};
use bollard::exec::{StartExecOptions, StartExecResults};
use bollard::models::ExecConfig;
use bollard::Docker;
use futures_util::StreamExt;

/// Execute a command in a container and return (exit_code, combined_output).
pub async fn exec_in_container(
    docker: &Docker,
    container_id: &str,
    cmd: Vec<String>,
) -> Result<(i64, String)> {
    let config = ExecConfig {
        cmd: Some(cmd),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        ..Default::default()
    };

    let exec = docker
        .create_exec(container_id, config)
        .await
        .context("creating exec instance")?;

    let mut output = String::new();
    let start_options = StartExecOptions {
        detach: false,
        ..Default::default()
    };
    if let StartExecResults::Attached {
        output: mut stream, ..
    } = docker
        .start_exec(&exec.id, Some(start_options))
        .await
        .context("starting exec")?
    {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(log) => output.push_str(&log.to_string()),
                Err(e) => tracing::warn!("exec stream error: {}", e),
            }
        }
    }

    let inspect = docker
        .inspect_exec(&exec.id)
        .await
        .context("inspecting exec")?;
    Ok((inspect.exit_code.unwrap_or(-1), output))
}

/// Whether `binary` is on the PATH inside the container.
pub async fn has_binary(docker: &Docker, container_id: &str, binary: &str) -> Result<bool> {
    let cmd = vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("command -v {}", binary),
    ];
    let (exit_code, output) = exec_in_container(docker, container_id, cmd).await?;
    tracing::debug!(container = %container_id, binary, exit_code, output = %output.trim(), "binary probe");
    Ok(exit_code == 0)
}
