use anyhow::Result;

use super::Session;
use crate::orchestrator::bridge::{self, ShellRequest};

/// Attach a shell to a service. Returns the shell's exit code.
pub async fn run(
    session: &Session,
    root: bool,
    service: Option<String>,
    command: Vec<String>,
) -> Result<i32> {
    let slug = session.slug()?;
    session.registry.read(&slug)?;

    let orchestrator = session.orchestrator().await?;
    let stack = orchestrator.stack_ref(&slug)?;
    let request = ShellRequest {
        service,
        root,
        command,
    };
    let interactive = crate::platform::stdio_is_terminal();
    Ok(bridge::shell(orchestrator.engine(), &slug, &stack, &request, interactive).await?)
}
