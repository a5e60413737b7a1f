use anyhow::{bail, Result};

use super::Session;
use crate::orchestrator::bridge;

/// Run a tool of the environment. Returns the tool's exit code.
pub async fn run(session: &Session, command: &[String]) -> Result<i32> {
    let Some((tool, args)) = command.split_first() else {
        bail!("no tool given; usage: wpdev exec -- <tool> [args...]");
    };
    let slug = session.slug()?;
    // The descriptor decides whether the environment exists at all.
    session.registry.read(&slug)?;

    let orchestrator = session.orchestrator().await?;
    let stack = orchestrator.stack_ref(&slug)?;
    let interactive = crate::platform::stdio_is_terminal();
    let code = bridge::exec_tool(
        orchestrator.engine(),
        &slug,
        &stack,
        tool,
        args,
        interactive,
    )
    .await?;
    Ok(code)
}
