use anyhow::Result;

use super::Session;
use crate::compose::stack::read_stack;
use crate::error::EnvError;
use crate::orchestrator::engine::{Engine, StackRef};

pub async fn run(session: &Session, follow: bool, service: Option<String>) -> Result<()> {
    let slug = session.slug()?;
    session.registry.read(&slug)?;

    let orchestrator = session.orchestrator().await?;
    let stack = orchestrator.stack_ref(&slug)?;
    stream(orchestrator.engine(), &slug, &stack, service.as_deref(), follow).await?;
    Ok(())
}

/// Stream logs of one service, or of all of them, to the terminal.
pub async fn stream(
    engine: &dyn Engine,
    slug: &str,
    stack: &StackRef,
    service: Option<&str>,
    follow: bool,
) -> crate::error::Result<()> {
    let definition = read_stack(&stack.file).map_err(|_| EnvError::NotRunning {
        slug: slug.to_string(),
    })?;
    if let Some(service) = service {
        if !definition.services.contains_key(service) {
            return Err(EnvError::UnknownService {
                service: service.to_string(),
                available: definition
                    .services
                    .keys()
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }
    engine.logs(stack, service, follow).await
}
