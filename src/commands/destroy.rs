use anyhow::Result;

use super::Session;
use crate::orchestrator::DestroyOutcome;

pub async fn run(session: &Session, soft: bool) -> Result<()> {
    let slug = session.slug()?;
    let orchestrator = session.orchestrator().await?;
    match orchestrator.destroy(&slug, soft).await? {
        DestroyOutcome::Destroyed if soft => {
            println!(
                "Destroyed environment {}; files kept in {}",
                slug,
                session.registry.path_for(&slug)?.display()
            );
        }
        DestroyOutcome::Destroyed => println!("Destroyed environment {}", slug),
        DestroyOutcome::AlreadyDestroyed => {
            println!("Environment {} was already destroyed", slug)
        }
    }
    Ok(())
}
