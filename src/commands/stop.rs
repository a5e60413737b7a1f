use anyhow::Result;

use super::Session;

pub async fn run(session: &Session) -> Result<()> {
    let slug = session.slug()?;
    let orchestrator = session.orchestrator().await?;
    orchestrator.stop(&slug).await?;
    println!("Stopped environment {}", slug);
    Ok(())
}
