use std::time::Duration;

use anyhow::{Context, Result};

use super::Session;
use crate::compose::stack::read_stack;
use crate::health::{self, Prober};
use crate::orchestrator::state::EnvironmentState;
use crate::orchestrator::StartOptions;
use crate::versions::advisory::{self, Advice};

/// Delay between two readiness checks.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub async fn run(
    session: &Session,
    skip_rebuild: bool,
    skip_versions_check: bool,
    timeout: Duration,
) -> Result<()> {
    let slug = session.slug()?;
    let mut descriptor = session.registry.read(&slug)?;

    let host = descriptor.host(&session.settings.domain);
    health::verify_dns(&host).await?;

    let (manifest, registry_reachable) = tokio::join!(
        session.manifest(),
        health::registry_reachable(session.registry_host())
    );

    let mut upgraded = false;
    if !skip_versions_check {
        let advice = advisory::advise(&mut descriptor, &manifest, session.prompter())?;
        if advice.changed_descriptor() {
            session.registry.write(&descriptor)?;
        }
        upgraded = matches!(advice, Advice::Upgraded(_));
    }

    let orchestrator = session.orchestrator().await?;
    let options = if skip_rebuild && !upgraded {
        StartOptions::restart_only()
    } else {
        StartOptions::rebuild(registry_reachable)
    };

    println!("Starting environment {}...", slug);
    let descriptor = orchestrator.start(&slug, &options).await?;

    let stack = orchestrator.stack_ref(&slug)?;
    let definition = read_stack(&stack.file)
        .with_context(|| format!("reading {}", stack.file.display()))?;
    let report = health::wait_until_up(
        orchestrator.engine(),
        &slug,
        &stack.project,
        &definition,
        &Prober::new(),
        timeout,
        POLL_INTERVAL,
    )
    .await?;

    crate::ui::summary::print_environment(
        &crate::commands::info::EnvironmentInfo {
            descriptor,
            location: session.registry.path_for(&slug)?,
            state: EnvironmentState::Running,
            report,
            containers: Vec::new(),
        },
        &session.settings.domain,
    );
    Ok(())
}
