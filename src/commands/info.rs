use std::path::PathBuf;

use anyhow::Result;
use tracing::debug;

use super::Session;
use crate::compose::stack::{self, read_stack};
use crate::environment::InstanceDescriptor;
use crate::health::{self, HealthReport, Prober};
use crate::orchestrator::engine::ContainerDetails;
use crate::orchestrator::state::EnvironmentState;
use crate::orchestrator::Orchestrator;
use crate::ui::summary::{self, ListRow};

/// Everything `info` shows about one environment.
#[derive(Debug, Clone)]
pub struct EnvironmentInfo {
    pub descriptor: InstanceDescriptor,
    pub location: PathBuf,
    pub state: EnvironmentState,
    pub report: HealthReport,
    /// Filled only for `--extended`.
    pub containers: Vec<ContainerDetails>,
}

pub async fn run(session: &Session, all: bool, extended: bool) -> Result<()> {
    let orchestrator = session.orchestrator().await?;
    let prober = Prober::new();
    let domain = &session.settings.domain;

    if all {
        let rows = list(&orchestrator, &prober).await?;
        if rows.is_empty() {
            println!("No environments found. Create one with `wpdev create`.");
            return Ok(());
        }
        summary::print_list(&rows, domain);
        return Ok(());
    }

    let slug = session.slug()?;
    let info = gather(&orchestrator, &slug, extended, &prober).await?;
    summary::print_environment(&info, domain);
    if extended {
        summary::print_containers(&info.containers);
    }
    Ok(())
}

/// Collect status and configuration of one environment.
///
/// Read-only: a missing stack file is rendered in memory, not written.
pub async fn gather(
    orchestrator: &Orchestrator,
    slug: &str,
    extended: bool,
    prober: &Prober,
) -> crate::error::Result<EnvironmentInfo> {
    let descriptor = orchestrator.registry().read(slug)?;
    let state = orchestrator.state(slug).await?;
    let stack = orchestrator.stack_ref(slug)?;

    let definition = read_stack(&stack.file).unwrap_or_else(|e| {
        debug!(slug, error = %format!("{:#}", e), "rendering stack definition for status");
        stack::render(&descriptor, orchestrator.render_settings())
    });
    let report =
        health::check_health(orchestrator.engine(), &stack.project, &definition, prober).await?;

    let containers = if extended {
        let summaries = orchestrator.containers(slug).await?;
        orchestrator.inspect_all(&summaries).await
    } else {
        Vec::new()
    };

    Ok(EnvironmentInfo {
        location: orchestrator.registry().path_for(slug)?,
        descriptor,
        state,
        report,
        containers,
    })
}

/// One row per environment. Environments that cannot be read are listed
/// with the reason instead of failing the whole listing.
pub async fn list(orchestrator: &Orchestrator, prober: &Prober) -> crate::error::Result<Vec<ListRow>> {
    let mut rows = Vec::new();
    for slug in orchestrator.registry().list_all()? {
        let row = match gather(orchestrator, &slug, false, prober).await {
            Ok(info) => ListRow::Ok(Box::new(info)),
            Err(e) => ListRow::Failed {
                slug,
                reason: e.to_string(),
            },
        };
        rows.push(row);
    }
    Ok(rows)
}
