use anyhow::Result;

use super::Session;
use crate::cli::EnvOptions;
use crate::config::pipeline::resolve_update;
use crate::environment::InstanceDescriptor;
use crate::versions::WordPressTag;

pub async fn run(session: &Session, options: &EnvOptions) -> Result<()> {
    let manifest = session.manifest().await;
    let descriptor = update(session, options, &manifest)?;
    println!("Updated environment {}", descriptor.slug);
    crate::ui::summary::print_descriptor(&descriptor, &session.settings.domain);
    println!(
        "Apply the changes with: wpdev start --slug {}",
        descriptor.slug
    );
    Ok(())
}

/// Re-resolve an existing environment with new flags and persist it.
pub fn update(
    session: &Session,
    options: &EnvOptions,
    manifest: &[WordPressTag],
) -> crate::error::Result<InstanceDescriptor> {
    let slug = session.slug()?;
    let prior = session.registry.read(&slug)?;
    let file = session.project_config()?;

    let ctx = session.resolve_context(manifest);
    let descriptor = resolve_update(&ctx, &prior, file.as_ref(), &options.fields())?;
    session.registry.write(&descriptor)?;
    session.write_stack(&descriptor)?;
    tracing::info!(slug = %slug, "environment updated");
    Ok(descriptor)
}
