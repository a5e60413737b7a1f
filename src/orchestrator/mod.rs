pub mod bridge;
pub mod engine;
pub mod proxy;
pub mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};

use crate::compose::lifecycle::UpMode;
use crate::compose::stack::{self, RenderSettings, STACK_FILE, TOOLING_VOLUMES};
use crate::environment::descriptor::project_name;
use crate::environment::{EnvironmentRegistry, InstanceDescriptor};
use crate::error::{EnvError, Result};

use engine::{ContainerDetails, ContainerSummary, Engine, StackRef};
use state::{EnvironmentState, StackCache};

/// Per-invocation knobs of [`Orchestrator::start`].
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Recreate containers and drop stale tooling volumes.
    pub rebuild: bool,
    /// Whether the image registry resolved; no pull is attempted otherwise.
    pub registry_reachable: bool,
    /// Current time in epoch milliseconds, compared against `pullAfter`.
    pub now_ms: i64,
}

impl StartOptions {
    pub fn rebuild(registry_reachable: bool) -> Self {
        Self {
            rebuild: true,
            registry_reachable,
            now_ms: Utc::now().timestamp_millis(),
        }
    }

    pub fn restart_only() -> Self {
        Self {
            rebuild: false,
            registry_reachable: false,
            now_ms: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    Destroyed,
    /// A previous `destroy` already removed everything.
    AlreadyDestroyed,
}

/// Drives environments through their lifecycle against an [`Engine`].
///
/// Steps that other tools would hang on engine events run here in a fixed
/// order:
///   start   -- orphan proxy cleanup, stack init (with one recovery),
///              proxy up, pull gate, volume cleanup, `up`
///   stop    -- `stop`, proxy release
///   destroy -- `down -v`, proxy release, file removal
pub struct Orchestrator {
    engine: Arc<dyn Engine>,
    registry: EnvironmentRegistry,
    render: RenderSettings,
    stacks: StackCache,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn Engine>, registry: EnvironmentRegistry, render: RenderSettings) -> Self {
        Self {
            engine,
            registry,
            render,
            stacks: StackCache::new(),
        }
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    pub fn render_settings(&self) -> &RenderSettings {
        &self.render
    }

    pub fn stack_ref(&self, slug: &str) -> Result<StackRef> {
        Ok(StackRef {
            project: project_name(slug),
            file: self.registry.path_for(slug)?.join(STACK_FILE),
        })
    }

    /// Render the descriptor into its stack file, overwriting any previous
    /// one.
    pub fn build(&self, descriptor: &InstanceDescriptor) -> Result<StackRef> {
        let stack = self.stack_ref(&descriptor.slug)?;
        let definition = stack::render(descriptor, &self.render);
        stack::write_stack(&stack.file, &definition)?;
        self.stacks.forget(&stack.file);
        debug!(slug = %descriptor.slug, file = %stack.file.display(), "stack file written");
        Ok(stack)
    }

    /// Have the engine accept the stack file.
    ///
    /// A rejected file is backed up, regenerated from the descriptor and
    /// tried exactly once more.
    pub async fn initialize(&self, descriptor: &InstanceDescriptor) -> Result<StackRef> {
        let existing = self.stack_ref(&descriptor.slug)?;
        let stack = if existing.file.is_file() {
            existing
        } else {
            self.build(descriptor)?
        };
        if self.stacks.is_initialized(&stack.file) {
            return Ok(stack);
        }

        let first = match self.engine.validate_stack(&stack).await {
            Ok(()) => {
                self.stacks.mark(&stack.file);
                return Ok(stack);
            }
            Err(e) => e,
        };

        warn!(
            slug = %descriptor.slug,
            project = %stack.project,
            error = %first,
            "stack definition rejected, regenerating it"
        );
        if let Some(backup) = backup_stack_file(&stack.file)? {
            info!(slug = %descriptor.slug, backup = %backup.display(), "backed up stack file");
        }
        let stack = self.build(descriptor)?;

        match self.engine.validate_stack(&stack).await {
            Ok(()) => {
                info!(slug = %descriptor.slug, project = %stack.project, "stack definition recovered");
                self.stacks.mark(&stack.file);
                Ok(stack)
            }
            Err(retry) => {
                error!(
                    slug = %descriptor.slug,
                    project = %stack.project,
                    first = %first,
                    retry = %retry,
                    "stack definition rejected after regeneration"
                );
                Err(EnvError::StackInitFailed {
                    slug: descriptor.slug.clone(),
                    first: first.to_string(),
                    retry: retry.to_string(),
                })
            }
        }
    }

    /// Bring an environment up. Returns the descriptor as persisted
    /// afterwards.
    pub async fn start(&self, slug: &str, options: &StartOptions) -> Result<InstanceDescriptor> {
        let mut descriptor = self.registry.read(slug)?;
        let key_generated = descriptor.ensure_autologin_key();
        if key_generated {
            self.registry.write(&descriptor)?;
        }

        proxy::remove_orphaned_proxy(self.engine()).await?;

        if options.rebuild || key_generated {
            self.build(&descriptor)?;
        }
        let stack = self.initialize(&descriptor).await?;
        proxy::ensure_proxy(self.engine()).await?;

        if options.rebuild {
            self.pull_if_due(&mut descriptor, &stack, options).await?;
            self.engine.down(&stack, false).await?;
            self.remove_tooling_volumes(&stack.project).await?;
            self.engine.up(&stack, UpMode::Recreate).await?;
        } else {
            self.engine.up(&stack, UpMode::Start).await?;
        }

        info!(slug, project = %stack.project, rebuild = options.rebuild, "environment started");
        Ok(descriptor)
    }

    async fn pull_if_due(
        &self,
        descriptor: &mut InstanceDescriptor,
        stack: &StackRef,
        options: &StartOptions,
    ) -> Result<()> {
        if !descriptor.pull_due(options.now_ms) {
            debug!(slug = %descriptor.slug, pull_after = descriptor.pull_after, "images are fresh, not pulling");
            return Ok(());
        }
        if !options.registry_reachable {
            info!(slug = %descriptor.slug, "image registry unreachable, using local images");
            return Ok(());
        }

        match self.engine.pull(stack).await {
            Ok(()) => {
                descriptor.advance_pull_after(options.now_ms);
                self.registry.write(descriptor)?;
                info!(slug = %descriptor.slug, "pulled fresh images");
            }
            Err(e) => {
                warn!(slug = %descriptor.slug, error = %e, "image pull failed, using local images");
            }
        }
        Ok(())
    }

    /// Drop the volumes seeded from tool images so `up` reseeds them.
    async fn remove_tooling_volumes(&self, project: &str) -> Result<()> {
        let prefix = format!("{}_", project);
        for volume in self.engine.list_volumes(&prefix).await? {
            let Some(name) = volume.strip_prefix(&prefix) else {
                continue;
            };
            if TOOLING_VOLUMES.contains(&name) {
                debug!(project, volume = %volume, "removing tooling volume");
                self.engine.remove_volume(&volume).await?;
            }
        }
        Ok(())
    }

    pub async fn stop(&self, slug: &str) -> Result<()> {
        let descriptor = self.registry.read(slug)?;
        let stack = self.existing_stack(&descriptor)?;
        self.engine.stop(&stack).await?;
        info!(slug, project = %stack.project, "environment stopped");
        proxy::release_proxy_if_unused(self.engine()).await?;
        Ok(())
    }

    /// Remove an environment's containers and volumes, and its files unless
    /// `keep_files`.
    ///
    /// Safe to repeat: a second call after files were removed succeeds
    /// without doing anything.
    pub async fn destroy(&self, slug: &str, keep_files: bool) -> Result<DestroyOutcome> {
        let dir = self.registry.path_for(slug)?;
        let stack = self.stack_ref(slug)?;

        match self.registry.read(slug) {
            Ok(descriptor) => {
                let stack = self.existing_stack(&descriptor)?;
                self.engine.down(&stack, true).await?;
            }
            Err(EnvError::NotFound { .. }) if self.registry.was_destroyed(slug) => {
                info!(slug, "environment already destroyed");
                return Ok(DestroyOutcome::AlreadyDestroyed);
            }
            Err(err @ EnvError::NotFound { .. }) => {
                if !self.remove_leftovers(&stack).await? {
                    return Err(err);
                }
            }
            Err(err) => {
                warn!(slug, error = %err, "descriptor unusable, removing what the engine knows about");
                self.remove_leftovers(&stack).await?;
            }
        }

        proxy::release_proxy_if_unused(self.engine()).await?;
        self.stacks.forget(&stack.file);

        if !keep_files {
            self.registry.remove(slug)?;
            debug!(slug, dir = %dir.display(), "environment files removed");
        }
        info!(slug, project = %stack.project, "environment destroyed");
        Ok(DestroyOutcome::Destroyed)
    }

    /// Tear down a stack without a usable descriptor. Returns false when
    /// there was nothing to remove.
    async fn remove_leftovers(&self, stack: &StackRef) -> Result<bool> {
        if stack.file.is_file() && stack::read_stack(&stack.file).is_ok() {
            self.engine.down(stack, true).await?;
            return Ok(true);
        }

        let containers = self.engine.project_containers(&stack.project).await?;
        let volumes = self
            .engine
            .list_volumes(&format!("{}_", stack.project))
            .await?;
        for container in &containers {
            self.engine.remove_container(&container.name).await?;
        }
        for volume in &volumes {
            self.engine.remove_volume(volume).await?;
        }
        Ok(!containers.is_empty() || !volumes.is_empty() || stack.file.is_file())
    }

    /// The stack file of an environment, rendered if it is missing.
    fn existing_stack(&self, descriptor: &InstanceDescriptor) -> Result<StackRef> {
        let stack = self.stack_ref(&descriptor.slug)?;
        if stack.file.is_file() {
            Ok(stack)
        } else {
            self.build(descriptor)
        }
    }

    pub async fn state(&self, slug: &str) -> Result<EnvironmentState> {
        let dir = self.registry.path_for(slug)?;
        let exists = EnvironmentRegistry::exists(&dir);
        let containers = if exists {
            self.engine.project_containers(&project_name(slug)).await?
        } else {
            Vec::new()
        };
        Ok(EnvironmentState::derive(
            exists,
            self.registry.was_destroyed(slug),
            &containers,
        ))
    }

    pub async fn containers(&self, slug: &str) -> Result<Vec<ContainerSummary>> {
        self.engine.project_containers(&project_name(slug)).await
    }

    /// Inspect every container concurrently. Containers that vanish while
    /// being inspected are skipped.
    pub async fn inspect_all(&self, containers: &[ContainerSummary]) -> Vec<ContainerDetails> {
        let inspections = containers
            .iter()
            .map(|c| self.engine.inspect_container(&c.id));
        join_all(inspections)
            .await
            .into_iter()
            .filter_map(|result| match result {
                Ok(details) => Some(details),
                Err(e) => {
                    debug!(error = %e, "container inspection failed");
                    None
                }
            })
            .collect()
    }
}

/// Move a stack file aside as `<file>.<timestamp>.bak`.
fn backup_stack_file(file: &Path) -> Result<Option<PathBuf>> {
    if !file.exists() {
        return Ok(None);
    }
    let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
    let mut name = file.as_os_str().to_owned();
    name.push(format!(".{}.bak", stamp));
    let backup = PathBuf::from(name);
    std::fs::rename(file, &backup).map_err(|source| EnvError::WriteFailed {
        path: backup.clone(),
        source,
    })?;
    Ok(Some(backup))
}
