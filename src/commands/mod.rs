pub mod create;
pub mod destroy;
pub mod exec;
pub mod info;
pub mod logs;
pub mod shell;
pub mod start;
pub mod stop;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use crate::compose::stack::{self, RenderSettings, STACK_FILE};
use crate::config::model::ProjectConfig;
use crate::config::pipeline::{resolve_slug, ResolveContext};
use crate::config::prompt::{self, NoPrompt, Prompter};
use crate::docker::endpoint::{build_connection_config, resolve_socket, EngineEnv};
use crate::docker::DockerEngine;
use crate::environment::{EnvironmentRegistry, InstanceDescriptor};
use crate::error::Result;
use crate::orchestrator::Orchestrator;
use crate::settings::Settings;
use crate::versions::{ManifestSource, WordPressTag};

/// What every command needs: settings, the registry, a prompter and the
/// slug given on the command line.
pub struct Session {
    pub settings: Settings,
    pub registry: EnvironmentRegistry,
    prompter: Box<dyn Prompter>,
    slug_flag: Option<String>,
    cwd: PathBuf,
}

impl Session {
    pub fn new(settings: Settings, slug_flag: Option<String>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir()?;
        let prompter = prompt::for_session(settings.non_interactive);
        Ok(Self::with_parts(settings, slug_flag, cwd, prompter))
    }

    pub fn with_parts(
        settings: Settings,
        slug_flag: Option<String>,
        cwd: PathBuf,
        prompter: Box<dyn Prompter>,
    ) -> Self {
        Self {
            registry: EnvironmentRegistry::new(settings.environments_dir.clone()),
            settings,
            prompter,
            slug_flag,
            cwd,
        }
    }

    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    pub fn project_config(&self) -> Result<Option<ProjectConfig>> {
        crate::config::discover(&self.cwd)
    }

    /// Slug of an existing environment. Never prompts.
    pub fn slug(&self) -> Result<String> {
        let file = self.project_config()?;
        resolve_slug(self.slug_flag.as_deref(), file.as_ref(), &NoPrompt)
    }

    /// Slug of a new environment, prompting when nothing names one.
    pub fn new_slug(&self, file: Option<&ProjectConfig>) -> Result<String> {
        resolve_slug(self.slug_flag.as_deref(), file, self.prompter())
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            image_repository: self.settings.image_repository.clone(),
            domain: self.settings.domain.clone(),
        }
    }

    pub fn resolve_context<'a>(&'a self, manifest: &'a [WordPressTag]) -> ResolveContext<'a> {
        ResolveContext {
            prompter: self.prompter(),
            manifest,
            image_repository: &self.settings.image_repository,
            cwd: self.cwd.clone(),
        }
    }

    pub async fn manifest(&self) -> Vec<WordPressTag> {
        ManifestSource::new(&self.settings.cache_dir, &self.settings.versions_url)
            .manifest()
            .await
    }

    /// Host name of the image registry, e.g. `ghcr.io`.
    pub fn registry_host(&self) -> &str {
        crate::docker::image::registry_host(&self.settings.image_repository)
    }

    /// Write the stack file of a descriptor without touching the engine.
    pub fn write_stack(&self, descriptor: &InstanceDescriptor) -> Result<PathBuf> {
        let file = self.registry.path_for(&descriptor.slug)?.join(STACK_FILE);
        stack::write_stack(&file, &stack::render(descriptor, &self.render_settings()))?;
        Ok(file)
    }

    /// Connect to the container engine.
    pub async fn orchestrator(&self) -> Result<Orchestrator> {
        let env = EngineEnv::from_env();
        let config = build_connection_config(resolve_socket(&env), &env)?;
        let engine = DockerEngine::connect(&config).await?;
        Ok(Orchestrator::new(
            Arc::new(engine),
            self.registry.clone(),
            self.render_settings(),
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::session;

    #[test]
    fn slug_defaults_without_prompting() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(session(tmp.path(), None).slug().unwrap(), "wpdev-local");
        assert_eq!(session(tmp.path(), Some("demo")).slug().unwrap(), "demo");
    }

    #[test]
    fn slug_comes_from_the_project_file() {
        let tmp = tempfile::tempdir().unwrap();
        let s = session(tmp.path(), None);
        std::fs::write(
            tmp.path().join("work").join(".wpdev.yml"),
            "configuration-version: 1\nslug: from-file\n",
        )
        .unwrap();
        assert_eq!(s.slug().unwrap(), "from-file");
    }

    #[test]
    fn registry_host_is_the_first_segment() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(session(tmp.path(), None).registry_host(), "ghcr.io");
    }
}
