//! Running tools and shells inside a running environment.

use tracing::debug;

use super::engine::{ContainerSummary, Engine, ExecRequest, StackRef};
use crate::compose::stack::{self, StackDefinition};
use crate::error::{closest_match, EnvError, Result};

/// Service a shell attaches to when none is named.
pub const DEFAULT_SHELL_SERVICE: &str = "php";

/// Unprivileged user of the PHP service.
const PHP_USER: &str = "www-data";

/// What `shell` should attach to.
#[derive(Debug, Clone, Default)]
pub struct ShellRequest {
    pub service: Option<String>,
    pub root: bool,
    /// Run this instead of a login shell.
    pub command: Vec<String>,
}

fn load_definition(slug: &str, stack: &StackRef) -> Result<StackDefinition> {
    stack::read_stack(&stack.file).map_err(|e| {
        debug!(slug, error = %format!("{:#}", e), "no usable stack file");
        EnvError::NotRunning {
            slug: slug.to_string(),
        }
    })
}

async fn running_container(
    engine: &dyn Engine,
    slug: &str,
    stack: &StackRef,
    service: &str,
) -> Result<ContainerSummary> {
    engine
        .project_containers(&stack.project)
        .await?
        .into_iter()
        .find(|c| c.running && c.service.as_deref() == Some(service))
        .ok_or_else(|| EnvError::NotRunning {
            slug: slug.to_string(),
        })
}

/// Run a named tool with `args` appended verbatim to its command.
/// Returns the tool's exit code.
pub async fn exec_tool(
    engine: &dyn Engine,
    slug: &str,
    stack: &StackRef,
    tool: &str,
    args: &[String],
    interactive: bool,
) -> Result<i32> {
    let definition = load_definition(slug, stack)?;
    let Some(spec) = definition.tooling.get(tool) else {
        let names: Vec<&str> = definition.tool_names().collect();
        return Err(EnvError::UnknownTool {
            tool: tool.to_string(),
            suggestion: closest_match(tool, names.iter().copied()),
            available: names.join(", "),
        });
    };

    running_container(engine, slug, stack, &spec.service).await?;

    let mut command = spec.cmd.clone();
    command.extend(args.iter().cloned());
    let request = ExecRequest {
        service: spec.service.clone(),
        user: spec.user.clone(),
        env: Vec::new(),
        command,
        interactive,
    };
    debug!(slug, tool, service = %request.service, "running tool");
    engine.exec(stack, &request).await
}

/// Attach a shell, or run `request.command`, inside a service.
pub async fn shell(
    engine: &dyn Engine,
    slug: &str,
    stack: &StackRef,
    request: &ShellRequest,
    interactive: bool,
) -> Result<i32> {
    let definition = load_definition(slug, stack)?;
    let service = request
        .service
        .clone()
        .unwrap_or_else(|| DEFAULT_SHELL_SERVICE.to_string());
    if !definition.services.contains_key(&service) {
        return Err(EnvError::UnknownService {
            available: definition
                .services
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            service,
        });
    }

    let container = running_container(engine, slug, stack, &service).await?;

    let user = if request.root {
        Some("root".to_string())
    } else if service == DEFAULT_SHELL_SERVICE {
        Some(PHP_USER.to_string())
    } else {
        None
    };

    let (command, interactive) = if request.command.is_empty() {
        let shell = if engine.has_binary(&container.id, "bash").await? {
            "bash"
        } else {
            "sh"
        };
        (vec![shell.to_string(), "-l".to_string()], true)
    } else {
        (request.command.clone(), interactive)
    };

    let request = ExecRequest {
        service,
        user,
        env: Vec::new(),
        command,
        interactive,
    };
    debug!(slug, service = %request.service, command = ?request.command, "attaching shell");
    engine.exec(stack, &request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::lifecycle::UpMode;
    use crate::compose::stack::{render, write_stack, RenderSettings, STACK_FILE};
    use crate::environment::descriptor::sample;
    use crate::orchestrator::engine::mock::MockEngine;

    async fn running(tmp: &tempfile::TempDir) -> (MockEngine, StackRef) {
        let stack = StackRef {
            project: "wpdevdemo".to_string(),
            file: tmp.path().join(STACK_FILE),
        };
        let settings = RenderSettings {
            image_repository: "repo".to_string(),
            domain: "test.local".to_string(),
        };
        write_stack(&stack.file, &render(&sample("demo"), &settings)).unwrap();
        let engine = MockEngine::default();
        engine.up(&stack, UpMode::Start).await.unwrap();
        (engine, stack)
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn tool_arguments_pass_through_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        engine.with(|s| s.exit_code = 3);

        let code = exec_tool(
            &engine,
            "demo",
            &stack,
            "wp",
            &args(&["option", "get", "siteurl", "--format=json"]),
            false,
        )
        .await
        .unwrap();

        assert_eq!(code, 3);
        let exec = engine.with(|s| s.execs[0].clone());
        assert_eq!(exec.service, "php");
        assert_eq!(exec.user.as_deref(), Some("www-data"));
        assert_eq!(
            exec.command,
            args(&["wp", "--path=/wp", "option", "get", "siteurl", "--format=json"])
        );
    }

    #[tokio::test]
    async fn unknown_tool_suggests_a_name() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        let err = exec_tool(&engine, "demo", &stack, "wpp", &[], false)
            .await
            .unwrap_err();
        match err {
            EnvError::UnknownTool {
                suggestion,
                available,
                ..
            } => {
                assert_eq!(suggestion.as_deref(), Some("wp"));
                assert_eq!(available, "db, php, wp");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn stopped_environment_is_not_running() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        engine.stop(&stack).await.unwrap();
        let err = exec_tool(&engine, "demo", &stack, "db", &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::NotRunning { .. }));
        assert!(engine.with(|s| s.execs.is_empty()));
    }

    #[tokio::test]
    async fn missing_stack_file_is_not_running() {
        let tmp = tempfile::tempdir().unwrap();
        let stack = StackRef {
            project: "wpdevdemo".to_string(),
            file: tmp.path().join(STACK_FILE),
        };
        let err = exec_tool(&MockEngine::default(), "demo", &stack, "wp", &[], false)
            .await
            .unwrap_err();
        assert!(matches!(err, EnvError::NotRunning { .. }));
    }

    #[tokio::test]
    async fn shell_prefers_bash() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        engine.with(|s| {
            s.binaries.insert("bash".to_string());
        });
        shell(&engine, "demo", &stack, &ShellRequest::default(), false)
            .await
            .unwrap();
        let exec = engine.with(|s| s.execs[0].clone());
        assert_eq!(exec.command, args(&["bash", "-l"]));
        assert!(exec.interactive);
        assert_eq!(exec.user.as_deref(), Some("www-data"));
    }

    #[tokio::test]
    async fn shell_falls_back_to_sh_as_root() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        let request = ShellRequest {
            service: Some("database".to_string()),
            root: true,
            command: Vec::new(),
        };
        shell(&engine, "demo", &stack, &request, false).await.unwrap();
        let exec = engine.with(|s| s.execs[0].clone());
        assert_eq!(exec.service, "database");
        assert_eq!(exec.command, args(&["sh", "-l"]));
        assert_eq!(exec.user.as_deref(), Some("root"));
    }

    #[tokio::test]
    async fn shell_runs_a_given_command() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        let request = ShellRequest {
            service: Some("nginx".to_string()),
            root: false,
            command: args(&["nginx", "-t"]),
        };
        shell(&engine, "demo", &stack, &request, false).await.unwrap();
        let exec = engine.with(|s| s.execs[0].clone());
        assert_eq!(exec.command, args(&["nginx", "-t"]));
        assert_eq!(exec.user, None);
        assert!(!exec.interactive);
    }

    #[tokio::test]
    async fn shell_rejects_unknown_services() {
        let tmp = tempfile::tempdir().unwrap();
        let (engine, stack) = running(&tmp).await;
        let request = ShellRequest {
            service: Some("redis".to_string()),
            ..Default::default()
        };
        let err = shell(&engine, "demo", &stack, &request, false).await.unwrap_err();
        assert!(matches!(err, EnvError::UnknownService { ref service, .. } if service == "redis"));
    }
}
