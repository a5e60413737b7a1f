use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

/// How `up` treats containers that already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpMode {
    /// Create missing containers, leave existing ones alone, never pull.
    Start,
    /// Recreate every container and its anonymous volumes.
    Recreate,
}

/// A compose project bound to its stack file and engine environment.
#[derive(Debug, Clone)]
pub struct ComposeProject {
    pub file: PathBuf,
    pub name: String,
    /// Extra environment for the `docker` subprocess (e.g. `DOCKER_HOST`).
    pub env: Vec<(String, String)>,
}

impl ComposeProject {
    pub fn new(file: &Path, name: &str) -> Self {
        Self {
            file: file.to_path_buf(),
            name: name.to_string(),
            env: Vec::new(),
        }
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    fn command(&self, args: &[&str]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("docker");
        cmd.args([
            "compose",
            "-f",
            &self.file.to_string_lossy(),
            "-p",
            &self.name,
        ]);
        cmd.args(args);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        cmd
    }

    /// Run a compose subcommand to completion, capturing its output.
    async fn run(&self, operation: &str, args: &[&str]) -> Result<String> {
        debug!(project = %self.name, ?args, "docker compose");
        let output = self
            .command(args)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running docker compose {}", operation))?;
        if !output.status.success() {
            bail!(
                "docker compose {} failed: {}",
                operation,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Ask compose to parse and validate the stack file.
    pub async fn config_check(&self) -> Result<()> {
        self.run("config", &["config", "--quiet"]).await.map(|_| ())
    }

    pub async fn pull(&self) -> Result<()> {
        self.run("pull", &["pull", "--quiet"]).await.map(|_| ())
    }

    pub async fn up(&self, mode: UpMode) -> Result<()> {
        let args: &[&str] = match mode {
            UpMode::Start => &["up", "-d", "--no-recreate", "--pull", "never"],
            UpMode::Recreate => &[
                "up",
                "-d",
                "--force-recreate",
                "--renew-anon-volumes",
                "--remove-orphans",
                "--pull",
                "missing",
            ],
        };
        self.run("up", args).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<()> {
        self.run("stop", &["stop"]).await.map(|_| ())
    }

    /// Run `docker compose down --remove-orphans`, optionally dropping named volumes.
    pub async fn down(&self, remove_volumes: bool) -> Result<()> {
        let mut args = vec!["down", "--remove-orphans"];
        if remove_volumes {
            args.push("--volumes");
        }
        self.run("down", &args).await.map(|_| ())
    }

    /// Run a command in a service container with inherited stdio.
    ///
    /// Returns the command's exit code.
    pub async fn exec(
        &self,
        service: &str,
        user: Option<&str>,
        env: &[(String, String)],
        command: &[String],
        interactive: bool,
    ) -> Result<i32> {
        let args = exec_args(service, user, env, command, interactive);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        debug!(project = %self.name, ?args, "docker compose exec");
        let status = self
            .command(&args)
            .status()
            .await
            .context("running docker compose exec")?;
        Ok(status.code().unwrap_or(1))
    }

    /// Stream service logs to the terminal until they end (or Ctrl+C with `follow`).
    pub async fn logs(&self, service: Option<&str>, follow: bool) -> Result<()> {
        let mut args = vec!["logs", "--timestamps"];
        if follow {
            args.push("--follow");
        }
        if let Some(service) = service {
            args.push(service);
        }
        let status = self
            .command(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .context("running docker compose logs")?;
        if !status.success() {
            bail!("docker compose logs exited with {}", status);
        }
        Ok(())
    }
}

/// Build the argument list for `docker compose exec`.
///
/// Only the given command reaches the container; the host's own argv is
/// never forwarded.
pub fn exec_args(
    service: &str,
    user: Option<&str>,
    env: &[(String, String)],
    command: &[String],
    interactive: bool,
) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    if !interactive {
        args.push("-T".to_string());
    }
    if let Some(user) = user {
        args.push("-u".to_string());
        args.push(user.to_string());
    }
    for (key, value) in env {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(service.to_string());
    args.extend(command.iter().cloned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn exec_args_interactive() {
        let args = exec_args(
            "php",
            Some("www-data"),
            &[],
            &strings(&["wp", "--path=/wp", "plugin", "list"]),
            true,
        );
        assert_eq!(
            args,
            strings(&["exec", "-u", "www-data", "php", "wp", "--path=/wp", "plugin", "list"])
        );
    }

    #[test]
    fn exec_args_non_interactive_with_env() {
        let args = exec_args(
            "database",
            None,
            &[("MYSQL_PWD".to_string(), "x".to_string())],
            &strings(&["mariadb"]),
            false,
        );
        assert_eq!(
            args,
            strings(&["exec", "-T", "-e", "MYSQL_PWD=x", "database", "mariadb"])
        );
    }

    #[test]
    fn project_binds_file_and_name() {
        let project = ComposeProject::new(Path::new("/tmp/x/docker-compose.yml"), "wpdevdemo")
            .with_env(vec![("DOCKER_HOST".into(), "tcp://h:2375".into())]);
        assert_eq!(project.name, "wpdevdemo");
        assert_eq!(project.env.len(), 1);
        let cmd = project.command(&["ps"]);
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            strings(&["compose", "-f", "/tmp/x/docker-compose.yml", "-p", "wpdevdemo", "ps"])
        );
    }
}
