use std::path::PathBuf;

use async_trait::async_trait;

use crate::compose::lifecycle::UpMode;
use crate::error::Result;

/// The compose project of one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRef {
    pub project: String,
    pub file: PathBuf,
}

/// A container of a compose project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub service: Option<String>,
    pub image: String,
    pub running: bool,
}

/// Extended inspection data shown by `info --extended`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub image: String,
    pub running: bool,
    pub started_at: Option<String>,
    pub ip_addresses: Vec<String>,
    /// Published ports as `host_port->container_port/proto`.
    pub ports: Vec<String>,
}

/// A command to run inside a service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub service: String,
    pub user: Option<String>,
    pub env: Vec<(String, String)>,
    pub command: Vec<String>,
    /// Allocate a TTY and attach stdin.
    pub interactive: bool,
}

/// The shared reverse proxy container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySpec {
    pub name: String,
    pub image: String,
    pub network: String,
    pub http_port: u16,
}

/// Everything the orchestrator asks of the container engine.
///
/// Project-level operations go through the stack file; container-level
/// operations address containers by name or ID.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Parse and validate a stack file without starting anything.
    async fn validate_stack(&self, stack: &StackRef) -> Result<()>;
    async fn pull(&self, stack: &StackRef) -> Result<()>;
    async fn up(&self, stack: &StackRef, mode: UpMode) -> Result<()>;
    async fn stop(&self, stack: &StackRef) -> Result<()>;
    async fn down(&self, stack: &StackRef, remove_volumes: bool) -> Result<()>;

    async fn project_containers(&self, project: &str) -> Result<Vec<ContainerSummary>>;
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails>;
    /// `None` when the container does not exist, otherwise whether it runs.
    async fn container_running(&self, name: &str) -> Result<Option<bool>>;
    async fn remove_container(&self, name: &str) -> Result<()>;

    async fn ensure_network(&self, name: &str) -> Result<()>;
    /// Names of the running containers attached to a network.
    async fn network_members(&self, name: &str) -> Result<Vec<String>>;
    /// Create and start the proxy container, or start it if it exists.
    async fn start_proxy(&self, proxy: &ProxySpec) -> Result<()>;

    async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>>;
    async fn remove_volume(&self, name: &str) -> Result<()>;

    /// Run a command in a service container, returning its exit code.
    async fn exec(&self, stack: &StackRef, request: &ExecRequest) -> Result<i32>;
    async fn has_binary(&self, container_id: &str, binary: &str) -> Result<bool>;
    async fn logs(&self, stack: &StackRef, service: Option<&str>, follow: bool) -> Result<()>;
}

#[cfg(test)]
pub mod mock {
    //! In-memory engine used by unit tests.

    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;

    use super::*;
    use crate::compose::stack;
    use crate::error::EnvError;

    #[derive(Debug, Default)]
    pub struct MockProject {
        /// service -> running
        pub services: BTreeMap<String, bool>,
        /// Services attached to the shared edge network.
        pub edge_services: BTreeSet<String>,
    }

    #[derive(Debug, Default)]
    pub struct MockState {
        pub projects: BTreeMap<String, MockProject>,
        /// `Some(running)` when the proxy container exists.
        pub proxy: Option<bool>,
        pub proxy_name: String,
        pub networks: BTreeSet<String>,
        pub volumes: BTreeSet<String>,
        /// Number of upcoming `validate_stack` calls that fail.
        pub validate_failures: usize,
        pub fail_pull: bool,
        pub binaries: BTreeSet<String>,
        pub exit_code: i32,
        pub execs: Vec<ExecRequest>,
        pub calls: Vec<String>,
    }

    #[derive(Debug, Default)]
    pub struct MockEngine {
        pub state: Mutex<MockState>,
    }

    impl MockEngine {
        pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            let mut state = self.state.lock().unwrap();
            f(&mut state)
        }

        pub fn calls(&self) -> Vec<String> {
            self.with(|s| s.calls.clone())
        }

        pub fn count(&self, call: &str) -> usize {
            self.with(|s| s.calls.iter().filter(|c| c.as_str() == call).count())
        }

        fn record(&self, call: String) {
            self.with(|s| s.calls.push(call));
        }
    }

    fn container_name(project: &str, service: &str) -> String {
        format!("{}-{}-1", project, service)
    }

    #[async_trait]
    impl Engine for MockEngine {
        async fn validate_stack(&self, stack: &StackRef) -> Result<()> {
            self.record(format!("validate {}", stack.project));
            let inject = self.with(|s| {
                if s.validate_failures > 0 {
                    s.validate_failures -= 1;
                    true
                } else {
                    false
                }
            });
            if inject {
                return Err(EnvError::engine("docker compose config", "injected failure"));
            }
            stack::read_stack(&stack.file)
                .map(|_| ())
                .map_err(|e| EnvError::engine("docker compose config", format!("{:#}", e)))
        }

        async fn pull(&self, stack: &StackRef) -> Result<()> {
            self.record(format!("pull {}", stack.project));
            if self.with(|s| s.fail_pull) {
                return Err(EnvError::engine("docker compose pull", "registry unreachable"));
            }
            Ok(())
        }

        async fn up(&self, stack: &StackRef, mode: UpMode) -> Result<()> {
            self.record(format!("up {} {:?}", stack.project, mode));
            let definition = stack::read_stack(&stack.file)
                .map_err(|e| EnvError::engine("docker compose up", format!("{:#}", e)))?;
            self.with(|s| {
                let project = s.projects.entry(stack.project.clone()).or_default();
                for (name, service) in &definition.services {
                    project.services.insert(name.clone(), true);
                    if service.networks.iter().any(|n| n == stack::EDGE_NETWORK_KEY) {
                        project.edge_services.insert(name.clone());
                    }
                }
                for volume in definition.volumes.keys() {
                    s.volumes.insert(format!("{}_{}", stack.project, volume));
                }
            });
            Ok(())
        }

        async fn stop(&self, stack: &StackRef) -> Result<()> {
            self.record(format!("stop {}", stack.project));
            self.with(|s| {
                if let Some(project) = s.projects.get_mut(&stack.project) {
                    project.services.values_mut().for_each(|r| *r = false);
                }
            });
            Ok(())
        }

        async fn down(&self, stack: &StackRef, remove_volumes: bool) -> Result<()> {
            self.record(format!("down {} {}", stack.project, remove_volumes));
            self.with(|s| {
                s.projects.remove(&stack.project);
                if remove_volumes {
                    let prefix = format!("{}_", stack.project);
                    s.volumes.retain(|v| !v.starts_with(&prefix));
                }
            });
            Ok(())
        }

        async fn project_containers(&self, project: &str) -> Result<Vec<ContainerSummary>> {
            Ok(self.with(|s| {
                s.projects
                    .get(project)
                    .map(|p| {
                        p.services
                            .iter()
                            .map(|(service, running)| ContainerSummary {
                                id: container_name(project, service),
                                name: container_name(project, service),
                                service: Some(service.clone()),
                                image: format!("image/{}", service),
                                running: *running,
                            })
                            .collect()
                    })
                    .unwrap_or_default()
            }))
        }

        async fn inspect_container(&self, id: &str) -> Result<ContainerDetails> {
            self.record(format!("inspect {}", id));
            let running = self.with(|s| {
                s.projects.iter().any(|(project, p)| {
                    p.services
                        .iter()
                        .any(|(svc, r)| *r && container_name(project, svc) == id)
                })
            });
            Ok(ContainerDetails {
                id: id.to_string(),
                name: id.to_string(),
                image: "image".to_string(),
                running,
                started_at: None,
                ip_addresses: vec!["172.18.0.2".to_string()],
                ports: Vec::new(),
            })
        }

        async fn container_running(&self, name: &str) -> Result<Option<bool>> {
            Ok(self.with(|s| {
                if name == s.proxy_name {
                    return s.proxy;
                }
                s.projects.iter().find_map(|(project, p)| {
                    p.services
                        .iter()
                        .find(|(svc, _)| container_name(project, svc) == name)
                        .map(|(_, r)| *r)
                })
            }))
        }

        async fn remove_container(&self, name: &str) -> Result<()> {
            self.record(format!("remove-container {}", name));
            self.with(|s| {
                if name == s.proxy_name {
                    s.proxy = None;
                }
            });
            Ok(())
        }

        async fn ensure_network(&self, name: &str) -> Result<()> {
            self.with(|s| s.networks.insert(name.to_string()));
            Ok(())
        }

        async fn network_members(&self, name: &str) -> Result<Vec<String>> {
            Ok(self.with(|s| {
                if !s.networks.contains(name) {
                    return Vec::new();
                }
                let mut members: Vec<String> = s
                    .projects
                    .iter()
                    .flat_map(|(project, p)| {
                        p.edge_services
                            .iter()
                            .filter(|svc| p.services.get(*svc).copied().unwrap_or(false))
                            .map(move |svc| container_name(project, svc))
                    })
                    .collect();
                if s.proxy == Some(true) {
                    members.push(s.proxy_name.clone());
                }
                members
            }))
        }

        async fn start_proxy(&self, proxy: &ProxySpec) -> Result<()> {
            self.record(format!("start-proxy {}", proxy.name));
            self.with(|s| {
                s.proxy_name = proxy.name.clone();
                s.proxy = Some(true);
            });
            Ok(())
        }

        async fn list_volumes(&self, prefix: &str) -> Result<Vec<String>> {
            Ok(self.with(|s| {
                s.volumes
                    .iter()
                    .filter(|v| v.starts_with(prefix))
                    .cloned()
                    .collect()
            }))
        }

        async fn remove_volume(&self, name: &str) -> Result<()> {
            self.record(format!("remove-volume {}", name));
            self.with(|s| s.volumes.remove(name));
            Ok(())
        }

        async fn exec(&self, stack: &StackRef, request: &ExecRequest) -> Result<i32> {
            self.record(format!("exec {} {}", stack.project, request.service));
            Ok(self.with(|s| {
                s.execs.push(request.clone());
                s.exit_code
            }))
        }

        async fn has_binary(&self, _container_id: &str, binary: &str) -> Result<bool> {
            Ok(self.with(|s| s.binaries.contains(binary)))
        }

        async fn logs(&self, stack: &StackRef, service: Option<&str>, follow: bool) -> Result<()> {
            self.record(format!(
                "logs {} {} {}",
                stack.project,
                service.unwrap_or("*"),
                follow
            ));
            Ok(())
        }
    }
}
