//! Docker runtime client - talks to the local daemon through bollard

use super::{ContainerRuntimeClient, ContainerState, ContainerSummary, ExecChunk, ExecRequest, ExecStream};
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use ignite_foundation::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info};

/// Container runtime backed by the local Docker daemon
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform defaults (socket / named pipe, DOCKER_HOST)
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn status_code(err: &DockerError) -> Option<u16> {
    match err {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

/// Map a daemon error for `container` onto the Ignite taxonomy
fn map_error(container: &str, err: DockerError) -> Error {
    match status_code(&err) {
        Some(404) => Error::NoSuchContainer {
            container: container.to_string(),
        },
        Some(409) => Error::ContainerConflict {
            container: container.to_string(),
        },
        _ => Error::runtime(container, err),
    }
}

fn state_from_str(state: Option<&str>) -> ContainerState {
    match state {
        Some("running") | Some("restarting") => ContainerState::Running,
        _ => ContainerState::Stopped,
    }
}

#[async_trait]
impl ContainerRuntimeClient for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<ContainerState> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => {
                let running = inspect
                    .state
                    .and_then(|state| state.running)
                    .unwrap_or(false);
                Ok(if running {
                    ContainerState::Running
                } else {
                    ContainerState::Stopped
                })
            }
            Err(e) if status_code(&e) == Some(404) => Ok(ContainerState::Absent),
            Err(e) => Err(map_error(name, e)),
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let binds = spec.binds();
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: spec.working_dir.clone(),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            labels: Some(spec.labels.clone()),
            host_config: Some(HostConfig {
                binds: if binds.is_empty() { None } else { Some(binds) },
                auto_remove: Some(spec.auto_remove),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| map_error(&spec.name, e))?;

        info!("Created container {} ({})", spec.name, response.id);
        Ok(response.id)
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self
            .docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 이미 실행 중
            Err(e) if status_code(&e) == Some(304) => Ok(()),
            Err(e) => Err(map_error(name, e)),
        }
    }

    async fn stop(&self, name: &str, timeout_secs: i64) -> Result<()> {
        match self
            .docker
            .stop_container(name, Some(StopContainerOptions { t: timeout_secs }))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if status_code(&e) == Some(304) => {
                debug!("Container {} already stopped", name);
                Ok(())
            }
            Err(e) => Err(map_error(name, e)),
        }
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(name, Some(options))
            .await
            .map_err(|e| map_error(name, e))
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}={}", key, value)]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| Error::runtime(format!("label {}={}", key, value), e))?;

        Ok(containers
            .into_iter()
            .map(|c| {
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_default();
                ContainerSummary {
                    id: c.id.clone().unwrap_or_default(),
                    name,
                    state: state_from_str(c.state.as_deref()),
                    labels: c.labels.clone().unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn exec(&self, name: &str, request: &ExecRequest) -> Result<Option<ExecStream>> {
        let options = CreateExecOptions {
            cmd: Some(request.cmd.iter().map(String::as_str).collect()),
            env: Some(request.env.iter().map(String::as_str).collect()),
            working_dir: request.working_dir.as_deref(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(name, options)
            .await
            .map_err(|e| Error::ExecCreate {
                container: name.to_string(),
                message: e.to_string(),
            })?;
        debug!(container = %name, exec = %exec.id, "exec session created");

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| Error::ExecCreate {
                container: name.to_string(),
                message: e.to_string(),
            })?;

        match started {
            StartExecResults::Attached { output, .. } => {
                let container = name.to_string();
                let stream = output
                    .map(move |item| match item {
                        Ok(LogOutput::StdOut { message }) => Ok(ExecChunk::Stdout(message.to_vec())),
                        Ok(LogOutput::StdErr { message }) => Ok(ExecChunk::Stderr(message.to_vec())),
                        Ok(LogOutput::StdIn { message }) => Ok(ExecChunk::Stdin(message.to_vec())),
                        Ok(LogOutput::Console { message }) => Ok(ExecChunk::Raw(message.to_vec())),
                        Err(e) => Err(Error::ExecStream {
                            container: container.clone(),
                            message: e.to_string(),
                        }),
                    })
                    .boxed();
                Ok(Some(stream))
            }
            StartExecResults::Detached => Ok(None),
        }
    }
}
