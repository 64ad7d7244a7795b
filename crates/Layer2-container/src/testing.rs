//! In-memory runtime and asset loader for tests
//!
//! Enabled inside this crate's own tests and, for downstream crates,
//! through the `testing` feature.

use crate::loader::{PluginAssetLoader, PluginPayload};
use crate::runtime::{
    ContainerRuntimeClient, ContainerState, ContainerSummary, ExecChunk, ExecRequest, ExecStream,
};
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use ignite_foundation::{Error, PluginType, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What an exec session should produce
#[derive(Debug, Clone)]
pub enum ExecReply {
    Chunks(Vec<ExecChunk>),
    /// Session accepted without an output stream
    NoStream,
    /// Chunks followed by a stream error
    StreamError(Vec<ExecChunk>, String),
    /// Output that never ends
    Hang,
}

impl ExecReply {
    pub fn stdout(text: impl Into<String>) -> Self {
        ExecReply::Chunks(vec![ExecChunk::Stdout(text.into().into_bytes())])
    }

    /// Successful envelope carrying `data`
    pub fn success(data: Value) -> Self {
        Self::stdout(serde_json::json!({ "success": true, "data": data }).to_string())
    }

    pub fn failure(code: &str, message: &str) -> Self {
        Self::stdout(
            serde_json::json!({
                "success": false,
                "error": { "code": code, "message": message }
            })
            .to_string(),
        )
    }
}

/// One exec session as seen by the runtime
#[derive(Debug, Clone)]
pub struct RecordedExec {
    pub container: String,
    pub cmd: Vec<String>,
    pub operation: String,
    pub params: Value,
    pub env: Vec<String>,
    pub working_dir: Option<String>,
}

impl RecordedExec {
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env.iter().find_map(|pair| {
            pair.split_once('=')
                .and_then(|(k, v)| if k == key { Some(v) } else { None })
        })
    }
}

type ExecHandler = Box<dyn Fn(&RecordedExec) -> ExecReply + Send + Sync>;

#[derive(Debug, Clone)]
struct FakeContainer {
    spec: ContainerSpec,
    state: ContainerState,
}

/// Container runtime that lives in a `HashMap`
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    created: Mutex<Vec<ContainerSpec>>,
    execs: Mutex<Vec<RecordedExec>>,
    failing_removals: Mutex<HashSet<String>>,
    racing_creates: Mutex<HashSet<String>>,
    handler: Mutex<ExecHandler>,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            execs: Mutex::new(Vec::new()),
            failing_removals: Mutex::new(HashSet::new()),
            racing_creates: Mutex::new(HashSet::new()),
            handler: Mutex::new(Box::new(|_: &RecordedExec| {
                ExecReply::success(Value::Object(Default::default()))
            })),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
        }
    }

    /// Seed an existing container
    pub fn insert(&self, spec: ContainerSpec, state: ContainerState) {
        self.containers
            .lock()
            .insert(spec.name.clone(), FakeContainer { spec, state });
    }

    pub fn on_exec(&self, handler: impl Fn(&RecordedExec) -> ExecReply + Send + Sync + 'static) {
        *self.handler.lock() = Box::new(handler);
    }

    /// Every removal of `name` fails with a runtime error
    pub fn fail_removal_of(&self, name: &str) {
        self.failing_removals.lock().insert(name.to_string());
    }

    /// The next create of `name` loses a race: the container appears and
    /// the call reports a conflict
    pub fn race_create_of(&self, name: &str) {
        self.racing_creates.lock().insert(name.to_string());
    }

    pub fn state_of(&self, name: &str) -> ContainerState {
        self.containers
            .lock()
            .get(name)
            .map(|c| c.state)
            .unwrap_or(ContainerState::Absent)
    }

    pub fn spec_of(&self, name: &str) -> Option<ContainerSpec> {
        self.containers.lock().get(name).map(|c| c.spec.clone())
    }

    pub fn created(&self) -> Vec<ContainerSpec> {
        self.created.lock().clone()
    }

    pub fn execs(&self) -> Vec<RecordedExec> {
        self.execs.lock().clone()
    }

    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.containers.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ContainerRuntimeClient for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn state(&self, name: &str) -> Result<ContainerState> {
        Ok(self.state_of(name))
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let conflict = Error::ContainerConflict {
            container: spec.name.clone(),
        };
        let mut containers = self.containers.lock();
        if self.racing_creates.lock().remove(&spec.name) {
            containers.insert(
                spec.name.clone(),
                FakeContainer {
                    spec: spec.clone(),
                    state: ContainerState::Running,
                },
            );
            return Err(conflict);
        }
        if containers.contains_key(&spec.name) {
            return Err(conflict);
        }
        containers.insert(
            spec.name.clone(),
            FakeContainer {
                spec: spec.clone(),
                state: ContainerState::Stopped,
            },
        );
        self.created.lock().push(spec.clone());
        Ok(format!("id-{}", spec.name))
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match self.containers.lock().get_mut(name) {
            Some(container) => {
                container.state = ContainerState::Running;
                Ok(())
            }
            None => Err(Error::NoSuchContainer {
                container: name.to_string(),
            }),
        }
    }

    async fn stop(&self, name: &str, _timeout_secs: i64) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut containers = self.containers.lock();
        let Some(container) = containers.get_mut(name) else {
            return Err(Error::NoSuchContainer {
                container: name.to_string(),
            });
        };
        container.state = ContainerState::Stopped;
        if container.spec.auto_remove {
            containers.remove(name);
        }
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_removals.lock().contains(name) {
            return Err(Error::runtime(name, "removal refused"));
        }
        let mut containers = self.containers.lock();
        match containers.get(name).map(|c| c.state) {
            None => Err(Error::NoSuchContainer {
                container: name.to_string(),
            }),
            Some(ContainerState::Running) if !force => Err(Error::ContainerConflict {
                container: name.to_string(),
            }),
            Some(_) => {
                containers.remove(name);
                Ok(())
            }
        }
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerSummary>> {
        let containers = self.containers.lock();
        let mut found: Vec<ContainerSummary> = containers
            .values()
            .filter(|c| c.spec.labels.get(key).map(String::as_str) == Some(value))
            .map(|c| ContainerSummary {
                id: format!("id-{}", c.spec.name),
                name: c.spec.name.clone(),
                state: c.state,
                labels: c.spec.labels.clone(),
            })
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn exec(&self, name: &str, request: &ExecRequest) -> Result<Option<ExecStream>> {
        match self.state_of(name) {
            ContainerState::Running => {}
            state => {
                return Err(Error::ExecCreate {
                    container: name.to_string(),
                    message: format!("container is {:?}", state),
                })
            }
        }

        let len = request.cmd.len();
        let operation = len
            .checked_sub(2)
            .and_then(|i| request.cmd.get(i))
            .cloned()
            .unwrap_or_default();
        let params = request
            .cmd
            .last()
            .and_then(|p| serde_json::from_str(p).ok())
            .unwrap_or(Value::Null);
        let recorded = RecordedExec {
            container: name.to_string(),
            cmd: request.cmd.clone(),
            operation,
            params,
            env: request.env.clone(),
            working_dir: request.working_dir.clone(),
        };
        self.execs.lock().push(recorded.clone());

        let reply = (self.handler.lock())(&recorded);
        let container = name.to_string();
        Ok(match reply {
            ExecReply::Chunks(chunks) => Some(stream::iter(chunks.into_iter().map(Ok)).boxed()),
            ExecReply::NoStream => None,
            ExecReply::StreamError(chunks, message) => {
                let error = Error::ExecStream { container, message };
                Some(
                    stream::iter(chunks.into_iter().map(Ok))
                        .chain(stream::iter(std::iter::once(Err(error))))
                        .boxed(),
                )
            }
            ExecReply::Hang => Some(stream::pending::<Result<ExecChunk>>().boxed()),
        })
    }
}

/// Asset loader serving in-memory payloads
#[derive(Default)]
pub struct StaticAssetLoader {
    payloads: HashMap<(PluginType, String), Arc<PluginPayload>>,
    /// Serve a stub payload for ids that were not registered
    permissive: bool,
}

impl StaticAssetLoader {
    /// Every plugin id resolves to a stub payload
    pub fn permissive() -> Self {
        Self {
            payloads: HashMap::new(),
            permissive: true,
        }
    }

    pub fn with_plugin(mut self, plugin_type: PluginType, id: &str, source: &str) -> Self {
        self.payloads.insert(
            (plugin_type, id.to_string()),
            Arc::new(PluginPayload::node(source)),
        );
        self
    }
}

#[async_trait]
impl PluginAssetLoader for StaticAssetLoader {
    async fn load(&self, plugin_type: PluginType, plugin_id: &str) -> Result<Arc<PluginPayload>> {
        if let Some(payload) = self.payloads.get(&(plugin_type, plugin_id.to_string())) {
            return Ok(payload.clone());
        }
        if self.permissive {
            return Ok(Arc::new(PluginPayload::node(format!(
                "/* {}/{} */",
                plugin_type, plugin_id
            ))));
        }
        Err(Error::PayloadLoad {
            plugin: plugin_id.to_string(),
            message: "not registered".into(),
        })
    }
}
