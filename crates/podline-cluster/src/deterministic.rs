//! Scripted in-memory cluster platform for tests.
//!
//! Each pod follows a timeline of status frames. Every `get_pod` call
//! returns the current frame and moves the pod to the next one; the last
//! frame repeats forever. Pods without a registered [`PodScript`] get a
//! default two-frame timeline derived from their spec: everything running
//! and ready, then everything terminated with exit code 0.

use std::collections::HashMap;
use std::collections::HashSet;
use std::io;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::ReadBuf;

use crate::error::ClusterError;
use crate::error::Result;
use crate::platform::ClusterPlatform;
use crate::platform::LogStream;
use crate::types::ContainerStatus;
use crate::types::PodIdentity;
use crate::types::PodPhase;
use crate::types::PodSpec;
use crate::types::PodStatusSnapshot;

#[derive(Debug, Clone)]
struct Frame {
    phase: PodPhase,
    init: Vec<ContainerStatus>,
    app: Vec<ContainerStatus>,
}

/// Status timeline and log content for one scripted pod.
#[derive(Debug, Clone, Default)]
pub struct PodScript {
    frames: Vec<Frame>,
    logs: HashMap<String, Vec<u8>>,
    log_open_failures: HashSet<String>,
    log_read_failures: HashSet<String>,
    fetch_failure_at: Option<usize>,
}

impl PodScript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one status frame.
    pub fn frame(mut self, phase: PodPhase, init: Vec<ContainerStatus>, app: Vec<ContainerStatus>) -> Self {
        self.frames.push(Frame { phase, init, app });
        self
    }

    /// Output served by the container's log stream.
    pub fn logs(mut self, container: &str, output: impl Into<Vec<u8>>) -> Self {
        self.logs.insert(container.to_string(), output.into());
        self
    }

    /// Opening the container's log stream fails.
    pub fn fail_log_open(mut self, container: &str) -> Self {
        self.log_open_failures.insert(container.to_string());
        self
    }

    /// The container's log stream serves its output, then fails mid-read.
    pub fn fail_log_read(mut self, container: &str) -> Self {
        self.log_read_failures.insert(container.to_string());
        self
    }

    /// The `index`-th status fetch (zero-based) fails.
    pub fn fail_fetch_at(mut self, index: usize) -> Self {
        self.fetch_failure_at = Some(index);
        self
    }

    fn from_spec(spec: &PodSpec) -> Self {
        let init_done: Vec<ContainerStatus> =
            spec.init_containers.iter().map(|c| ContainerStatus::terminated(&c.name, 0).with_ready(true)).collect();

        Self::new()
            .frame(
                PodPhase::Running,
                init_done.clone(),
                spec.containers.iter().map(|c| ContainerStatus::running(&c.name, true)).collect(),
            )
            .frame(
                PodPhase::Succeeded,
                init_done,
                spec.containers.iter().map(|c| ContainerStatus::terminated(&c.name, 0)).collect(),
            )
    }
}

struct PodEntry {
    identity: PodIdentity,
    script: PodScript,
    fetches: usize,
}

#[derive(Default)]
struct State {
    pods: HashMap<String, PodEntry>,
    scripts: HashMap<String, PodScript>,
    create_failures: HashSet<String>,
    delete_failures: HashSet<String>,
    omitted: HashSet<String>,
    created: Vec<PodIdentity>,
    deleted: Vec<PodIdentity>,
    fetch_counts: HashMap<String, usize>,
    next_uid: u64,
}

/// A deterministic in-memory cluster platform for testing.
///
/// Pods are keyed by name; the namespace must match on every call.
pub struct DeterministicCluster {
    state: Mutex<State>,
}

impl Default for DeterministicCluster {
    fn default() -> Self {
        Self::new_inner()
    }
}

impl DeterministicCluster {
    /// Create a new deterministic platform wrapped in Arc.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_inner())
    }

    fn new_inner() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Use `script` for the pod named `name` once it is created.
    pub fn script_pod(&self, name: &str, script: PodScript) {
        self.state.lock().scripts.insert(name.to_string(), script);
    }

    /// Creating the pod named `name` fails.
    pub fn fail_create(&self, name: &str) {
        self.state.lock().create_failures.insert(name.to_string());
    }

    /// Deleting the pod named `name` fails.
    pub fn fail_delete(&self, name: &str) {
        self.state.lock().delete_failures.insert(name.to_string());
    }

    /// Creating the pod named `name` succeeds without returning the pod.
    pub fn omit_created_pod(&self, name: &str) {
        self.state.lock().omitted.insert(name.to_string());
    }

    /// Identities of every pod created, in creation order.
    pub fn created_pods(&self) -> Vec<PodIdentity> {
        self.state.lock().created.clone()
    }

    /// Identities of every pod deleted, in deletion order.
    pub fn deleted_pods(&self) -> Vec<PodIdentity> {
        self.state.lock().deleted.clone()
    }

    /// Number of status fetches made for the pod named `name`.
    pub fn fetch_count(&self, name: &str) -> usize {
        self.state.lock().fetch_counts.get(name).copied().unwrap_or(0)
    }
}

fn lookup<'a>(pods: &'a mut HashMap<String, PodEntry>, namespace: &str, name: &str) -> Result<&'a mut PodEntry> {
    match pods.get_mut(name) {
        Some(entry) if entry.identity.namespace == namespace => Ok(entry),
        _ => Err(ClusterError::PodNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }),
    }
}

fn injected(operation: &str, target: String) -> ClusterError {
    ClusterError::Api {
        operation: operation.to_string(),
        target,
        reason: "injected failure".to_string(),
    }
}

#[async_trait]
impl ClusterPlatform for DeterministicCluster {
    async fn create_pod(&self, spec: &PodSpec) -> Result<Option<PodIdentity>> {
        spec.validate()?;

        let mut state = self.state.lock();
        if state.create_failures.contains(&spec.name) {
            return Err(injected("create", format!("{}/{}", spec.namespace, spec.name)));
        }
        if state.pods.contains_key(&spec.name) {
            return Err(ClusterError::PodAlreadyExists {
                namespace: spec.namespace.clone(),
                name: spec.name.clone(),
            });
        }

        state.next_uid += 1;
        let identity = PodIdentity::new(&spec.namespace, format!("uid-{:04}", state.next_uid), &spec.name);
        let script = state.scripts.remove(&spec.name).unwrap_or_else(|| PodScript::from_spec(spec));
        state.pods.insert(spec.name.clone(), PodEntry {
            identity: identity.clone(),
            script,
            fetches: 0,
        });
        state.created.push(identity.clone());

        if state.omitted.contains(&spec.name) {
            return Ok(None);
        }
        Ok(Some(identity))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<PodStatusSnapshot> {
        let mut state = self.state.lock();
        *state.fetch_counts.entry(name.to_string()).or_insert(0) += 1;

        let entry = lookup(&mut state.pods, namespace, name)?;
        let index = entry.fetches;
        entry.fetches += 1;

        if entry.script.fetch_failure_at == Some(index) {
            return Err(injected("get", entry.identity.to_string()));
        }

        let frame = entry.script.frames.get(index).or_else(|| entry.script.frames.last());
        let snapshot = match frame {
            Some(frame) => PodStatusSnapshot {
                identity: entry.identity.clone(),
                phase: frame.phase,
                init_container_statuses: frame.init.clone(),
                container_statuses: frame.app.clone(),
            },
            None => PodStatusSnapshot {
                identity: entry.identity.clone(),
                phase: PodPhase::Pending,
                ..PodStatusSnapshot::default()
            },
        };
        Ok(snapshot)
    }

    async fn stream_logs(&self, namespace: &str, pod: &str, container: &str) -> Result<LogStream> {
        let mut state = self.state.lock();
        let entry = lookup(&mut state.pods, namespace, pod)?;
        let script = &entry.script;

        if script.log_open_failures.contains(container) {
            return Err(injected("logs", format!("{}/{container}", entry.identity)));
        }

        let output = Cursor::new(script.logs.get(container).cloned().unwrap_or_default());
        if script.log_read_failures.contains(container) {
            return Ok(Box::pin(output.chain(ConnectionReset)));
        }
        Ok(Box::pin(output))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.delete_failures.contains(name) {
            return Err(injected("delete", format!("{namespace}/{name}")));
        }

        let identity = lookup(&mut state.pods, namespace, name)?.identity.clone();
        state.pods.remove(name);
        state.deleted.push(identity);
        Ok(())
    }
}

/// Log stream tail that fails every read.
struct ConnectionReset;

impl AsyncRead for ConnectionReset {
    fn poll_read(self: Pin<&mut Self>, _cx: &mut Context<'_>, _buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "log stream reset by peer")))
    }
}
