//! Fake CAD handles shared by the tests

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;

use crate::core::{CadHandle, DirectCall, FeatureDescriptor, HandleFactory};
use crate::error::{Result, RouterError};
use crate::operation::OperationRequest;
use crate::resilience::RetryConfig;

/// The native call surface, mocked where a test needs exact call counts
#[automock]
pub trait Bridge: Send + Sync {
    fn invoke(&self, method: &str, arity: usize) -> Result<Option<FeatureDescriptor>>;
}

/// What a script run saw when it was executed
#[derive(Debug, Clone)]
pub struct ScriptRun {
    pub path: PathBuf,
    pub module: String,
    pub procedure: String,
    pub text: Option<String>,
}

/// Scriptable in-memory handle
pub struct FakeHandle {
    id: String,
    bridge: Option<MockBridge>,
    invoke_results: Mutex<VecDeque<Result<Option<FeatureDescriptor>>>>,
    script_results: Mutex<VecDeque<Result<bool>>>,
    last: Mutex<Option<FeatureDescriptor>>,
    fail_disconnect: bool,
    pub calls: Mutex<Vec<DirectCall>>,
    pub scripts: Mutex<Vec<ScriptRun>>,
    pub disconnects: AtomicUsize,
}

impl FakeHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bridge: None,
            invoke_results: Mutex::new(VecDeque::new()),
            script_results: Mutex::new(VecDeque::new()),
            last: Mutex::new(Some(FeatureDescriptor::new("Script-Feature1", "Script"))),
            fail_disconnect: false,
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(Vec::new()),
            disconnects: AtomicUsize::new(0),
        }
    }

    pub fn with_bridge(mut self, bridge: MockBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn failing_disconnect(mut self) -> Self {
        self.fail_disconnect = true;
        self
    }

    /// Queue the outcome of the next direct call
    pub fn push_invoke(&self, result: Result<Option<FeatureDescriptor>>) {
        self.invoke_results.lock().unwrap().push_back(result);
    }

    /// Queue the outcome of the next script run
    pub fn push_script(&self, result: Result<bool>) {
        self.script_results.lock().unwrap().push_back(result);
    }

    pub fn set_last_feature(&self, feature: Option<FeatureDescriptor>) {
        *self.last.lock().unwrap() = feature;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn script_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CadHandle for FakeHandle {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(&self, call: &DirectCall) -> Result<Option<FeatureDescriptor>> {
        let count = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call.clone());
            calls.len()
        };
        if let Some(bridge) = &self.bridge {
            return bridge.invoke(&call.method, call.arity());
        }
        let queued = self.invoke_results.lock().unwrap().pop_front();
        queued.unwrap_or_else(|| {
            Ok(Some(FeatureDescriptor::new(
                format!("{}{}", call.method, count),
                "Feature",
            )))
        })
    }

    async fn run_script(&self, path: &Path, module: &str, procedure: &str) -> Result<bool> {
        self.scripts.lock().unwrap().push(ScriptRun {
            path: path.to_path_buf(),
            module: module.to_string(),
            procedure: procedure.to_string(),
            text: std::fs::read_to_string(path).ok(),
        });
        let queued = self.script_results.lock().unwrap().pop_front();
        queued.unwrap_or(Ok(true))
    }

    async fn last_feature(&self) -> Result<Option<FeatureDescriptor>> {
        Ok(self.last.lock().unwrap().clone())
    }

    async fn disconnect(&self) -> Result<()> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_disconnect {
            Err(RouterError::connection(format!("{} did not close", self.id)))
        } else {
            Ok(())
        }
    }
}

/// Factory producing `handle-1`, `handle-2`, ...
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<Arc<FakeHandle>>>,
    failures: AtomicUsize,
    delay: Option<Duration>,
    shared_id: Option<String>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` creations
    pub fn failing(count: usize) -> Self {
        Self {
            failures: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Give every created handle the same id
    pub fn with_shared_id(id: impl Into<String>) -> Self {
        Self {
            shared_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<Arc<FakeHandle>> {
        self.created.lock().unwrap().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }
}

#[async_trait]
impl HandleFactory for FakeFactory {
    async fn create(&self) -> Result<Arc<dyn CadHandle>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(RouterError::Other(anyhow::anyhow!("application did not start")));
        }

        let mut created = self.created.lock().unwrap();
        let id = match &self.shared_id {
            Some(id) => id.clone(),
            None => format!("handle-{}", created.len() + 1),
        };
        let handle = Arc::new(FakeHandle::new(id));
        created.push(Arc::clone(&handle));
        Ok(handle)
    }
}

/// Retry budget with near-zero delays
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        base_delay: Duration::from_millis(1),
    }
}

/// Extrude with 6 slots, routed direct
pub fn simple_extrude() -> OperationRequest {
    OperationRequest::new("extrude")
        .with("depth", 25.0)
        .with("sketch", "Sketch1")
}

/// Extrude with 12 slots, routed hybrid
pub fn wide_extrude() -> OperationRequest {
    simple_extrude()
        .with("bothDirections", true)
        .with("depth2", 10.0)
        .with("thinFeature", true)
        .with("thinThickness", 2.0)
}

/// Sweep, always routed to script
pub fn sweep() -> OperationRequest {
    OperationRequest::new("sweep")
        .with("profile", "Sketch1")
        .with("path", "Sketch2")
}
