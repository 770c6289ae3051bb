//! Test doubles for the sink and backend capabilities.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chat_relay_core::{Backend, BackendError, EventSink, SinkError, WebhookRequest};
use serde_json::Value;
use tokio::sync::Notify;

/// Sink that records every frame written to it.
#[derive(Default)]
pub struct CapturingSink {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_close: bool,
    accept: Option<usize>,
}

impl CapturingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_close() -> Arc<Self> {
        Arc::new(Self {
            fail_close: true,
            ..Self::default()
        })
    }

    /// Sink that accepts `count` frames, then reports itself closed.
    pub fn closing_after(count: usize) -> Arc<Self> {
        Arc::new(Self {
            accept: Some(count),
            ..Self::default()
        })
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSink for CapturingSink {
    async fn write_frame(&self, frame: String) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        let mut frames = self.frames.lock().unwrap();
        if self.accept.is_some_and(|limit| frames.len() >= limit) {
            self.closed.store(true, Ordering::SeqCst);
            return Err(SinkError::Closed);
        }
        frames.push(frame);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close {
            return Err(SinkError::Internal("close failed".to_string()));
        }
        Ok(())
    }
}

/// Backend that replays scripted responses and records requests.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<Value, BackendError>>>,
    requests: Mutex<Vec<WebhookRequest>>,
    calls: AtomicUsize,
    gate: Option<Arc<Gate>>,
}

/// Holds a backend call open until the test lets it finish.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until a call has reached the backend.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one held call return.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl ScriptedBackend {
    pub fn replying(response: Value) -> Self {
        let backend = Self::default();
        backend.push(Ok(response));
        backend
    }

    pub fn failing(error: BackendError) -> Self {
        let backend = Self::default();
        backend.push(Err(error));
        backend
    }

    /// Backend whose calls block on the returned gate.
    pub fn gated() -> (Self, Arc<Gate>) {
        let gate = Arc::new(Gate::default());
        let backend = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (backend, gate)
    }

    pub fn push(&self, response: Result<Value, BackendError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<WebhookRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn post(&self, request: &WebhookRequest) -> Result<Value, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("no scripted response".to_string())))
    }
}
