//! Scripted stand-ins for the TV and the wake primitive.

use crate::error::{BridgeError, Result};
use crate::gateway::{DeviceRequest, Method, Transport};
use crate::wake::{MacAddress, WakeSignal};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// A fake TV: canned `GET` bodies per endpoint, a log of every request.
#[derive(Default)]
pub struct StubTransport {
    replies: Mutex<HashMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    failing_writes: Mutex<HashSet<String>>,
    calls: Mutex<Vec<DeviceRequest>>,
    latency: Mutex<Option<Duration>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `GET endpoint` with `body`.
    pub fn reply(&self, endpoint: &str, body: &str) {
        self.failing.lock().remove(endpoint);
        self.replies
            .lock()
            .insert(endpoint.to_string(), body.to_string());
    }

    /// Make every call to `endpoint` fail as unreachable.
    pub fn fail(&self, endpoint: &str) {
        self.failing.lock().insert(endpoint.to_string());
    }

    /// Make `POST endpoint` fail as unreachable.
    pub fn fail_writes(&self, endpoint: &str) {
        self.failing_writes.lock().insert(endpoint.to_string());
    }

    /// Delay every reply, so concurrent callers overlap.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    pub fn count(&self, method: Method, endpoint: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.method == method && r.endpoint == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Every body posted to `endpoint`, oldest first.
    pub fn posts(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.method == Method::Post && r.endpoint == endpoint)
            .filter_map(|r| r.body.as_deref())
            .filter_map(|b| serde_json::from_str(b).ok())
            .collect()
    }

    pub fn last_body(&self, endpoint: &str) -> Option<Value> {
        self.posts(endpoint).pop()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: DeviceRequest) -> Result<String> {
        self.calls.lock().push(request.clone());

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.lock().contains(&request.endpoint)
            || (request.method == Method::Post
                && self.failing_writes.lock().contains(&request.endpoint))
        {
            return Err(BridgeError::Transport(format!(
                "{} unreachable",
                request.endpoint
            )));
        }

        match request.method {
            Method::Get => self
                .replies
                .lock()
                .get(&request.endpoint)
                .cloned()
                .ok_or_else(|| BridgeError::HttpStatus {
                    endpoint: request.endpoint.clone(),
                    status: 404,
                }),
            Method::Post => Ok(String::new()),
        }
    }
}

/// Counts wake signals instead of putting packets on the network.
#[derive(Default)]
pub struct StubWake {
    sent: AtomicUsize,
    fail: AtomicBool,
}

impl StubWake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let wake = Self::default();
        wake.fail.store(true, Ordering::SeqCst);
        wake
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WakeSignal for StubWake {
    async fn send(&self, _mac: &MacAddress) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::Wake("network is unreachable".into()));
        }
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
