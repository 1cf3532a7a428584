//! In-memory asset fetcher for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use runtime::BoxFuture;
use tokio::sync::Semaphore;

use crate::fetch::{AssetFetcher, FetchError};

/// Serves registered assets (anything else answers with the location's own
/// bytes), records every call, and can fail or hold back chosen locations.
#[derive(Default)]
pub struct MemoryFetcher {
    assets: Mutex<BTreeMap<String, Bytes>>,
    failing: Mutex<BTreeSet<String>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch waits for one permit from `gate` before completing.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_asset(self, location: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.insert(location, body);
        self
    }

    pub fn insert(&self, location: impl Into<String>, body: impl Into<Bytes>) {
        self.assets.lock().insert(location.into(), body.into());
    }

    pub fn fail(&self, location: impl Into<String>) {
        self.failing.lock().insert(location.into());
    }

    pub fn recover(&self, location: &str) {
        self.failing.lock().remove(location);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, location: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == location).count()
    }

    fn respond(&self, location: &str) -> Result<Bytes, FetchError> {
        if self.failing.lock().contains(location) {
            return Err(FetchError::Transport {
                location: location.to_string(),
                message: "connection reset".to_string(),
            });
        }
        if let Some(body) = self.assets.lock().get(location) {
            return Ok(body.clone());
        }
        Ok(Bytes::from(location.as_bytes().to_vec()))
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Bytes, FetchError>> {
        self.calls.lock().push(location.to_string());
        let result = self.respond(location);
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            result
        })
    }
}
