//! Scripted in-memory remote that records probes and uploads.

use super::{ProbeResponse, RemoteStore, UploadTarget};
use crate::{MigrationError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// An object held by the mock remote
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
}

/// Internal state for MemoryRemoteStore.
#[derive(Default)]
struct MemoryRemoteState {
    /// remote_name -> object
    objects: HashMap<String, StoredObject>,
    /// Statuses handed out by the next uploads; 2xx stores the object
    upload_statuses: VecDeque<u16>,
    /// Remaining probes that fail at the transport level
    probe_failures: u32,
    /// Remaining uploads that fail at the transport level
    upload_failures: u32,
    probes: usize,
    /// remote_name of every upload call, in order
    uploads: Vec<String>,
}

/// In-memory remote store with scripted responses.
///
/// Clones share state.
#[derive(Clone, Default)]
pub struct MemoryRemoteStore {
    state: Arc<Mutex<MemoryRemoteState>>,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an object that already exists on the remote
    pub fn insert(&self, remote_name: impl Into<String>, body: impl Into<Bytes>) {
        self.lock().objects.insert(
            remote_name.into(),
            StoredObject {
                body: body.into(),
                content_type: None,
            },
        );
    }

    /// Seed an object of `len` filler bytes
    pub fn insert_sized(&self, remote_name: impl Into<String>, len: usize) {
        self.insert(remote_name, vec![0u8; len]);
    }

    /// Queue statuses for the next upload calls; once drained uploads answer 201
    pub fn script_upload_statuses(&self, statuses: impl IntoIterator<Item = u16>) {
        self.lock().upload_statuses.extend(statuses);
    }

    /// Make the next `times` probes fail with a transport error
    pub fn fail_probes(&self, times: u32) {
        self.lock().probe_failures = times;
    }

    /// Make the next `times` uploads fail with a transport error
    pub fn fail_uploads(&self, times: u32) {
        self.lock().upload_failures = times;
    }

    pub fn object(&self, remote_name: &str) -> Option<StoredObject> {
        self.lock().objects.get(remote_name).cloned()
    }

    pub fn contains(&self, remote_name: &str) -> bool {
        self.lock().objects.contains_key(remote_name)
    }

    pub fn probe_count(&self) -> usize {
        self.lock().probes
    }

    pub fn upload_count(&self) -> usize {
        self.lock().uploads.len()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn probe(&self, target: &UploadTarget) -> Result<ProbeResponse> {
        let mut state = self.lock();
        state.probes += 1;

        if state.probe_failures > 0 {
            state.probe_failures -= 1;
            return Err(MigrationError::Transport("injected probe failure".to_string()));
        }

        Ok(match state.objects.get(target.remote_name()) {
            Some(object) => ProbeResponse::found(object.body.len() as u64),
            None => ProbeResponse::not_found(),
        })
    }

    async fn upload(&self, target: &UploadTarget, body: Bytes) -> Result<u16> {
        let mut state = self.lock();
        state.uploads.push(target.remote_name().to_string());

        if state.upload_failures > 0 {
            state.upload_failures -= 1;
            return Err(MigrationError::Transport("injected upload failure".to_string()));
        }

        let status = state.upload_statuses.pop_front().unwrap_or(201);
        if (200..=299).contains(&status) {
            state.objects.insert(
                target.remote_name().to_string(),
                StoredObject {
                    body,
                    content_type: Some(target.content_type().to_string()),
                },
            );
        }

        Ok(status)
    }
}
