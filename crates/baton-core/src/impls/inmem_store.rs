//! InMemoryDocumentStore - development and test document store.
//!
//! Blobs live in a `Vec` behind a `Mutex`, in creation order, with ids
//! counting up from 1. Besides the `DocumentStore` port it offers synchronous
//! helpers so tests can play "another writer" from inside clock hooks, and
//! one-shot failure injection for transport error paths.

use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::ports::{Blob, BlobId, DocumentStore, StoreError};

#[derive(Default)]
struct State {
    blobs: Vec<Blob>,
    next_id: u64,
    fail_next: Option<StoreError>,
}

#[derive(Default)]
pub struct InMemoryDocumentStore {
    state: Mutex<State>,
    creates: AtomicUsize,
    overwrites: AtomicUsize,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Other(format!("store mutex poisoned: {e}")))
    }

    /// Fails the next port call (any operation) with `error`.
    pub fn fail_next(&self, error: StoreError) {
        if let Ok(mut state) = self.lock() {
            state.fail_next = Some(error);
        }
    }

    /// Adds a blob directly, bypassing the port and its counters.
    pub fn insert(&self, body: impl Into<String>) -> BlobId {
        let body = body.into();
        match self.lock() {
            Ok(mut state) => push_blob(&mut state, body).id,
            Err(_) => BlobId::new(0),
        }
    }

    /// Replaces a body directly. Returns false for unknown ids.
    pub fn set_body(&self, id: BlobId, body: impl Into<String>) -> bool {
        let Ok(mut state) = self.lock() else {
            return false;
        };
        match state.blobs.iter_mut().find(|b| b.id == id) {
            Some(blob) => {
                blob.body = body.into();
                true
            }
            None => false,
        }
    }

    pub fn body(&self, id: BlobId) -> Option<String> {
        let state = self.lock().ok()?;
        state.blobs.iter().find(|b| b.id == id).map(|b| b.body.clone())
    }

    pub fn blobs(&self) -> Vec<Blob> {
        self.lock().map(|s| s.blobs.clone()).unwrap_or_default()
    }

    /// Creates through the port.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Overwrites through the port.
    pub fn overwrite_count(&self) -> usize {
        self.overwrites.load(Ordering::SeqCst)
    }

    fn take_failure(state: &mut State) -> Result<(), StoreError> {
        match state.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn push_blob(state: &mut State, body: String) -> Blob {
    state.next_id += 1;
    let blob = Blob::new(BlobId::new(state.next_id), body);
    state.blobs.push(blob.clone());
    blob
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn list(&self) -> Result<Vec<Blob>, StoreError> {
        let mut state = self.lock()?;
        Self::take_failure(&mut state)?;
        Ok(state.blobs.clone())
    }

    async fn create(&self, body: &str) -> Result<Blob, StoreError> {
        let mut state = self.lock()?;
        Self::take_failure(&mut state)?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(push_blob(&mut state, body.to_string()))
    }

    async fn read(&self, id: BlobId) -> Result<Blob, StoreError> {
        let mut state = self.lock()?;
        Self::take_failure(&mut state)?;
        state
            .blobs
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn overwrite(&self, id: BlobId, body: &str) -> Result<Blob, StoreError> {
        let mut state = self.lock()?;
        Self::take_failure(&mut state)?;
        let blob = state
            .blobs
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(StoreError::NotFound(id))?;
        blob.body = body.to_string();
        self.overwrites.fetch_add(1, Ordering::SeqCst);
        Ok(blob.clone())
    }
}
