//! Scriptable backend for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::memory::parse_bulk_entries;
use super::traits::{BackendError, BulkResponse, SearchBackend, UpdateRequest, WriteAck};
use crate::batching::operation::OpKind;
use crate::search::{SearchRequest, SearchResponse};

/// How the mock answers a bulk call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMode {
    /// One successful item per operation
    Echo,
    /// Echo, minus the last `n` items
    DropLast(usize),
    /// Transport failure
    Fail,
}

pub struct MockBackend {
    pub bulk_mode: Mutex<BulkMode>,
    pub bulk_delay: Mutex<Duration>,
    /// Ids seen per bulk call, in call order
    pub bulk_calls: Mutex<Vec<Vec<String>>>,
    pub exists: Mutex<bool>,
    pub create_delay: Mutex<Duration>,
    pub create_fails: Mutex<bool>,
    pub create_calls: AtomicUsize,
    pub exists_calls: AtomicUsize,
    /// (index, type_name, body) per put_mapping call
    pub mappings: Mutex<Vec<(String, String, Value)>>,
    /// Scripted delete outcomes; an empty script acknowledges the delete
    pub delete_script: Mutex<VecDeque<Result<(), BackendError>>>,
    pub delete_calls: AtomicUsize,
    pub updates: Mutex<Vec<UpdateRequest>>,
    pub search_response: Mutex<Option<SearchResponse>>,
    pub searches: Mutex<Vec<SearchRequest>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            bulk_mode: Mutex::new(BulkMode::Echo),
            bulk_delay: Mutex::new(Duration::ZERO),
            bulk_calls: Mutex::new(Vec::new()),
            exists: Mutex::new(false),
            create_delay: Mutex::new(Duration::ZERO),
            create_fails: Mutex::new(false),
            create_calls: AtomicUsize::new(0),
            exists_calls: AtomicUsize::new(0),
            mappings: Mutex::new(Vec::new()),
            delete_script: Mutex::new(VecDeque::new()),
            delete_calls: AtomicUsize::new(0),
            updates: Mutex::new(Vec::new()),
            search_response: Mutex::new(None),
            searches: Mutex::new(Vec::new()),
        }
    }

    pub fn bulk_call_count(&self) -> usize {
        self.bulk_calls.lock().len()
    }

    pub fn total_bulk_ops(&self) -> usize {
        self.bulk_calls.lock().iter().map(Vec::len).sum()
    }
}

#[async_trait]
impl SearchBackend for MockBackend {
    async fn index_exists(&self, _index: &str) -> Result<bool, BackendError> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Ok(*self.exists.lock())
    }

    async fn create_index(&self, _index: &str, _settings: Option<&Value>) -> Result<(), BackendError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.create_delay.lock();
        tokio::time::sleep(delay).await;
        if *self.create_fails.lock() {
            return Err(BackendError::Transport("index creation refused".into()));
        }
        *self.exists.lock() = true;
        Ok(())
    }

    async fn put_mapping(&self, index: &str, type_name: &str, body: &Value) -> Result<(), BackendError> {
        self.mappings
            .lock()
            .push((index.to_string(), type_name.to_string(), body.clone()));
        Ok(())
    }

    async fn bulk(&self, entries: &[Value]) -> Result<BulkResponse, BackendError> {
        let actions = parse_bulk_entries(entries)?;
        self.bulk_calls
            .lock()
            .push(actions.iter().map(|a| a.id.clone()).collect());

        let delay = *self.bulk_delay.lock();
        tokio::time::sleep(delay).await;

        let mut items: Vec<WriteAck> = actions
            .iter()
            .map(|a| WriteAck::ok(a.kind, a.id.clone(), "updated"))
            .collect();
        match *self.bulk_mode.lock() {
            BulkMode::Echo => {}
            BulkMode::DropLast(n) => items.truncate(items.len().saturating_sub(n)),
            BulkMode::Fail => return Err(BackendError::Transport("bulk endpoint unavailable".into())),
        }
        Ok(BulkResponse { took: 1, errors: false, items })
    }

    async fn update(&self, request: &UpdateRequest) -> Result<WriteAck, BackendError> {
        self.updates.lock().push(request.clone());
        Ok(WriteAck::ok(OpKind::Update, request.id.clone(), "updated"))
    }

    async fn delete(&self, _index: &str, _type_name: &str, id: &str) -> Result<WriteAck, BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.delete_script.lock().pop_front();
        match scripted {
            Some(Err(e)) => Err(e),
            Some(Ok(())) | None => Ok(WriteAck::ok(OpKind::Delete, id, "deleted")),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, BackendError> {
        self.searches.lock().push(request.clone());
        Ok(self.search_response.lock().clone().unwrap_or_default())
    }

    async fn count(&self, _index: &str, _type_name: &str, _body: &Value) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn refresh(&self, _index: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn delete_by_query(&self, _index: &str, _type_name: &str, _body: &Value) -> Result<u64, BackendError> {
        Ok(0)
    }
}
