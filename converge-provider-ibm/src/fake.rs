//! In-memory cloud client for tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use crate::client::{ClientError, ClientResult, CloudClient};

type Reply = ClientResult<Option<JsonValue>>;

/// Replays scripted `get` replies per identifier, repeating the last one
#[derive(Default)]
pub struct FakeClient {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    next_id: Mutex<u32>,
    calls: Mutex<Vec<String>>,
    delete_error: Mutex<Option<ClientError>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: &str, replies: Vec<Reply>) {
        self.replies
            .lock()
            .unwrap()
            .insert(id.to_string(), replies.into());
    }

    pub fn fail_delete(&self, err: ClientError) {
        *self.delete_error.lock().unwrap() = Some(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn get_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("get "))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

/// A resource body with the given status field
pub fn body(id: &str, status: &str) -> JsonValue {
    json!({"id": id, "status": status})
}

#[async_trait]
impl CloudClient for FakeClient {
    async fn get(&self, path: &str, id: &str) -> ClientResult<Option<JsonValue>> {
        self.record(format!("get {}/{}", path, id));
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(id) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Ok(None),
        }
    }

    async fn create(&self, path: &str, mut body: JsonValue) -> ClientResult<JsonValue> {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        let id = format!("r-{}", next);
        self.record(format!("create {}/{}", path, id));
        body["id"] = json!(id);
        Ok(body)
    }

    async fn update(&self, path: &str, id: &str, patch: JsonValue) -> ClientResult<JsonValue> {
        self.record(format!("update {}/{}", path, id));
        Ok(patch)
    }

    async fn delete(&self, path: &str, id: &str) -> ClientResult<()> {
        self.record(format!("delete {}/{}", path, id));
        match self.delete_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
