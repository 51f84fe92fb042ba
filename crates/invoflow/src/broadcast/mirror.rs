//! Realtime mirror of per-file status.
//!
//! The mirror is a best-effort JSON tree keyed by path
//! (`folders/{folder}/files/{file}`). Writers never see an error; changes are
//! published to subscribers as [`MirrorEvent`]s.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;

/// Fire-and-forget writes to the realtime tree.
pub trait RealtimeMirror: Send + Sync {
    /// Replaces the value at `path`.
    fn set(&self, path: &str, value: Value);

    /// Shallow-merges the object `partial` into the value at `path`.
    fn update(&self, path: &str, partial: Value);
}

/// Path of a file's node in the mirror tree.
pub fn file_path(folder_id: &str, file_id: &str) -> String {
    format!("folders/{}/files/{}", folder_id, file_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorOp {
    Set,
    Update,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorEvent {
    pub path: String,
    pub op: MirrorOp,
    /// The node's value after the write.
    pub value: Value,
    pub timestamp: DateTime<Utc>,
}

impl MirrorEvent {
    /// Whether the event concerns the given folder.
    pub fn is_for_folder(&self, folder_id: &str) -> bool {
        let prefix = format!("folders/{}", folder_id);
        self.path == prefix || self.path.starts_with(&format!("{}/", prefix))
    }
}

/// In-memory mirror that publishes every write on a broadcast channel.
#[derive(Clone)]
pub struct BroadcastMirror {
    tree: Arc<Mutex<Value>>,
    sender: Arc<broadcast::Sender<MirrorEvent>>,
}

impl BroadcastMirror {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            tree: Arc::new(Mutex::new(Value::Object(Map::new()))),
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MirrorEvent> {
        self.sender.subscribe()
    }

    /// Current value at `path`, if any.
    pub fn get(&self, path: &str) -> Option<Value> {
        let tree = self.tree.lock().ok()?;
        let mut node = &*tree;
        for segment in segments(path) {
            node = node.get(segment)?;
        }
        Some(node.clone())
    }

    /// Copy of the whole tree.
    pub fn snapshot(&self) -> Value {
        self.tree
            .lock()
            .map(|tree| tree.clone())
            .unwrap_or(Value::Null)
    }

    fn write(&self, path: &str, op: MirrorOp, value: Value) {
        let current = {
            let Ok(mut tree) = self.tree.lock() else {
                tracing::warn!(path, "Mirror tree lock poisoned, dropping write");
                return;
            };
            let node = node_mut(&mut tree, path);
            match op {
                MirrorOp::Set => *node = value,
                MirrorOp::Update => merge_shallow(node, value),
            }
            node.clone()
        };

        // no subscribers is fine
        let _ = self.sender.send(MirrorEvent {
            path: path.to_string(),
            op,
            value: current,
            timestamp: Utc::now(),
        });
    }
}

impl Default for BroadcastMirror {
    fn default() -> Self {
        Self::new(256)
    }
}

impl RealtimeMirror for BroadcastMirror {
    fn set(&self, path: &str, value: Value) {
        self.write(path, MirrorOp::Set, value);
    }

    fn update(&self, path: &str, partial: Value) {
        self.write(path, MirrorOp::Update, partial);
    }
}

/// Mirror for callers that do not need live updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMirror;

impl RealtimeMirror for NoopMirror {
    fn set(&self, _path: &str, _value: Value) {}

    fn update(&self, _path: &str, _partial: Value) {}
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Walks to `path`, creating (or replacing non-object) intermediate nodes.
fn node_mut<'a>(root: &'a mut Value, path: &str) -> &'a mut Value {
    let mut node = root;
    for segment in segments(path) {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = match node {
            Value::Object(map) => map.entry(segment.to_string()).or_insert(Value::Null),
            other => other,
        };
    }
    node
}

fn merge_shallow(target: &mut Value, partial: Value) {
    match (target, partial) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (k, v) in incoming {
                existing.insert(k, v);
            }
        }
        (target, partial) => *target = partial,
    }
}
