use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parent node details handed to a child task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentContext {
    pub id: String,
    pub description: String,
    pub result: Option<Value>,
}

/// Everything a task runner gets to see besides the node itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    pub session_id: String,
    /// 1-based index of the phase the task runs in.
    pub phase_id: usize,
    /// The node's own producer-supplied metadata.
    pub metadata: Map<String, Value>,
    /// Results of the node's dependencies, keyed by dependency id.
    pub dependency_results: BTreeMap<String, Value>,
    pub parent: Option<ParentContext>,
}

impl TaskContext {
    /// Flat map view: `metadata`, `dependency_results` and the
    /// `parent_id` / `parent_description` / `parent_result` entries.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("session_id".into(), Value::String(self.session_id.clone()));
        map.insert("phase_id".into(), Value::from(self.phase_id));
        map.insert("metadata".into(), Value::Object(self.metadata.clone()));
        map.insert(
            "dependency_results".into(),
            Value::Object(
                self.dependency_results
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            ),
        );

        if let Some(parent) = &self.parent {
            map.insert("parent_id".into(), Value::String(parent.id.clone()));
            map.insert(
                "parent_description".into(),
                Value::String(parent.description.clone()),
            );
            map.insert(
                "parent_result".into(),
                parent.result.clone().unwrap_or(Value::Null),
            );
        }

        map
    }
}
