use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ExecutorError;

use super::id::{hierarchical_cmp, parent_of};
use super::node::TaskNode;
use super::tree::{ExecutionStrategy, TaskTree};

fn default_estimate() -> f64 {
    60.0
}

/// Flat description of one task, as a graph producer emits it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_estimate")]
    pub estimated_duration: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            estimated_duration: default_estimate(),
            metadata: Map::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn estimate(mut self, seconds: f64) -> Self {
        self.estimated_duration = seconds;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Builds a [`TaskTree`] from flat specs, deriving the hierarchy from ids.
///
/// `"2.1"` becomes a child of `"2"` when `"2"` exists; top-level ids and
/// orphans hang directly off the root.
#[derive(Debug, Clone)]
pub struct TaskTreeBuilder {
    session_id: String,
    user_request: String,
    root_id: String,
    root_description: String,
    strategy: ExecutionStrategy,
    specs: Vec<TaskSpec>,
}

impl TaskTreeBuilder {
    pub fn new(session_id: impl Into<String>, user_request: impl Into<String>) -> Self {
        let user_request = user_request.into();
        Self {
            session_id: session_id.into(),
            root_description: user_request.clone(),
            user_request,
            root_id: "0".to_string(),
            strategy: ExecutionStrategy::default(),
            specs: Vec::new(),
        }
    }

    pub fn root(mut self, id: impl Into<String>, description: impl Into<String>) -> Self {
        self.root_id = id.into();
        self.root_description = description.into();
        self
    }

    pub fn strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn task(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn tasks(mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    /// Assemble and validate the tree.
    pub fn build(mut self) -> Result<TaskTree, ExecutorError> {
        self.specs.sort_by(|a, b| hierarchical_cmp(&a.id, &b.id));

        let root = TaskNode::new(self.root_id.as_str(), self.root_description, 1.0);
        let mut tree = TaskTree::new(self.session_id, self.user_request, root)
            .with_strategy(self.strategy);

        for spec in self.specs {
            let (parent, parent_depth) = match parent_of(&spec.id).and_then(|p| tree.get(p)) {
                Some(parent) => (parent.id.clone(), parent.depth),
                None => (tree.root_id().to_string(), 0),
            };

            let mut node = TaskNode::new(spec.id, spec.description, spec.estimated_duration)
                .with_parent(parent, parent_depth)
                .with_dependencies(spec.dependencies);
            node.metadata = spec.metadata;
            tree.insert(node)?;
        }

        tree.validate()?;
        Ok(tree)
    }
}
