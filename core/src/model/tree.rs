use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

use super::id::hierarchical_cmp;
use super::node::TaskNode;

/// Tree-level concurrency hint used when laying out phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    Sequential,
    Parallel,
    #[default]
    Hybrid,
}

/// Full task hierarchy for one execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTree {
    /// Opaque id, unique per execution attempt.
    pub session_id: String,
    pub user_request: String,
    #[serde(default)]
    pub strategy: ExecutionStrategy,
    root: TaskNode,
    nodes: HashMap<String, TaskNode>,
    total_estimated_duration: f64,
    created_at: DateTime<Utc>,
}

impl TaskTree {
    pub fn new(
        session_id: impl Into<String>,
        user_request: impl Into<String>,
        mut root: TaskNode,
    ) -> Self {
        root.parent_id = None;
        root.depth = 0;
        let total_estimated_duration = root.estimated_duration;

        Self {
            session_id: session_id.into(),
            user_request: user_request.into(),
            strategy: ExecutionStrategy::default(),
            root,
            nodes: HashMap::new(),
            total_estimated_duration,
            created_at: Utc::now(),
        }
    }

    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Add a non-root node. Ids must be unique across the tree, root included.
    ///
    /// A node without a parent is attached directly under the root.
    pub fn insert(&mut self, mut node: TaskNode) -> Result<(), ExecutorError> {
        if node.id == self.root.id || self.nodes.contains_key(&node.id) {
            return Err(ExecutorError::DuplicateTaskId(node.id));
        }
        if node.parent_id.is_none() {
            node.parent_id = Some(self.root.id.clone());
            node.depth = 1;
        }
        self.total_estimated_duration += node.estimated_duration;
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    pub fn root(&self) -> &TaskNode {
        &self.root
    }

    pub fn root_id(&self) -> &str {
        &self.root.id
    }

    pub fn is_root(&self, id: &str) -> bool {
        id == self.root.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn total_estimated_duration(&self) -> f64 {
        self.total_estimated_duration
    }

    /// Look up any node, root included.
    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        if id == self.root.id {
            Some(&self.root)
        } else {
            self.nodes.get(id)
        }
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TaskNode> {
        if id == self.root.id {
            Some(&mut self.root)
        } else {
            self.nodes.get_mut(id)
        }
    }

    pub(crate) fn root_mut(&mut self) -> &mut TaskNode {
        &mut self.root
    }

    pub(crate) fn tasks_mut(&mut self) -> impl Iterator<Item = &mut TaskNode> {
        self.nodes.values_mut()
    }

    pub fn contains(&self, id: &str) -> bool {
        id == self.root.id || self.nodes.contains_key(id)
    }

    /// Number of nodes including the root.
    pub fn node_count(&self) -> usize {
        self.nodes.len() + 1
    }

    /// Number of non-root nodes.
    pub fn task_count(&self) -> usize {
        self.nodes.len()
    }

    /// Non-root nodes in hierarchical id order.
    pub fn tasks(&self) -> Vec<&TaskNode> {
        let mut tasks: Vec<&TaskNode> = self.nodes.values().collect();
        tasks.sort_by(|a, b| hierarchical_cmp(&a.id, &b.id));
        tasks
    }

    /// Root first, then every other node in hierarchical id order.
    pub fn all_nodes(&self) -> Vec<&TaskNode> {
        let mut all = Vec::with_capacity(self.node_count());
        all.push(&self.root);
        all.extend(self.tasks());
        all
    }

    pub fn children_of(&self, id: &str) -> Vec<&TaskNode> {
        self.tasks()
            .into_iter()
            .filter(|node| node.parent_id.as_deref() == Some(id))
            .collect()
    }

    /// Check reference validity and acyclicity of the dependency relation.
    ///
    /// Dependencies and parents must resolve to the root or another node of
    /// this tree; ids from any other tree count as dangling.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        for node in self.tasks() {
            let resolved = node.parent_id.as_deref().is_some_and(|p| self.contains(p));
            if !resolved {
                return Err(ExecutorError::ParentNotFound {
                    task_id: node.id.clone(),
                    parent_id: node.parent_id.clone().unwrap_or_default(),
                });
            }
        }

        for node in self.all_nodes() {
            for dep in &node.dependencies {
                if dep == &node.id {
                    return Err(ExecutorError::SelfDependency(node.id.clone()));
                }
                if !self.contains(dep) {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: node.id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(ExecutorError::CircularDependency(cycle));
        }

        Ok(())
    }

    /// Depth-first search over dependency edges; returns the cycle as `a -> b -> a`.
    pub(crate) fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for node in self.all_nodes() {
            if !visited.contains(node.id.as_str())
                && self.dfs_cycle(&node.id, &mut visited, &mut stack)
            {
                return Some(stack.join(" -> "));
            }
        }

        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
    ) -> bool {
        visited.insert(id);
        stack.push(id);

        if let Some(node) = self.get(id) {
            for dep in &node.dependencies {
                if let Some(pos) = stack.iter().position(|x| *x == dep.as_str()) {
                    stack.push(dep.as_str());
                    stack.drain(..pos);
                    return true;
                }

                if !visited.contains(dep.as_str()) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStatus;

    fn tree() -> TaskTree {
        TaskTree::new("s-1", "ship the release", TaskNode::new("0", "release", 1.0))
    }

    #[test]
    fn test_insert_tracks_total_estimate() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 4.0).with_parent("0", 0))
            .unwrap();
        tree.insert(TaskNode::new("2", "test", 5.0).with_parent("0", 0))
            .unwrap();

        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.task_count(), 2);
        assert_eq!(tree.total_estimated_duration(), 10.0);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 1.0)).unwrap();

        let err = tree.insert(TaskNode::new("1", "again", 1.0)).unwrap_err();
        assert!(matches!(err, ExecutorError::DuplicateTaskId(id) if id == "1"));

        let err = tree.insert(TaskNode::new("0", "root clash", 1.0)).unwrap_err();
        assert!(matches!(err, ExecutorError::DuplicateTaskId(_)));
    }

    #[test]
    fn test_validate_reports_dangling_dependency() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 1.0).with_dependencies(["other-tree:7"]))
            .unwrap();

        let err = tree.validate().unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::DependencyNotFound { ref task_id, ref missing_dep }
                if task_id == "1" && missing_dep == "other-tree:7"
        ));
    }

    #[test]
    fn test_validate_reports_cycle_path() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "a", 1.0).with_dependencies(["2"]))
            .unwrap();
        tree.insert(TaskNode::new("2", "b", 1.0).with_dependencies(["1"]))
            .unwrap();

        match tree.validate() {
            Err(ExecutorError::CircularDependency(path)) => {
                assert!(path == "1 -> 2 -> 1" || path == "2 -> 1 -> 2", "{path}");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_self_dependency() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "a", 1.0).with_dependencies(["1"]))
            .unwrap();
        assert!(matches!(
            tree.validate(),
            Err(ExecutorError::SelfDependency(id)) if id == "1"
        ));
    }

    #[test]
    fn test_insert_attaches_orphans_to_root() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 1.0)).unwrap();

        let node = tree.get("1").unwrap();
        assert_eq!(node.parent_id.as_deref(), Some("0"));
        assert_eq!(node.depth, 1);
        assert!(!tree.is_root("1"));
        assert!(tree.is_root("0"));
        assert_eq!(tree.children_of("0").len(), 1);
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_dangling_parent() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 1.0).with_parent("nope", 0))
            .unwrap();

        let err = tree.validate().unwrap_err();
        assert!(err.is_planning_error());
        assert!(matches!(
            err,
            ExecutorError::ParentNotFound { ref task_id, ref parent_id }
                if task_id == "1" && parent_id == "nope"
        ));
    }

    #[test]
    fn test_validate_rejects_missing_parent() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "build", 1.0)).unwrap();
        tree.get_mut("1").unwrap().parent_id = None;

        assert!(matches!(
            tree.validate(),
            Err(ExecutorError::ParentNotFound { task_id, .. }) if task_id == "1"
        ));
    }

    #[test]
    fn test_root_dependency_is_valid() {
        let mut tree = tree();
        tree.insert(TaskNode::new("1", "a", 1.0).with_dependencies(["0"]))
            .unwrap();
        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_children_in_hierarchical_order() {
        let mut tree = tree();
        for id in ["2", "2.10", "2.9", "1"] {
            let node = TaskNode::new(id, id, 1.0);
            let node = match crate::model::id::parent_of(id) {
                Some(parent) => node.with_parent(parent, 1),
                None => node.with_parent("0", 0),
            };
            tree.insert(node).unwrap();
        }

        let children: Vec<&str> = tree.children_of("2").iter().map(|n| n.id.as_str()).collect();
        assert_eq!(children, vec!["2.9", "2.10"]);
        assert_eq!(tree.get("2.9").map(|n| n.status), Some(TaskStatus::Pending));
    }

    #[test]
    fn test_tree_json_round_trip() {
        let mut tree = tree().with_strategy(ExecutionStrategy::Parallel);
        tree.insert(TaskNode::new("1", "a", 2.0).with_metadata("phase", "prep"))
            .unwrap();

        let json = serde_json::to_string(&tree).unwrap();
        let restored: TaskTree = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, restored);
    }
}
