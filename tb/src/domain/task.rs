//! Task and TaskSet
//!
//! A TaskSet is built fresh for each turn: round-1 stubs keyed `tasks-{i}`,
//! the sub-expansion working set keyed `{parent}-subtasks-{i}`, and finally
//! the consolidated tasks keyed by their model-assigned integer id.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Key of the task-name field in every model payload
pub const NAME_FIELD: &str = "name_of_the_task";

/// Positional id of a round-1 stub
pub fn stub_id(index: usize) -> String {
    format!("tasks-{}", index)
}

/// Id of the `index`-th sub-task of `parent`
pub fn subtask_id(parent: &str, index: usize) -> String {
    format!("{}-subtasks-{}", parent, index)
}

/// A unit of work at any stage of the breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<u64>,
}

impl Task {
    /// Name-only stub
    pub fn stub(task_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            name: name.into(),
            description: None,
            dependencies: Vec::new(),
            estimated_hours: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_estimate(mut self, hours: u64) -> Self {
        self.estimated_hours = Some(hours);
        self
    }
}

/// Ordered task_id -> Task mapping
///
/// Iteration follows first insertion; inserting an existing id replaces the
/// task in place without moving it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSet {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task, returning the one it replaced
    pub fn insert(&mut self, task: Task) -> Option<Task> {
        match self.index.get(&task.task_id) {
            Some(&pos) => {
                debug!(task_id = %task.task_id, "TaskSet::insert: replacing existing task");
                Some(std::mem::replace(&mut self.tasks[pos], task))
            }
            None => {
                self.index.insert(task.task_id.clone(), self.tasks.len());
                self.tasks.push(task);
                None
            }
        }
    }

    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.index.get(task_id).map(|&pos| &self.tasks[pos])
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.index.contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.tasks.iter().map(|t| t.task_id.as_str())
    }

    /// task_id -> name, the shape handed to the consolidation prompt
    pub fn names(&self) -> serde_json::Map<String, serde_json::Value> {
        self.tasks
            .iter()
            .map(|t| (t.task_id.clone(), serde_json::Value::String(t.name.clone())))
            .collect()
    }

    /// (task_id, missing dependency) pairs, in task order
    pub fn dangling_dependencies(&self) -> Vec<(String, String)> {
        self.tasks
            .iter()
            .flat_map(|t| {
                t.dependencies
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(|dep| (t.task_id.clone(), dep.clone()))
            })
            .collect()
    }
}

impl FromIterator<Task> for TaskSet {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut set = TaskSet::new();
        for task in iter {
            set.insert(task);
        }
        set
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = &'a Task;
    type IntoIter = std::slice::Iter<'a, Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

/// One task of the user-visible reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedTask {
    pub id: u64,
    pub name_of_the_task: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<u64>,
    #[serde(default)]
    pub estimation: Option<u64>,
}

/// The consolidated reply: `{"tasks": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub tasks: Vec<ConsolidatedTask>,
}

impl TaskGraph {
    /// Drop self-references and references to ids not in the graph
    ///
    /// Returns the removed (task id, dependency id) pairs.
    pub fn repair_dependencies(&mut self) -> Vec<(u64, u64)> {
        let known: BTreeMap<u64, ()> = self.tasks.iter().map(|t| (t.id, ())).collect();
        let mut removed = Vec::new();
        for task in &mut self.tasks {
            let id = task.id;
            task.dependencies.retain(|dep| {
                let keep = *dep != id && known.contains_key(dep);
                if !keep {
                    removed.push((id, *dep));
                }
                keep
            });
            let mut seen = Vec::with_capacity(task.dependencies.len());
            task.dependencies.retain(|dep| {
                if seen.contains(dep) {
                    false
                } else {
                    seen.push(*dep);
                    true
                }
            });
        }
        removed
    }

    /// Sum of all estimates, ignoring tasks without one
    pub fn total_hours(&self) -> u64 {
        self.tasks.iter().filter_map(|t| t.estimation).sum()
    }

    /// Pretty JSON with 4-space indentation
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever writes valid UTF-8
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// View as a TaskSet keyed by the stringified ids
    pub fn to_task_set(&self) -> TaskSet {
        self.tasks
            .iter()
            .map(|t| {
                let mut task = Task::stub(t.id.to_string(), t.name_of_the_task.clone())
                    .with_dependencies(t.dependencies.iter().map(u64::to_string).collect());
                if !t.description.is_empty() {
                    task = task.with_description(t.description.clone());
                }
                if let Some(hours) = t.estimation {
                    task = task.with_estimate(hours);
                }
                task
            })
            .collect()
    }
}
