//! Domain types
//!
//! Task records as they move through the breakdown rounds, and the
//! consolidated graph that ends up in the reply.

mod task;

pub use task::{ConsolidatedTask, NAME_FIELD, Task, TaskGraph, TaskSet, stub_id, subtask_id};
