//! JSON extraction and validation
//!
//! Every piece of model output passes through here before it becomes a Task.
//! Parsing never fails loudly for stub lists: malformed input degrades to an
//! empty result and a log line. Only the consolidation envelope is strict,
//! because the reply it produces replaces the user's draft.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{ConsolidatedTask, NAME_FIELD, Task, TaskGraph, TaskSet, stub_id};

/// Fence wrapping the whole text
static WHOLE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*```[ \t]*(?P<lang>[A-Za-z0-9_+-]*)[ \t]*\r?\n?(?P<body>.*?)\r?\n?[ \t]*```\s*\z")
        .expect("whole-fence regex is valid")
});

/// First fenced block anywhere in the text
static INNER_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*(?P<lang>[A-Za-z0-9_+-]*)[ \t]*\r?\n(?P<body>.*?)\r?\n?[ \t]*```")
        .expect("inner-fence regex is valid")
});

/// Opening fence with no closing one (truncated output)
static OPEN_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*```[^\n]*\n(?P<body>.*)\z").expect("open-fence regex is valid")
});

/// Opening fence at the start of a reply
static LEADING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A\s*```[ \t]*(?P<lang>[A-Za-z0-9_+-]*)(?P<rest>.*)\z").expect("leading-fence regex is valid")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Invalid task shape: {0}")]
    InvalidTaskShape(String),

    #[error("Consolidation failed: {0}")]
    ConsolidationFailure(String),

    #[error("Empty or missing input")]
    EmptyOrMissingInput,
}

/// Remove a markdown code fence, returning the inner text
///
/// Tries a fence around the whole text, then the first fenced block inside
/// prose, then an unterminated opening fence. Unfenced text comes back trimmed.
/// A whole-text match whose body holds another fence spans several blocks, so
/// the first block wins instead.
pub fn strip_fences(output: &str) -> &str {
    let whole = WHOLE_FENCE
        .captures(output)
        .and_then(|c| c.name("body"))
        .filter(|body| !body.as_str().contains("```"));
    if let Some(body) = whole {
        return body.as_str().trim();
    }
    if let Some(body) = INNER_FENCE.captures(output).and_then(|c| c.name("body")) {
        debug!("strip_fences: using first fenced block inside prose");
        return body.as_str().trim();
    }
    if let Some(body) = OPEN_FENCE.captures(output).and_then(|c| c.name("body")) {
        debug!("strip_fences: unterminated fence");
        return body.as_str().trim();
    }
    output.trim()
}

/// Whether a reply opens with a JSON code fence
///
/// A `json` tag counts in any case; an untagged fence counts when its body
/// starts like JSON.
pub fn is_json_fenced(text: &str) -> bool {
    let Some(caps) = LEADING_FENCE.captures(text) else {
        return false;
    };
    let lang = caps.name("lang").map(|m| m.as_str()).unwrap_or_default();
    if lang.eq_ignore_ascii_case("json") {
        return true;
    }
    if !lang.is_empty() {
        return false;
    }
    let rest = caps.name("rest").map(|m| m.as_str().trim_start()).unwrap_or_default();
    rest.starts_with('[') || rest.starts_with('{')
}

/// Strip fences and parse a list of objects
///
/// Accepts a bare list or a `{"tasks": [...]}` envelope. Anything else yields
/// an empty vector.
pub fn strip_and_parse_fenced(output: &str) -> Vec<Value> {
    match try_parse_list(output) {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "strip_and_parse_fenced: discarding model output");
            Vec::new()
        }
    }
}

fn try_parse_list(output: &str) -> Result<Vec<Value>, ExtractError> {
    let body = strip_fences(output);
    if body.is_empty() {
        return Err(ExtractError::EmptyOrMissingInput);
    }
    let value: Value = serde_json::from_str(body).map_err(|e| ExtractError::MalformedModelOutput(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("tasks") {
            Some(Value::Array(items)) => Ok(items),
            Some(other) => Err(ExtractError::MalformedModelOutput(format!(
                "\"tasks\" is not a list: {}",
                type_name(&other)
            ))),
            None => Err(ExtractError::MalformedModelOutput("object without a \"tasks\" key".to_string())),
        },
        other => Err(ExtractError::MalformedModelOutput(format!(
            "expected a list, got {}",
            type_name(&other)
        ))),
    }
}

/// True iff `obj` is an object with a non-blank string task name
pub fn is_valid_task_stub(obj: &Value) -> bool {
    stub_name(obj).is_some()
}

/// Trimmed task name of a valid stub
pub fn stub_name(obj: &Value) -> Option<&str> {
    obj.as_object()?
        .get(NAME_FIELD)?
        .as_str()
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Round-1 stubs keyed `tasks-{i}` by element position
///
/// Invalid elements are skipped, so their positions leave gaps in the keys.
pub fn extract_task_stubs(output: &str) -> TaskSet {
    debug!("extract_task_stubs: called");
    let mut set = TaskSet::new();
    for (i, item) in strip_and_parse_fenced(output).iter().enumerate() {
        match stub_name(item) {
            Some(name) => {
                set.insert(Task::stub(stub_id(i), name));
            }
            None => warn!(index = i, element = %item, "extract_task_stubs: skipping invalid task stub"),
        }
    }
    debug!(count = set.len(), "extract_task_stubs: extracted");
    set
}

/// Parse and validate the final `{"tasks": [...]}` envelope
///
/// Elements without a name or an integer id are dropped, as are dependencies
/// that point at themselves or at unknown ids. Fails when the envelope is
/// missing or nothing valid survives.
pub fn parse_consolidation(output: &str) -> Result<TaskGraph, ExtractError> {
    debug!("parse_consolidation: called");
    let body = strip_fences(output);
    if body.is_empty() {
        return Err(ExtractError::EmptyOrMissingInput);
    }
    let value: Value =
        serde_json::from_str(body).map_err(|e| ExtractError::ConsolidationFailure(format!("not JSON: {}", e)))?;
    let items = value
        .get("tasks")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::ConsolidationFailure("missing \"tasks\" list".to_string()))?;

    let mut graph = TaskGraph::default();
    for (i, item) in items.iter().enumerate() {
        match consolidated_task(item) {
            Ok(task) => {
                if graph.tasks.iter().any(|t| t.id == task.id) {
                    warn!(index = i, id = task.id, "parse_consolidation: duplicate id, skipping");
                    continue;
                }
                graph.tasks.push(task);
            }
            Err(e) => warn!(index = i, error = %e, "parse_consolidation: skipping element"),
        }
    }

    if graph.tasks.is_empty() {
        return Err(ExtractError::ConsolidationFailure("no valid tasks".to_string()));
    }

    for (task, dep) in graph.repair_dependencies() {
        warn!(task, dep, "parse_consolidation: removed dangling dependency");
    }
    debug_assert!(graph.to_task_set().dangling_dependencies().is_empty());
    debug!(count = graph.tasks.len(), "parse_consolidation: validated");
    Ok(graph)
}

fn consolidated_task(item: &Value) -> Result<ConsolidatedTask, ExtractError> {
    let name = stub_name(item).ok_or_else(|| ExtractError::InvalidTaskShape(format!("no {}: {}", NAME_FIELD, item)))?;
    let id = item
        .get("id")
        .and_then(lenient_u64)
        .ok_or_else(|| ExtractError::InvalidTaskShape(format!("no integer id: {}", item)))?;
    let description = item
        .get("description")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let dependencies = item.get("dependencies").map(lenient_ids).unwrap_or_default();
    let estimation = item.get("estimation").and_then(lenient_u64);

    Ok(ConsolidatedTask {
        id,
        name_of_the_task: name.to_string(),
        description,
        dependencies,
        estimation,
    })
}

/// Integer, whole float, or numeric string
fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Dependency ids from null, a number, a comma-separated string or a list
fn lenient_ids(value: &Value) -> Vec<u64> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(lenient_u64).collect(),
        Value::String(s) => s.split(',').filter_map(|part| part.trim().parse().ok()).collect(),
        other => lenient_u64(other).into_iter().collect(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_strip_fences_variants() {
        assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_fences("  ```JSON  \r\n[1]\r\n```  \n"), "[1]");
        assert_eq!(strip_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_fences("```[1, 2]```"), "[1, 2]");
        assert_eq!(strip_fences("  [1]  "), "[1]");
    }

    #[test]
    fn test_strip_fences_inside_prose() {
        let text = "Sure! Here you go:\n```json\n[{\"name_of_the_task\": \"a\"}]\n```\nGood luck.";
        assert_eq!(strip_fences(text), "[{\"name_of_the_task\": \"a\"}]");
    }

    #[test]
    fn test_strip_fences_takes_first_of_several_blocks() {
        let draft = "```json\n[{\"name_of_the_task\": \"Install Python\"}, {\"name_of_the_task\": \"Learn syntax\"}]\n```\n\nOptional extras:\n```\npip install ipython\n```";
        assert!(is_json_fenced(draft));
        assert_eq!(
            strip_fences(draft),
            "[{\"name_of_the_task\": \"Install Python\"}, {\"name_of_the_task\": \"Learn syntax\"}]"
        );

        let stubs = extract_task_stubs(draft);
        assert_eq!(stubs.len(), 2);
        assert_eq!(stubs.get("tasks-1").map(|t| t.name.as_str()), Some("Learn syntax"));
    }

    #[test]
    fn test_strip_fences_truncated() {
        assert_eq!(strip_fences("```json\n[{\"name_of_the_task\": \"a\"}"), "[{\"name_of_the_task\": \"a\"}");
    }

    #[test]
    fn test_is_json_fenced() {
        assert!(is_json_fenced("```json\n[]\n```"));
        assert!(is_json_fenced("\n  ```Json\n[]"));
        assert!(is_json_fenced("```\n[{\"a\": 1}]\n```"));
        assert!(!is_json_fenced("```python\nprint(1)\n```"));
        assert!(!is_json_fenced("```\nplain words\n```"));
        assert!(!is_json_fenced("Here is the list: ```json\n[]\n```"));
        assert!(!is_json_fenced(""));
    }

    #[test]
    fn test_parse_envelope_and_list() {
        let list = strip_and_parse_fenced("```json\n[{\"name_of_the_task\": \"a\"}]\n```");
        assert_eq!(list, vec![json!({"name_of_the_task": "a"})]);

        let wrapped = strip_and_parse_fenced("{\"tasks\": [{\"name_of_the_task\": \"b\"}]}");
        assert_eq!(wrapped, vec![json!({"name_of_the_task": "b"})]);
    }

    #[test]
    fn test_parse_failures_are_empty() {
        assert!(strip_and_parse_fenced("I cannot help with that").is_empty());
        assert!(strip_and_parse_fenced("```json\n[{\"name_of_the_task\": \n```").is_empty());
        assert!(strip_and_parse_fenced("{\"items\": []}").is_empty());
        assert!(strip_and_parse_fenced("{\"tasks\": \"none\"}").is_empty());
        assert!(strip_and_parse_fenced("42").is_empty());
        assert!(strip_and_parse_fenced("").is_empty());
    }

    #[test]
    fn test_is_valid_task_stub() {
        assert!(is_valid_task_stub(&json!({"name_of_the_task": "Install Python"})));
        assert!(is_valid_task_stub(&json!({"name_of_the_task": "x", "extra": 1})));
        assert!(!is_valid_task_stub(&json!({"name": "Install Python"})));
        assert!(!is_valid_task_stub(&json!({"name_of_the_task": "   "})));
        assert!(!is_valid_task_stub(&json!({"name_of_the_task": 3})));
        assert!(!is_valid_task_stub(&json!("name_of_the_task")));
    }

    #[test]
    fn test_extract_task_stubs_keeps_positions() {
        let output = r#"```json
[
    {"name_of_the_task": "Install Python"},
    {"title": "no name"},
    {"name_of_the_task": "Write a script"}
]
```"#;
        let set = extract_task_stubs(output);
        assert_eq!(set.ids().collect::<Vec<_>>(), vec!["tasks-0", "tasks-2"]);
        assert_eq!(set.get("tasks-2").map(|t| t.name.as_str()), Some("Write a script"));
    }

    #[test]
    fn test_parse_consolidation_lenient_fields() {
        let output = r#"```json
{"tasks": [
    {"id": 1, "name_of_the_task": "Basics", "description": "Syntax", "dependencies": [], "estimation": 4},
    {"id": "2", "name_of_the_task": "Projects", "dependencies": "1, 9", "estimation": "6"},
    {"id": 3.0, "name_of_the_task": "Review", "dependencies": 2},
    {"id": 4, "name_of_the_task": "Loose", "dependencies": null, "estimation": 1.5}
]}
```"#;
        let graph = parse_consolidation(output).unwrap();
        let ids: Vec<u64> = graph.tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(graph.tasks[1].dependencies, vec![1]);
        assert_eq!(graph.tasks[1].estimation, Some(6));
        assert_eq!(graph.tasks[2].dependencies, vec![2]);
        assert!(graph.tasks[3].dependencies.is_empty());
        assert_eq!(graph.tasks[3].estimation, None);
        assert_eq!(graph.tasks[0].description, "Syntax");
        assert!(graph.to_task_set().dangling_dependencies().is_empty());
    }

    #[test]
    fn test_parse_consolidation_leaves_no_dangling_dependencies() {
        let output = r#"{"tasks": [
            {"id": 1, "name_of_the_task": "Basics", "dependencies": [1, 7]},
            {"id": 2, "name_of_the_task": "Project", "dependencies": [1, 1, 3]}
        ]}"#;
        let raw: TaskSet = [
            Task::stub("1", "Basics").with_dependencies(vec!["1".to_string(), "7".to_string()]),
            Task::stub("2", "Project").with_dependencies(vec!["1".to_string(), "3".to_string()]),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            raw.dangling_dependencies(),
            vec![("1".to_string(), "7".to_string()), ("2".to_string(), "3".to_string())]
        );

        let set = parse_consolidation(output).unwrap().to_task_set();
        assert!(set.dangling_dependencies().is_empty());
        assert_eq!(set.get("2").map(|t| t.dependencies.clone()), Some(vec!["1".to_string()]));
    }

    #[test]
    fn test_parse_consolidation_skips_invalid_elements() {
        let output = r#"{"tasks": [
            {"id": 1, "name_of_the_task": "Keep", "dependencies": [1, 2]},
            {"name_of_the_task": "No id"},
            {"id": 2, "description": "No name"},
            {"id": 1, "name_of_the_task": "Duplicate"}
        ]}"#;
        let graph = parse_consolidation(output).unwrap();
        assert_eq!(graph.tasks.len(), 1);
        assert_eq!(graph.tasks[0].name_of_the_task, "Keep");
        assert!(graph.tasks[0].dependencies.is_empty());
    }

    #[test]
    fn test_parse_consolidation_failures() {
        assert!(matches!(
            parse_consolidation("Here is a plan in prose."),
            Err(ExtractError::ConsolidationFailure(_))
        ));
        assert!(matches!(
            parse_consolidation("[{\"id\": 1, \"name_of_the_task\": \"a\"}]"),
            Err(ExtractError::ConsolidationFailure(_))
        ));
        assert!(matches!(
            parse_consolidation("{\"tasks\": [{\"id\": 1}]}"),
            Err(ExtractError::ConsolidationFailure(_))
        ));
        assert_eq!(parse_consolidation("  "), Err(ExtractError::EmptyOrMissingInput));
    }

    proptest! {
        #[test]
        fn prop_n_names_yield_n_positional_keys(names in prop::collection::vec("[A-Za-z][A-Za-z ]{0,20}", 0..12)) {
            let items: Vec<Value> = names.iter().map(|n| json!({ "name_of_the_task": n })).collect();
            let output = format!("```json\n{}\n```", serde_json::to_string_pretty(&items).unwrap());

            let set = extract_task_stubs(&output);
            let expected: Vec<String> = (0..names.len()).map(stub_id).collect();
            prop_assert_eq!(set.ids().map(str::to_string).collect::<Vec<_>>(), expected);
            for (task, name) in set.iter().zip(&names) {
                prop_assert_eq!(&task.name, name.trim());
            }
        }

        #[test]
        fn prop_garbage_never_panics(text in "\\PC{0,200}") {
            let _ = strip_and_parse_fenced(&text);
            let _ = extract_task_stubs(&text);
            let _ = parse_consolidation(&text);
        }

        #[test]
        fn prop_validation_is_idempotent(name in proptest::option::of("\\PC{0,20}"), other in "[a-z]{1,8}") {
            let mut map = serde_json::Map::new();
            map.insert(other.clone(), json!(1));
            if let Some(n) = &name {
                map.insert(NAME_FIELD.to_string(), json!(n));
            }
            let obj = Value::Object(map);
            let first = is_valid_task_stub(&obj);
            prop_assert_eq!(first, is_valid_task_stub(&obj));
            if name.is_none() && other != NAME_FIELD {
                prop_assert!(!first);
            }
        }
    }
}
