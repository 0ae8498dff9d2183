use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::graph::name::{LAST_KEY, RESULT_KEY, WEB_REQUEST_KEY};

/// Accumulated results of a run, keyed by step name.
///
/// Only the executor writes into the context, and only after a step has
/// finished successfully. Guards, merge functions and predicates get a
/// shared reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    results: HashMap<String, Value>,
    last: Value,
}

impl ExecutionContext {
    /// Create a context whose `last` entry holds the run input.
    pub fn new(input: Value) -> Self {
        Self {
            results: HashMap::new(),
            last: input,
        }
    }

    /// The recorded result of a step, if it executed.
    pub fn result(&self, step: &str) -> Option<&Value> {
        self.results.get(step)
    }

    /// The most recently produced result (the run input before any step).
    pub fn last(&self) -> &Value {
        &self.last
    }

    /// Look up a dotted field path inside a step's result.
    ///
    /// An empty path yields the whole result.
    pub fn field(&self, step: &str, path: &str) -> Option<&Value> {
        let mut current = self.results.get(step)?;
        if path.is_empty() {
            return Some(current);
        }
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, step: &str) -> bool {
        self.results.contains_key(step)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub(crate) fn record(&mut self, step: &str, value: Value) {
        self.results.insert(step.to_string(), value.clone());
        self.last = value;
    }

    /// Render as `{ step: { result }, ..., last: { result } }`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.results {
            map.insert(name.clone(), wrap_result(value));
        }
        map.insert(LAST_KEY.to_string(), wrap_result(&self.last));
        Value::Object(map)
    }
}

fn wrap_result(value: &Value) -> Value {
    let mut map = Map::new();
    map.insert(RESULT_KEY.to_string(), value.clone());
    Value::Object(map)
}

/// JSON truthiness: `null`, `false`, `0`, `""` are false; everything else true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn input_map(input: &Value) -> Map<String, Value> {
    match input {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("input".to_string(), other.clone());
            map
        }
    }
}

/// Build a step's input.
///
/// Starts from the run input, then folds every object-valued prior result in
/// execution order (last write wins), then applies the step's own merge
/// output with the highest precedence. A non-object run input is placed
/// under the `input` key; non-object results contribute nothing.
pub fn assemble_input(input: &Value, results: &[(String, Value)], merged: Option<Value>) -> Value {
    let mut acc = input_map(input);

    for (_, output) in results {
        if let Value::Object(map) = output {
            for (k, v) in map {
                acc.insert(k.clone(), v.clone());
            }
        }
    }

    if let Some(Value::Object(map)) = merged {
        acc.extend(map);
    }

    Value::Object(acc)
}

/// Snapshot handed to yield functions.
///
/// Holds `webRequest` (the run input folded with every result under its step
/// name) plus one top-level key per completed step.
pub fn yield_snapshot(input: &Value, results: &[(String, Value)]) -> Value {
    let mut request = input_map(input);
    let mut snapshot = Map::new();
    for (name, value) in results {
        request.insert(name.clone(), value.clone());
        snapshot.insert(name.clone(), value.clone());
    }
    snapshot.insert(WEB_REQUEST_KEY.to_string(), Value::Object(request));
    Value::Object(snapshot)
}
