use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Error;
use crate::formula::eval;

/// The scheduler tag this core implements. Carried on every descriptor so a
/// future multi-scheduler runtime can dispatch on it the way the original
/// implementation's `scheduler` field did.
pub const SCHEDULER_TAG: &str = "aprofile";

/// A reference to bytes already resident on a surrogate. The scheduler never
/// materializes the bytes, only reasons about transfer cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDataHandle {
    pub server_name: String,
    pub size: u64,
    /// Opaque identifier consumed by the owning surrogate.
    pub handle_id: String,
}

/// A single scalar value, or a reference to data already on some surrogate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Handle(RemoteDataHandle),
    Json(serde_json::Value),
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Json(v) => v.as_f64(),
            Value::Handle(_) => None,
        }
    }
}

/// The shape of a task's input: positional, keyed, or a single value.
/// Mirrors the three argument shapes the original dispatcher distinguished
/// (mapping → named parameters, list/tuple → positional, single → one arg).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Single(Value),
}

impl Input {
    /// All `RemoteDataHandle`s reachable within this input, in a stable
    /// order (used by the cost model and the dispatcher's resolver).
    pub fn data_handles(&self) -> Vec<&RemoteDataHandle> {
        let values: Vec<&Value> = match self {
            Input::List(items) => items.iter().collect(),
            Input::Map(map) => map.values().collect(),
            Input::Single(v) => vec![v],
        };
        values
            .into_iter()
            .filter_map(|v| match v {
                Value::Handle(h) => Some(h),
                Value::Json(_) => None,
            })
            .collect()
    }

    /// Positional access, used by formula substitution which only works on
    /// list-shaped input (matching the original implementation's
    /// restriction).
    pub fn positional(&self) -> Option<&[Value]> {
        match self {
            Input::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Computes the serialized size of a value. The scheduler's only real
/// dependency is this trait; the JSON-based implementation below is the one
/// concrete instance this core ships, since task inputs are modeled as a
/// JSON-like value tree.
pub trait Serializer {
    fn size_of(&self, input: &Input) -> usize;
}

/// The default [`Serializer`]: JSON-encodes the input and measures the byte
/// length, the same technique the teacher's benchmark harness used to
/// measure REST/JSON payload sizes.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn size_of(&self, input: &Input) -> usize {
        serde_json::to_vec(input).map(|bytes| bytes.len()).unwrap_or(0)
    }
}

/// Either a constant byte count or a formula relating output size to input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Constant(f64),
    Formula(String),
}

/// An invocation request: name, inputs, optional code body, and the
/// parameters the adaptive-profiling scheduler needs to score it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub input: Input,
    /// Present only the first time a task visits a given peer.
    pub code: Option<String>,
    /// If true, the surrogate keeps the output and returns only a handle.
    pub store: bool,
    pub output_size: SizeSpec,
    pub complexity_relation: Option<String>,
    /// Populated by evaluating `complexity_relation` at scheduling time.
    pub complexity: Option<f64>,
    #[serde(default = "default_scheduler_tag")]
    pub scheduler_tag: String,
}

fn default_scheduler_tag() -> String {
    SCHEDULER_TAG.to_string()
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, input: Input, output_size: SizeSpec) -> Self {
        TaskDescriptor {
            name: name.into(),
            input,
            code: None,
            store: false,
            output_size,
            complexity_relation: None,
            complexity: None,
            scheduler_tag: SCHEDULER_TAG.to_string(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_complexity_relation(mut self, relation: impl Into<String>) -> Self {
        self.complexity_relation = Some(relation.into());
        self
    }

    pub fn with_store(mut self, store: bool) -> Self {
        self.store = store;
        self
    }

    /// Resolves `complexity_relation` against the task's (list-shaped)
    /// input and caches the result in `self.complexity`. No-op if there is
    /// no relation configured.
    pub fn resolve_complexity(&mut self) -> Result<(), Error> {
        let Some(relation) = self.complexity_relation.clone() else {
            return Ok(());
        };
        let positional = self.input.positional().ok_or_else(|| Error::BadFormula {
            formula: relation.clone(),
            reason: "complexityRelation requires list-shaped input".to_string(),
        })?;
        let inputs = numeric_inputs(positional, &relation)?;
        self.complexity = Some(eval(&relation, &inputs)?);
        Ok(())
    }

    /// Evaluates `output_size`, substituting `#i` with positional inputs
    /// when it is a formula. Returns 0 when `store` is true, matching the
    /// cost model's rule that stored output need not be transferred back.
    pub fn output_bytes(&self) -> Result<f64, Error> {
        if self.store {
            return Ok(0.0);
        }
        match &self.output_size {
            SizeSpec::Constant(n) => Ok(*n),
            SizeSpec::Formula(formula) => {
                let positional = self.input.positional().ok_or_else(|| Error::BadFormula {
                    formula: formula.clone(),
                    reason: "outputSize formula requires list-shaped input".to_string(),
                })?;
                let inputs = numeric_inputs(positional, formula)?;
                eval(formula, &inputs)
            }
        }
    }
}

fn numeric_inputs(positional: &[Value], formula: &str) -> Result<Vec<f64>, Error> {
    positional
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| Error::BadFormula {
                formula: formula.to_string(),
                reason: "positional input is not numeric".to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> Value {
        Value::Json(serde_json::json!(n))
    }

    #[test]
    fn resolves_complexity_from_list_input() {
        let mut task = TaskDescriptor::new(
            "t",
            Input::List(vec![num(10.0), num(20.0)]),
            SizeSpec::Constant(0.0),
        )
        .with_complexity_relation("#0 * #1");
        task.resolve_complexity().unwrap();
        assert_eq!(task.complexity, Some(200.0));
    }

    #[test]
    fn output_bytes_zero_when_stored() {
        let task = TaskDescriptor::new("t", Input::List(vec![num(1.0)]), SizeSpec::Constant(999.0))
            .with_store(true);
        assert_eq!(task.output_bytes().unwrap(), 0.0);
    }

    #[test]
    fn output_bytes_from_formula() {
        let task = TaskDescriptor::new(
            "t",
            Input::List(vec![num(3.0)]),
            SizeSpec::Formula("#0 * 2".to_string()),
        );
        assert_eq!(task.output_bytes().unwrap(), 6.0);
    }

    #[test]
    fn json_serializer_measures_size() {
        let input = Input::List(vec![num(1.0), num(2.0)]);
        let size = JsonSerializer.size_of(&input);
        assert!(size > 0);
    }

    #[test]
    fn data_handles_collected_from_list() {
        let handle = RemoteDataHandle {
            server_name: "P".into(),
            size: 10,
            handle_id: "abc".into(),
        };
        let input = Input::List(vec![num(1.0), Value::Handle(handle.clone())]);
        assert_eq!(input.data_handles(), vec![&handle]);
    }
}
