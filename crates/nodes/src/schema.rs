//! Node input/output declarations
//!
//! Every node carries a [`NodeSchema`] that is checked once when the node is
//! built; call-time values are then checked against it.

use crate::NodeError;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Type and constraints of one input
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputKind {
    Int { default: i64, min: i64, max: i64 },
    Float { default: f64, min: f64, max: Option<f64>, step: f64 },
    Boolean { default: bool },
    String { default: String, multiline: bool },
    /// One of a fixed list, e.g. available checkpoints
    Choice { options: Vec<String> },
    /// Value produced by another node, e.g. `TRIPOSR_MODEL`
    Link { type_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputSpec {
    pub name: String,
    pub kind: InputKind,
}

impl InputSpec {
    pub fn new(name: &str, kind: InputKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }

    /// Host wire form: `[TYPE, {options}]`
    fn host_entry(&self) -> Value {
        match &self.kind {
            InputKind::Int { default, min, max } => {
                json!(["INT", { "default": default, "min": min, "max": max }])
            }
            InputKind::Float { default, min, max, step } => {
                let mut opts = Map::new();
                opts.insert("default".into(), json!(default));
                opts.insert("min".into(), json!(min));
                if let Some(max) = max {
                    opts.insert("max".into(), json!(max));
                }
                opts.insert("step".into(), json!(step));
                json!(["FLOAT", opts])
            }
            InputKind::Boolean { default } => json!(["BOOLEAN", { "default": default }]),
            InputKind::String { default, multiline } => {
                json!(["STRING", { "default": default, "multiline": multiline }])
            }
            InputKind::Choice { options } => json!([options]),
            InputKind::Link { type_name } => json!([type_name]),
        }
    }
}

/// Declared contract of a node class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSchema {
    pub class_name: String,
    pub display_name: String,
    pub category: String,
    pub inputs: Vec<InputSpec>,
    pub outputs: Vec<String>,
    /// Node produces a UI payload instead of graph values
    pub output_node: bool,
}

impl NodeSchema {
    /// Check the declaration itself: unique names, sane bounds, defaults in range
    pub fn validate(&self) -> Result<(), NodeError> {
        if self.class_name.is_empty() {
            return Err(NodeError::Schema("empty class name".into()));
        }

        let mut seen = HashSet::new();
        for input in &self.inputs {
            if !seen.insert(input.name.as_str()) {
                return Err(NodeError::Schema(format!(
                    "{}: duplicate input '{}'",
                    self.class_name, input.name
                )));
            }

            let bad = |reason: String| {
                NodeError::Schema(format!("{}.{}: {}", self.class_name, input.name, reason))
            };
            match &input.kind {
                InputKind::Int { default, min, max } => {
                    if min > max || default < min || default > max {
                        return Err(bad(format!("default {} outside [{}, {}]", default, min, max)));
                    }
                }
                InputKind::Float { default, min, max, step } => {
                    let upper = max.unwrap_or(f64::INFINITY);
                    if !(min <= &upper && default >= min && default <= &upper) {
                        return Err(bad(format!("default {} outside [{}, {}]", default, min, upper)));
                    }
                    if *step <= 0.0 {
                        return Err(bad(format!("step {} must be positive", step)));
                    }
                }
                InputKind::Link { type_name } if type_name.is_empty() => {
                    return Err(bad("empty link type".into()));
                }
                _ => {}
            }
        }

        if self.output_node && !self.outputs.is_empty() {
            return Err(NodeError::Schema(format!(
                "{}: output nodes return no graph values",
                self.class_name
            )));
        }
        Ok(())
    }

    pub fn input(&self, name: &str) -> Result<&InputSpec, NodeError> {
        self.inputs
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| NodeError::invalid(name, format!("not an input of {}", self.class_name)))
    }

    pub fn check_int(&self, name: &str, value: i64) -> Result<i64, NodeError> {
        match &self.input(name)?.kind {
            InputKind::Int { min, max, .. } if value < *min || value > *max => Err(
                NodeError::invalid(name, format!("{} outside [{}, {}]", value, min, max)),
            ),
            InputKind::Int { .. } => Ok(value),
            other => Err(NodeError::invalid(name, format!("expected INT, declared {:?}", other))),
        }
    }

    pub fn check_float(&self, name: &str, value: f64) -> Result<f64, NodeError> {
        match &self.input(name)?.kind {
            InputKind::Float { min, max, .. } => {
                let upper = max.unwrap_or(f64::INFINITY);
                if value.is_nan() || value < *min || value > upper {
                    Err(NodeError::invalid(name, format!("{} outside [{}, {}]", value, min, upper)))
                } else {
                    Ok(value)
                }
            }
            other => Err(NodeError::invalid(name, format!("expected FLOAT, declared {:?}", other))),
        }
    }

    pub fn check_string<'a>(&self, name: &str, value: &'a str) -> Result<&'a str, NodeError> {
        match &self.input(name)?.kind {
            InputKind::String { .. } if value.trim().is_empty() => {
                Err(NodeError::invalid(name, "must not be empty"))
            }
            InputKind::String { .. } => Ok(value),
            other => Err(NodeError::invalid(name, format!("expected STRING, declared {:?}", other))),
        }
    }

    /// `{"required": {name: [TYPE, {options}]}}` as the host expects it
    pub fn to_host_json(&self) -> Value {
        let required: Map<String, Value> = self
            .inputs
            .iter()
            .map(|i| (i.name.clone(), i.host_entry()))
            .collect();

        json!({
            "input": { "required": required },
            "output": self.outputs,
            "output_node": self.output_node,
            "category": self.category,
            "display_name": self.display_name,
        })
    }
}
