//! Structured output sink
//!
//! Diagnostic dumps are written through [`Formatter`], a section-based
//! writer: open a named object or array, write named scalar values, close
//! the innermost section. [`JsonFormatter`] collects the result into a
//! `serde_json::Value`.

use serde_json::{Map, Value};

/// A section-based structured writer
pub trait Formatter {
    /// Open a named object section
    fn open_object_section(&mut self, name: &str);

    /// Open a named array section
    fn open_array_section(&mut self, name: &str);

    /// Close the innermost open section
    fn close_section(&mut self);

    fn dump_int(&mut self, name: &str, value: i64);

    fn dump_unsigned(&mut self, name: &str, value: u64);

    fn dump_string(&mut self, name: &str, value: &str);
}

struct Frame {
    name: String,
    value: Value,
}

/// Builds a JSON document from formatter calls.
///
/// Values written inside an array section are appended in order and their
/// names are dropped.
pub struct JsonFormatter {
    stack: Vec<Frame>,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self {
            stack: vec![Frame {
                name: String::new(),
                value: Value::Object(Map::new()),
            }],
        }
    }

    fn insert(&mut self, name: &str, value: Value) {
        if let Some(top) = self.stack.last_mut() {
            match &mut top.value {
                Value::Object(map) => {
                    map.insert(name.to_string(), value);
                }
                Value::Array(items) => items.push(value),
                _ => {}
            }
        }
    }

    fn open(&mut self, name: &str, value: Value) {
        self.stack.push(Frame {
            name: name.to_string(),
            value,
        });
    }

    /// Close any sections still open and return the document
    pub fn into_value(mut self) -> Value {
        while self.stack.len() > 1 {
            self.close_section();
        }
        self.stack
            .pop()
            .map(|frame| frame.value)
            .unwrap_or(Value::Null)
    }

    /// Pretty-printed JSON of everything written so far
    pub fn to_string_pretty(self) -> String {
        let value = self.into_value();
        serde_json::to_string_pretty(&value).unwrap_or_default()
    }
}

impl Formatter for JsonFormatter {
    fn open_object_section(&mut self, name: &str) {
        self.open(name, Value::Object(Map::new()));
    }

    fn open_array_section(&mut self, name: &str) {
        self.open(name, Value::Array(Vec::new()));
    }

    fn close_section(&mut self) {
        // The root frame is never closed
        if self.stack.len() <= 1 {
            return;
        }
        if let Some(frame) = self.stack.pop() {
            self.insert(&frame.name, frame.value);
        }
    }

    fn dump_int(&mut self, name: &str, value: i64) {
        self.insert(name, Value::from(value));
    }

    fn dump_unsigned(&mut self, name: &str, value: u64) {
        self.insert(name, Value::from(value));
    }

    fn dump_string(&mut self, name: &str, value: &str) {
        self.insert(name, Value::from(value));
    }
}
