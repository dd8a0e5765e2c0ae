//! Schema check for ingestion payloads.
//!
//! The whole payload is rejected when any field is off; records are never dropped or
//! coerced one by one. Every violation found is reported, not just the first one, so a
//! single log line is enough to see what the producer got wrong.

use std::fmt;

use serde_json::Value;

use crate::message::IngestionPayload;

/// What is wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    Missing,
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
    Empty,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::Missing => write!(f, "missing"),
            Violation::WrongType { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            Violation::Empty => write!(f, "must not be empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// JSON path of the field, e.g. `records[3].recordId`.
    pub path: String,
    pub violation: Violation,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, violation: Violation) -> Self {
        Self {
            path: path.into(),
            violation,
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.violation)
    }
}

/// The payload does not match the ingestion schema. Never retryable.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} schema violation(s): ", self.violations.len())?;
        for (i, violation) in self.violations.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{violation}")?;
        }
        Ok(())
    }
}

/// Checks `candidate` against the payload schema and returns the typed payload.
pub fn validate(candidate: Value) -> Result<IngestionPayload, ValidationError> {
    let violations = check(&candidate);
    if !violations.is_empty() {
        return Err(ValidationError::new(violations));
    }

    // everything serde looks at was checked above
    serde_json::from_value(candidate).map_err(|e| {
        ValidationError::new(vec![FieldViolation::new(
            "$",
            Violation::WrongType {
                expected: "ingestion payload",
                found: error_category(&e),
            },
        )])
    })
}

fn error_category(e: &serde_json::Error) -> &'static str {
    match e.classify() {
        serde_json::error::Category::Data => "mismatched data",
        serde_json::error::Category::Syntax => "invalid syntax",
        serde_json::error::Category::Eof => "truncated input",
        serde_json::error::Category::Io => "unreadable input",
    }
}

/// Collects every violation in `candidate`. An empty list means the payload is valid.
pub fn check(candidate: &Value) -> Vec<FieldViolation> {
    let mut violations = Vec::new();

    let Some(object) = candidate.as_object() else {
        violations.push(FieldViolation::new(
            "$",
            Violation::WrongType {
                expected: "object",
                found: kind(candidate),
            },
        ));
        return violations;
    };

    require_string(object.get("dataset"), "dataset", false, &mut violations);

    match object.get("records") {
        None => violations.push(FieldViolation::new("records", Violation::Missing)),
        Some(Value::Array(records)) => {
            for (index, record) in records.iter().enumerate() {
                check_record(record, index, &mut violations);
            }
        }
        Some(other) => violations.push(FieldViolation::new(
            "records",
            Violation::WrongType {
                expected: "array",
                found: kind(other),
            },
        )),
    }

    violations
}

fn check_record(record: &Value, index: usize, violations: &mut Vec<FieldViolation>) {
    let prefix = format!("records[{index}]");
    let Some(fields) = record.as_object() else {
        violations.push(FieldViolation::new(
            prefix,
            Violation::WrongType {
                expected: "object",
                found: kind(record),
            },
        ));
        return;
    };

    let path = |field: &str| format!("{prefix}.{field}");
    require_string(fields.get("dataset"), &path("dataset"), false, violations);
    require_string(fields.get("recordId"), &path("recordId"), true, violations);
    require_string(fields.get("profileId"), &path("profileId"), false, violations);
    require_string(fields.get("eventTime"), &path("eventTime"), false, violations);

    match fields.get("payload") {
        None => violations.push(FieldViolation::new(path("payload"), Violation::Missing)),
        Some(Value::Object(_)) => {}
        Some(other) => violations.push(FieldViolation::new(
            path("payload"),
            Violation::WrongType {
                expected: "object",
                found: kind(other),
            },
        )),
    }
}

fn require_string(
    value: Option<&Value>,
    path: &str,
    non_empty: bool,
    violations: &mut Vec<FieldViolation>,
) {
    match value {
        None => violations.push(FieldViolation::new(path, Violation::Missing)),
        Some(Value::String(s)) if non_empty && s.is_empty() => {
            violations.push(FieldViolation::new(path, Violation::Empty))
        }
        Some(Value::String(_)) => {}
        Some(other) => violations.push(FieldViolation::new(
            path,
            Violation::WrongType {
                expected: "string",
                found: kind(other),
            },
        )),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
