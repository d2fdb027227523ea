//! Error taxonomy for the result engine.

use crate::model::MarkComponent;
use serde_json::json;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Rejected input. Raised before any computation or persistence happens.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{subject}: {component} mark {value} is below 0")]
    BelowZero {
        subject: String,
        component: MarkComponent,
        value: f64,
    },

    #[error("{subject}: {component} mark {value} exceeds maximum {max}")]
    AboveMax {
        subject: String,
        component: MarkComponent,
        value: f64,
        max: f64,
    },

    #[error("{subject}: {component} mark must be a number or \"A\", got {raw}")]
    NotNumeric {
        subject: String,
        component: MarkComponent,
        raw: String,
    },

    #[error("{subject}: {component} mark is missing")]
    MissingMark {
        subject: String,
        component: MarkComponent,
    },

    #[error("missing required field: {field}")]
    MissingField { field: String },

    #[error("invalid {field}: {reason}")]
    BadField { field: String, reason: String },

    #[error("invalid subject definition {subject}: {reason}")]
    BadDefinition { subject: String, reason: String },

    #[error("subject {subject} appears more than once in one record")]
    DuplicateSubject { subject: String },

    #[error("subject {subject} is not defined for {roster}")]
    UnknownSubject { subject: String, roster: String },

    #[error("roll number {roll_no} appears more than once in the roster")]
    DuplicateRollNo { roll_no: String },

    #[error("record {roll_no} belongs to {found}, expected {expected}")]
    MixedRoster {
        roll_no: String,
        expected: String,
        found: String,
    },
}

impl ValidationError {
    /// Short name of the violated rule, for clients that branch on it.
    pub fn bound(&self) -> &'static str {
        match self {
            ValidationError::BelowZero { .. } => "belowZero",
            ValidationError::AboveMax { .. } => "aboveMax",
            ValidationError::NotNumeric { .. } => "notNumeric",
            ValidationError::MissingMark { .. } | ValidationError::MissingField { .. } => {
                "missing"
            }
            ValidationError::BadField { .. } => "badField",
            ValidationError::BadDefinition { .. } => "badDefinition",
            ValidationError::DuplicateSubject { .. } => "duplicateSubject",
            ValidationError::UnknownSubject { .. } => "unknownSubject",
            ValidationError::DuplicateRollNo { .. } => "duplicateRollNo",
            ValidationError::MixedRoster { .. } => "mixedRoster",
        }
    }

    pub fn details(&self) -> serde_json::Value {
        let mut d = json!({ "bound": self.bound() });
        match self {
            ValidationError::BelowZero {
                subject,
                component,
                value,
            } => {
                d["subject"] = json!(subject);
                d["component"] = json!(component);
                d["value"] = json!(value);
            }
            ValidationError::AboveMax {
                subject,
                component,
                value,
                max,
            } => {
                d["subject"] = json!(subject);
                d["component"] = json!(component);
                d["value"] = json!(value);
                d["max"] = json!(max);
            }
            ValidationError::NotNumeric {
                subject,
                component,
                raw,
            } => {
                d["subject"] = json!(subject);
                d["component"] = json!(component);
                d["value"] = json!(raw);
            }
            ValidationError::MissingMark { subject, component } => {
                d["subject"] = json!(subject);
                d["component"] = json!(component);
            }
            ValidationError::MissingField { field } | ValidationError::BadField { field, .. } => {
                d["field"] = json!(field);
            }
            ValidationError::BadDefinition { subject, .. }
            | ValidationError::DuplicateSubject { subject }
            | ValidationError::UnknownSubject { subject, .. } => {
                d["subject"] = json!(subject);
            }
            ValidationError::DuplicateRollNo { roll_no }
            | ValidationError::MixedRoster { roll_no, .. } => {
                d["rollNo"] = json!(roll_no);
            }
        }
        d
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("computation failed: {0}")]
    Computation(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_failed",
            EngineError::NotFound(_) => "not_found",
            EngineError::Computation(_) => "computation_failed",
            EngineError::Storage(_) => "storage_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            EngineError::Validation(v) => Some(v.details()),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Storage(format!("stored value is not valid JSON: {err}"))
    }
}
