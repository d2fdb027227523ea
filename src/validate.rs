use crate::error::ValidationError;
use crate::model::{
    MarkComponent, MarkEntry, MarkValue, RosterKey, StudentIdentity, StudentResultRecord,
    SubjectDefinition, ABSENT_MARK,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A mark pair as submitted by a client, before canonicalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawMarkEntry {
    pub subject: String,
    #[serde(default)]
    pub internal: Value,
    #[serde(default)]
    pub external: Value,
}

/// A full result submission for one composite key.
#[derive(Debug, Clone)]
pub struct Submission {
    pub key: RosterKey,
    pub student: StudentIdentity,
    pub marks: Vec<RawMarkEntry>,
    pub withheld: bool,
}

/// Canonicalize one raw component: numbers and numeric strings become marks,
/// `"A"` becomes the absence sentinel. Bounds are not checked here.
pub fn parse_mark_value(
    subject: &str,
    component: MarkComponent,
    raw: &Value,
) -> Result<MarkValue, ValidationError> {
    let not_numeric = || ValidationError::NotNumeric {
        subject: subject.to_string(),
        component,
        raw: raw.to_string(),
    };
    match raw {
        Value::Null => Err(ValidationError::MissingMark {
            subject: subject.to_string(),
            component,
        }),
        Value::Number(n) => n.as_f64().map(MarkValue::Marks).ok_or_else(not_numeric),
        Value::String(s) => {
            let t = s.trim();
            if t.is_empty() {
                return Err(ValidationError::MissingMark {
                    subject: subject.to_string(),
                    component,
                });
            }
            if t.eq_ignore_ascii_case(ABSENT_MARK) {
                return Ok(MarkValue::Absent);
            }
            match t.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(MarkValue::Marks(v)),
                _ => Err(not_numeric()),
            }
        }
        _ => Err(not_numeric()),
    }
}

/// Check a typed mark against the component bounds of `def`.
pub fn check_mark_value(
    def: &SubjectDefinition,
    component: MarkComponent,
    value: MarkValue,
) -> Result<MarkValue, ValidationError> {
    let MarkValue::Marks(v) = value else {
        return Ok(value);
    };
    if !v.is_finite() {
        return Err(ValidationError::NotNumeric {
            subject: def.name.clone(),
            component,
            raw: v.to_string(),
        });
    }
    if v < 0.0 {
        return Err(ValidationError::BelowZero {
            subject: def.name.clone(),
            component,
            value: v,
        });
    }
    let max = def.component_max(component);
    if v > max {
        return Err(ValidationError::AboveMax {
            subject: def.name.clone(),
            component,
            value: v,
            max,
        });
    }
    Ok(value)
}

pub fn validate_component(
    def: &SubjectDefinition,
    component: MarkComponent,
    raw: &Value,
) -> Result<MarkValue, ValidationError> {
    let value = parse_mark_value(&def.name, component, raw)?;
    check_mark_value(def, component, value)
}

/// Validate a raw (internal, external) pair for one subject. Each component is
/// checked on its own; the first failing component is reported.
pub fn validate_mark_entry(
    def: &SubjectDefinition,
    raw_internal: &Value,
    raw_external: &Value,
) -> Result<MarkEntry, ValidationError> {
    let internal = validate_component(def, MarkComponent::Internal, raw_internal)?;
    let external = validate_component(def, MarkComponent::External, raw_external)?;
    Ok(MarkEntry {
        subject: def.name.clone(),
        internal,
        external,
    })
}

pub fn validate_subject_definition(def: &SubjectDefinition) -> Result<(), ValidationError> {
    let bad = |reason: String| ValidationError::BadDefinition {
        subject: def.name.clone(),
        reason,
    };
    if def.name.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "subject.name".to_string(),
        });
    }
    let bounds = [
        ("internalMin", def.internal_min),
        ("internalMax", def.internal_max),
        ("externalMin", def.external_min),
        ("externalMax", def.external_max),
    ];
    for (field, v) in bounds {
        if !v.is_finite() || v < 0.0 {
            return Err(bad(format!("{} must be a non-negative number", field)));
        }
    }
    if def.internal_min > def.internal_max {
        return Err(bad("internalMin must be <= internalMax".to_string()));
    }
    if def.external_min > def.external_max {
        return Err(bad("externalMin must be <= externalMax".to_string()));
    }
    if def.max_total() <= 0.0 {
        return Err(bad("internalMax + externalMax must be > 0".to_string()));
    }
    Ok(())
}

pub fn validate_roster_key(key: &RosterKey) -> Result<(), ValidationError> {
    if key.course.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "course".to_string(),
        });
    }
    if key.session.trim().is_empty() {
        return Err(ValidationError::MissingField {
            field: "session".to_string(),
        });
    }
    if key.semester < 1 {
        return Err(ValidationError::BadField {
            field: "semester".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    Ok(())
}

/// Trimmed copy of the identity, rejecting blank roll numbers and names.
pub fn normalize_identity(student: &StudentIdentity) -> Result<StudentIdentity, ValidationError> {
    let roll_no = student.roll_no.trim();
    if roll_no.is_empty() {
        return Err(ValidationError::MissingField {
            field: "student.rollNo".to_string(),
        });
    }
    let name = student.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingField {
            field: "student.name".to_string(),
        });
    }
    Ok(StudentIdentity {
        roll_no: roll_no.to_string(),
        enrollment_no: student.enrollment_no.trim().to_string(),
        name: name.to_string(),
    })
}

/// Validate a whole submission against the session's subject definitions and
/// produce the record to store. Nothing is returned unless every part passes.
pub fn validate_submission(
    submission: &Submission,
    defs: &[SubjectDefinition],
) -> Result<StudentResultRecord, ValidationError> {
    validate_roster_key(&submission.key)?;
    let student = normalize_identity(&submission.student)?;

    let by_name: HashMap<&str, &SubjectDefinition> =
        defs.iter().map(|d| (d.name.as_str(), d)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut marks = Vec::with_capacity(submission.marks.len());
    for raw in &submission.marks {
        let name = raw.subject.trim();
        if name.is_empty() {
            return Err(ValidationError::MissingField {
                field: "marks.subject".to_string(),
            });
        }
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateSubject {
                subject: name.to_string(),
            });
        }
        let Some(def) = by_name.get(name) else {
            return Err(ValidationError::UnknownSubject {
                subject: name.to_string(),
                roster: submission.key.to_string(),
            });
        };
        marks.push(validate_mark_entry(def, &raw.internal, &raw.external)?);
    }

    Ok(StudentResultRecord {
        key: submission.key.clone(),
        student,
        marks,
        withheld: submission.withheld,
    })
}
