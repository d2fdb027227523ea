use crate::error::{EngineResult, ValidationError};
use crate::model::{Roster, RosterKey, StudentIdentity, StudentResultRecord, SubjectDefinition};
use serde::Serialize;

/// Optional narrowing of a roster read. All set filters must match.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordFilters {
    pub roll_no: Option<String>,
    /// Case-insensitive substring of the student name or roll number.
    pub search: Option<String>,
    pub withheld: Option<bool>,
    /// Only records carrying marks for this subject.
    pub subject: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UpsertOutcome {
    Inserted,
    Replaced,
}

/// Where rosters live. The engine only reads snapshots and writes whole records.
pub trait RosterStore {
    fn subject_definitions(&self, key: &RosterKey) -> EngineResult<Vec<SubjectDefinition>>;

    fn student_result_records(
        &self,
        key: &RosterKey,
        filters: &RecordFilters,
    ) -> EngineResult<Vec<StudentResultRecord>>;

    /// Insert, or fully replace the record with the same composite key.
    fn upsert_student_result_record(
        &self,
        record: &StudentResultRecord,
    ) -> EngineResult<UpsertOutcome>;

    fn roll_list(&self, key: &RosterKey) -> EngineResult<Vec<StudentIdentity>>;

    fn roster_snapshot(&self, key: &RosterKey) -> EngineResult<Roster> {
        Ok(Roster {
            key: key.clone(),
            subjects: self.subject_definitions(key)?,
            roll: self.roll_list(key)?,
            records: self.student_result_records(key, &RecordFilters::default())?,
        })
    }
}

pub fn parse_record_filters(
    raw: Option<&serde_json::Value>,
) -> Result<RecordFilters, ValidationError> {
    let Some(raw) = raw else {
        return Ok(RecordFilters::default());
    };
    if raw.is_null() {
        return Ok(RecordFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(ValidationError::BadField {
            field: "filters".to_string(),
            reason: "must be an object".to_string(),
        });
    };

    let text = |name: &str| -> Result<Option<String>, ValidationError> {
        match obj.get(name) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(None),
            Some(v) => {
                let Some(s) = v.as_str() else {
                    return Err(ValidationError::BadField {
                        field: format!("filters.{}", name),
                        reason: "must be a string or null".to_string(),
                    });
                };
                let t = s.trim();
                Ok(if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                })
            }
        }
    };

    let withheld = match obj.get("withheld") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(b) = v.as_bool() else {
                return Err(ValidationError::BadField {
                    field: "filters.withheld".to_string(),
                    reason: "must be a boolean or null".to_string(),
                });
            };
            Some(b)
        }
    };

    Ok(RecordFilters {
        roll_no: text("rollNo")?,
        search: text("search")?.map(|s| s.to_lowercase()),
        withheld,
        subject: text("subject")?,
    })
}
