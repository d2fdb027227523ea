use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{
    DisplayTotal, MarkComponent, MarkValue, StudentResultRecord, SubjectDefinition, SubjectType,
};
use crate::validate::{check_mark_value, validate_subject_definition};
use serde::{Serialize, Serializer};
use std::collections::{HashMap, HashSet};

/// Half-away-from-zero rounding to 2 decimals, used for every reported
/// percentage and average.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn serialize_2dp<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_2_decimals(*v))
}

/// Record-level result: absence short-circuits before the numeric check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordResult {
    Pass,
    Fail,
    Absent,
}

/// Division derived from the number of failed subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Division {
    Pass,
    Supply,
    Fail,
}

/// Outcome of one subject, judging each component against its own minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubjectOutcome {
    Pass,
    Fail,
    Absent,
}

/// Common input shape for the classification policies.
#[derive(Debug, Clone, Copy)]
pub struct SubjectScore<'a> {
    pub def: &'a SubjectDefinition,
    pub internal: MarkValue,
    pub external: MarkValue,
}

impl SubjectScore<'_> {
    /// Internal + external, absence counted as 0.
    pub fn total(&self) -> f64 {
        self.internal.numeric() + self.external.numeric()
    }

    pub fn has_absence(&self) -> bool {
        self.internal.is_absent() || self.external.is_absent()
    }

    pub fn fully_absent(&self) -> bool {
        self.internal.is_absent() && self.external.is_absent()
    }

    /// Numeric failure: total below the sum of the component minimums.
    pub fn fails_total(&self) -> bool {
        self.total() < self.def.pass_total()
    }

    pub fn display_total(&self) -> DisplayTotal {
        if self.has_absence() {
            DisplayTotal::Absent
        } else {
            DisplayTotal::Marks(self.total())
        }
    }

    pub fn percentage(&self) -> f64 {
        100.0 * self.total() / self.def.max_total()
    }
}

/// `ABSENT` when every subject is absent on both components (vacuously so for
/// an empty list); `FAIL` on any absent component or any numeric failure.
pub fn record_result(scores: &[SubjectScore<'_>]) -> RecordResult {
    if scores.iter().all(|s| s.fully_absent()) {
        return RecordResult::Absent;
    }
    if scores.iter().any(|s| s.has_absence()) {
        return RecordResult::Fail;
    }
    if scores.iter().any(|s| s.fails_total()) {
        return RecordResult::Fail;
    }
    RecordResult::Pass
}

/// Subjects failed for division purposes. An absent component never meets a
/// minimum, so it fails the subject even when the minimums are 0.
pub fn division_failed_count(scores: &[SubjectScore<'_>]) -> usize {
    scores
        .iter()
        .filter(|s| s.has_absence() || s.fails_total())
        .count()
}

pub fn division_classification(scores: &[SubjectScore<'_>]) -> Division {
    match division_failed_count(scores) {
        0 => Division::Pass,
        1 | 2 => Division::Supply,
        _ => Division::Fail,
    }
}

pub fn subject_outcome(score: &SubjectScore<'_>) -> SubjectOutcome {
    match (score.internal, score.external) {
        (MarkValue::Marks(i), MarkValue::Marks(e)) => {
            if i >= score.def.internal_min && e >= score.def.external_min {
                SubjectOutcome::Pass
            } else {
                SubjectOutcome::Fail
            }
        }
        _ => SubjectOutcome::Absent,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectResult {
    pub subject: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub internal: MarkValue,
    pub external: MarkValue,
    pub total: f64,
    pub display_total: DisplayTotal,
    pub max_total: f64,
    #[serde(serialize_with = "serialize_2dp")]
    pub percentage: f64,
    pub has_absence: bool,
    pub failed: bool,
    pub outcome: SubjectOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResult {
    pub roll_no: String,
    pub enrollment_no: String,
    pub name: String,
    pub withheld: bool,
    pub total: f64,
    pub max_total: f64,
    #[serde(serialize_with = "serialize_2dp")]
    pub percentage: f64,
    pub record_result: RecordResult,
    pub division_classification: Division,
    pub failed_subjects: usize,
    pub per_subject: Vec<SubjectResult>,
}

/// Pair every mark entry of `record` with its definition, re-checking the marks
/// against the current bounds. A subject without a definition is an error.
pub fn subject_scores<'a>(
    record: &StudentResultRecord,
    defs: &'a [SubjectDefinition],
) -> EngineResult<Vec<SubjectScore<'a>>> {
    let by_name: HashMap<&str, &SubjectDefinition> =
        defs.iter().map(|d| (d.name.as_str(), d)).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut scores = Vec::with_capacity(record.marks.len());
    for entry in &record.marks {
        if !seen.insert(entry.subject.as_str()) {
            return Err(ValidationError::DuplicateSubject {
                subject: entry.subject.clone(),
            }
            .into());
        }
        let Some(def) = by_name.get(entry.subject.as_str()).copied() else {
            return Err(EngineError::Computation(format!(
                "record {} in {} references subject {} with no definition",
                record.student.roll_no, record.key, entry.subject
            )));
        };
        validate_subject_definition(def)?;
        let internal = check_mark_value(def, MarkComponent::Internal, entry.internal)?;
        let external = check_mark_value(def, MarkComponent::External, entry.external)?;
        scores.push(SubjectScore {
            def,
            internal,
            external,
        });
    }
    Ok(scores)
}

pub fn compute_student_result(
    record: &StudentResultRecord,
    defs: &[SubjectDefinition],
) -> EngineResult<StudentResult> {
    let scores = subject_scores(record, defs)?;

    let total: f64 = scores.iter().map(|s| s.total()).sum();
    let max_total: f64 = scores.iter().map(|s| s.def.max_total()).sum();
    if max_total <= 0.0 {
        return Err(EngineError::Computation(format!(
            "record {} in {} has a maximum total of 0; percentage is undefined",
            record.student.roll_no, record.key
        )));
    }
    let percentage = 100.0 * total / max_total;

    let per_subject = scores
        .iter()
        .map(|s| SubjectResult {
            subject: s.def.name.clone(),
            subject_type: s.def.subject_type,
            internal: s.internal,
            external: s.external,
            total: s.total(),
            display_total: s.display_total(),
            max_total: s.def.max_total(),
            percentage: s.percentage(),
            has_absence: s.has_absence(),
            failed: s.fails_total(),
            outcome: subject_outcome(s),
        })
        .collect();

    Ok(StudentResult {
        roll_no: record.student.roll_no.clone(),
        enrollment_no: record.student.enrollment_no.clone(),
        name: record.student.name.clone(),
        withheld: record.withheld,
        total,
        max_total,
        percentage,
        record_result: record_result(&scores),
        division_classification: division_classification(&scores),
        failed_subjects: division_failed_count(&scores),
        per_subject,
    })
}
