//! Store-backed entry points. Each call reads a fresh snapshot, so nothing
//! derived ever outlives the marks it was computed from.

use crate::calc::{compute_student_result, StudentResult};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{RosterKey, StudentIdentity, StudentResultRecord, SubjectDefinition};
use crate::roster::{compute_roster_analytics, AnalyticsConfig, RosterAnalytics};
use crate::store::{RecordFilters, RosterStore, UpsertOutcome};
use crate::subject_stats::{
    compute_all_subject_statistics, compute_subject_statistics_for_roster, SubjectOverview,
    SubjectStatistics,
};
use crate::validate::{normalize_identity, validate_roster_key, validate_submission, Submission};
use serde::Serialize;
use std::collections::HashSet;

/// A stored record next to its derived result. `result` is absent for a
/// record without mark entries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub record: StudentResultRecord,
    pub result: Option<StudentResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReport {
    pub replaced: bool,
    pub record: StudentResultRecord,
    pub result: Option<StudentResult>,
}

fn derive_result(
    record: &StudentResultRecord,
    defs: &[SubjectDefinition],
) -> EngineResult<Option<StudentResult>> {
    if record.marks.is_empty() {
        return Ok(None);
    }
    compute_student_result(record, defs).map(Some)
}

/// Validate a submission against the stored definitions, then store it whole.
pub fn submit_result<S: RosterStore + ?Sized>(
    store: &S,
    submission: &Submission,
) -> EngineResult<SubmitReport> {
    validate_roster_key(&submission.key)?;
    let defs = store.subject_definitions(&submission.key)?;
    let record = validate_submission(submission, &defs)?;
    // Computed before the write so an uncomputable record is never stored.
    let result = derive_result(&record, &defs)?;
    let outcome = store.upsert_student_result_record(&record)?;
    tracing::info!(
        roster = %record.key,
        roll_no = %record.student.roll_no,
        replaced = outcome == UpsertOutcome::Replaced,
        "result record stored"
    );
    Ok(SubmitReport {
        replaced: outcome == UpsertOutcome::Replaced,
        record,
        result,
    })
}

pub fn get_result<S: RosterStore + ?Sized>(
    store: &S,
    key: &RosterKey,
    roll_no: &str,
) -> EngineResult<ResultView> {
    let filters = RecordFilters {
        roll_no: Some(roll_no.to_string()),
        ..RecordFilters::default()
    };
    let Some(record) = store.student_result_records(key, &filters)?.into_iter().next() else {
        return Err(EngineError::NotFound(format!(
            "no record for roll {} in {}",
            roll_no, key
        )));
    };
    let defs = store.subject_definitions(key)?;
    let result = derive_result(&record, &defs)?;
    Ok(ResultView { record, result })
}

pub fn list_results<S: RosterStore + ?Sized>(
    store: &S,
    key: &RosterKey,
    filters: &RecordFilters,
) -> EngineResult<Vec<ResultView>> {
    let defs = store.subject_definitions(key)?;
    store
        .student_result_records(key, filters)?
        .into_iter()
        .map(|record| {
            let result = derive_result(&record, &defs)?;
            Ok(ResultView { record, result })
        })
        .collect()
}

pub fn roster_analytics<S: RosterStore + ?Sized>(
    store: &S,
    key: &RosterKey,
    config: &AnalyticsConfig,
) -> EngineResult<RosterAnalytics> {
    let roster = store.roster_snapshot(key)?;
    let analytics = compute_roster_analytics(
        &roster.key,
        &roster.records,
        &roster.subjects,
        &roster.roll,
        config,
    )?;
    tracing::debug!(
        roster = %key,
        students = analytics.student_count,
        no_data = analytics.no_data_count,
        "roster analytics computed"
    );
    Ok(analytics)
}

pub fn subject_statistics<S: RosterStore + ?Sized>(
    store: &S,
    key: &RosterKey,
    subject: &str,
) -> EngineResult<SubjectStatistics> {
    let defs = store.subject_definitions(key)?;
    let records = store.student_result_records(key, &RecordFilters::default())?;
    let stats = compute_subject_statistics_for_roster(subject, &records, &defs)?;
    tracing::debug!(roster = %key, subject, students = stats.total_students, "subject statistics computed");
    Ok(stats)
}

pub fn all_subject_statistics<S: RosterStore + ?Sized>(
    store: &S,
    key: &RosterKey,
) -> EngineResult<SubjectOverview> {
    let defs = store.subject_definitions(key)?;
    let records = store.student_result_records(key, &RecordFilters::default())?;
    if defs.is_empty() && records.is_empty() {
        return Err(EngineError::NotFound(format!("no roster for {}", key)));
    }
    compute_all_subject_statistics(&records, &defs)
}

/// Trim and check a roll list before it replaces the stored one.
pub fn normalize_roll_list(
    students: &[StudentIdentity],
) -> Result<Vec<StudentIdentity>, ValidationError> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(students.len());
    for s in students {
        let s = normalize_identity(s)?;
        if !seen.insert(s.roll_no.clone()) {
            return Err(ValidationError::DuplicateRollNo { roll_no: s.roll_no });
        }
        out.push(s);
    }
    Ok(out)
}
