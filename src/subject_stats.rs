use crate::calc::{round_2_decimals, subject_outcome, SubjectOutcome, SubjectScore};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{
    DisplayTotal, MarkComponent, MarkValue, StudentIdentity, StudentResultRecord,
    SubjectDefinition, SubjectType,
};
use crate::validate::check_mark_value;
use serde::Serialize;

/// One student's marks in one subject, with the definition they are judged by.
#[derive(Debug, Clone, Copy)]
pub struct SubjectEntry<'a> {
    pub student: &'a StudentIdentity,
    pub def: &'a SubjectDefinition,
    pub internal: MarkValue,
    pub external: MarkValue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStudentRow {
    pub roll_no: String,
    pub name: String,
    pub internal: MarkValue,
    pub external: MarkValue,
    pub total: DisplayTotal,
    pub outcome: SubjectOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStatistics {
    pub subject: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub total_students: usize,
    pub passed_students: usize,
    pub failed_students: usize,
    pub absent_students: usize,
    pub class_average: f64,
    pub pass_percentage: u32,
    pub students: Vec<SubjectStudentRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectOverview {
    pub subjects: Vec<SubjectStatistics>,
    pub subjects_without_marks: Vec<String>,
}

pub fn compute_subject_statistics(
    subject_name: &str,
    entries: &[SubjectEntry<'_>],
) -> EngineResult<SubjectStatistics> {
    let Some(first) = entries.first() else {
        return Err(EngineError::NotFound(format!(
            "no marks recorded for subject {}",
            subject_name
        )));
    };
    let def = first.def;

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut absent = 0usize;
    let mut numeric_sum = 0.0_f64;
    let mut rows = Vec::with_capacity(entries.len());

    for e in entries {
        if e.def.name != subject_name {
            return Err(ValidationError::BadField {
                field: "entries".to_string(),
                reason: format!(
                    "entry for {} is for subject {}, expected {}",
                    e.student.roll_no, e.def.name, subject_name
                ),
            }
            .into());
        }
        let score = SubjectScore {
            def: e.def,
            internal: check_mark_value(e.def, MarkComponent::Internal, e.internal)?,
            external: check_mark_value(e.def, MarkComponent::External, e.external)?,
        };
        let outcome = subject_outcome(&score);
        match outcome {
            SubjectOutcome::Pass => passed += 1,
            SubjectOutcome::Fail => failed += 1,
            SubjectOutcome::Absent => absent += 1,
        }
        let total = if outcome == SubjectOutcome::Absent {
            DisplayTotal::Absent
        } else {
            numeric_sum += score.total();
            DisplayTotal::Marks(score.total())
        };
        rows.push(SubjectStudentRow {
            roll_no: e.student.roll_no.clone(),
            name: e.student.name.clone(),
            internal: score.internal,
            external: score.external,
            total,
            outcome,
        });
    }

    let total_students = entries.len();
    let present = total_students - absent;
    let class_average = if present > 0 {
        round_2_decimals(numeric_sum / (present as f64))
    } else {
        0.0
    };
    // Absentees stay in the denominator.
    let pass_percentage = (100.0 * (passed as f64) / (total_students as f64)).round() as u32;

    Ok(SubjectStatistics {
        subject: subject_name.to_string(),
        subject_type: def.subject_type,
        total_students,
        passed_students: passed,
        failed_students: failed,
        absent_students: absent,
        class_average,
        pass_percentage,
        students: rows,
    })
}

/// Collect the entries for `subject_name` from a roster's records, in record order.
pub fn subject_entries<'a>(
    subject_name: &str,
    records: &'a [StudentResultRecord],
    defs: &'a [SubjectDefinition],
) -> EngineResult<Vec<SubjectEntry<'a>>> {
    let def = defs.iter().find(|d| d.name == subject_name);
    let mut entries = Vec::new();
    for r in records {
        let Some(mark) = r.mark_for(subject_name) else {
            continue;
        };
        let Some(def) = def else {
            return Err(EngineError::Computation(format!(
                "record {} in {} references subject {} with no definition",
                r.student.roll_no, r.key, subject_name
            )));
        };
        entries.push(SubjectEntry {
            student: &r.student,
            def,
            internal: mark.internal,
            external: mark.external,
        });
    }
    Ok(entries)
}

pub fn compute_subject_statistics_for_roster(
    subject_name: &str,
    records: &[StudentResultRecord],
    defs: &[SubjectDefinition],
) -> EngineResult<SubjectStatistics> {
    let entries = subject_entries(subject_name, records, defs)?;
    compute_subject_statistics(subject_name, &entries)
}

/// Statistics for every defined subject that has marks, in definition order.
pub fn compute_all_subject_statistics(
    records: &[StudentResultRecord],
    defs: &[SubjectDefinition],
) -> EngineResult<SubjectOverview> {
    for r in records {
        if let Some(m) = r
            .marks
            .iter()
            .find(|m| !defs.iter().any(|d| d.name == m.subject))
        {
            return Err(EngineError::Computation(format!(
                "record {} in {} references subject {} with no definition",
                r.student.roll_no, r.key, m.subject
            )));
        }
    }

    let mut subjects = Vec::new();
    let mut subjects_without_marks = Vec::new();
    for d in defs {
        let entries = subject_entries(&d.name, records, defs)?;
        if entries.is_empty() {
            subjects_without_marks.push(d.name.clone());
            continue;
        }
        subjects.push(compute_subject_statistics(&d.name, &entries)?);
    }
    Ok(SubjectOverview {
        subjects,
        subjects_without_marks,
    })
}
