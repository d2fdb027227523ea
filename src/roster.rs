use crate::calc::{compute_student_result, round_2_decimals, serialize_2dp, Division, StudentResult};
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::model::{RosterKey, StudentIdentity, StudentResultRecord, SubjectDefinition};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_SUPPORT_THRESHOLD: f64 = 70.0;
pub const DEFAULT_TOP_COUNT: usize = 3;

/// Tunables for roster analytics, stored per workspace.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsConfig {
    /// Members strictly below this percentage need support.
    pub support_threshold: f64,
    /// Length cap for the top-performer and needs-improvement lists.
    pub top_count: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            support_threshold: DEFAULT_SUPPORT_THRESHOLD,
            top_count: DEFAULT_TOP_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distribution {
    pub pass: usize,
    pub supply: usize,
    pub fail: usize,
}

impl Distribution {
    fn add(&mut self, division: Division) {
        match division {
            Division::Pass => self.pass += 1,
            Division::Supply => self.supply += 1,
            Division::Fail => self.fail += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformerEntry {
    pub roll_no: String,
    pub name: String,
    #[serde(serialize_with = "serialize_2dp")]
    pub percentage: f64,
    pub division: Division,
    pub withheld: bool,
}

impl PerformerEntry {
    fn from_result(r: &StudentResult) -> Self {
        Self {
            roll_no: r.roll_no.clone(),
            name: r.name.clone(),
            percentage: r.percentage,
            division: r.division_classification,
            withheld: r.withheld,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectPerformance {
    pub subject: String,
    pub average: f64,
    pub student_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterAnalytics {
    #[serde(flatten)]
    pub key: RosterKey,
    /// Members with at least one mark entry; the statistics cover only these.
    pub student_count: usize,
    pub no_data_count: usize,
    pub no_data_roll_nos: Vec<String>,
    pub withheld_count: usize,
    pub class_average: f64,
    pub top_score: f64,
    pub need_support: usize,
    pub support_threshold: f64,
    pub distribution: Distribution,
    pub top_performers: Vec<PerformerEntry>,
    pub needs_improvement: Vec<PerformerEntry>,
    pub subject_performance: Vec<SubjectPerformance>,
}

/// Aggregate one roster snapshot. Iteration order is the order of `records`;
/// roll-list students without a record only count towards `noDataCount`.
pub fn compute_roster_analytics(
    key: &RosterKey,
    records: &[StudentResultRecord],
    defs: &[SubjectDefinition],
    roll: &[StudentIdentity],
    config: &AnalyticsConfig,
) -> EngineResult<RosterAnalytics> {
    if records.is_empty() && roll.is_empty() {
        return Err(EngineError::NotFound(format!("no roster for {}", key)));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for r in records {
        if r.key != *key {
            return Err(ValidationError::MixedRoster {
                roll_no: r.student.roll_no.clone(),
                expected: key.to_string(),
                found: r.key.to_string(),
            }
            .into());
        }
        if !seen.insert(r.student.roll_no.as_str()) {
            return Err(ValidationError::DuplicateRollNo {
                roll_no: r.student.roll_no.clone(),
            }
            .into());
        }
    }

    let mut no_data_roll_nos: Vec<String> = Vec::new();
    let mut results: Vec<StudentResult> = Vec::new();
    for r in records {
        if r.marks.is_empty() {
            no_data_roll_nos.push(r.student.roll_no.clone());
            continue;
        }
        results.push(compute_student_result(r, defs)?);
    }
    for s in roll {
        if !seen.contains(s.roll_no.as_str()) {
            no_data_roll_nos.push(s.roll_no.clone());
        }
    }

    let withheld_count = records.iter().filter(|r| r.withheld).count();
    let threshold = config.support_threshold;

    let class_average = if results.is_empty() {
        0.0
    } else {
        results.iter().map(|r| r.percentage).sum::<f64>() / (results.len() as f64)
    };
    let top_score = results
        .iter()
        .map(|r| r.percentage)
        .fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.max(p))))
        .unwrap_or(0.0);
    let need_support = results.iter().filter(|r| r.percentage < threshold).count();

    let mut distribution = Distribution::default();
    for r in &results {
        distribution.add(r.division_classification);
    }

    // Stable sort keeps roster order among equal percentages.
    let mut passed: Vec<&StudentResult> = results
        .iter()
        .filter(|r| r.division_classification == Division::Pass)
        .collect();
    passed.sort_by(|a, b| {
        b.percentage
            .partial_cmp(&a.percentage)
            .unwrap_or(Ordering::Equal)
    });
    let top_performers = passed
        .into_iter()
        .take(config.top_count)
        .map(PerformerEntry::from_result)
        .collect();

    let needs_improvement = results
        .iter()
        .filter(|r| r.percentage < threshold && r.division_classification != Division::Fail)
        .take(config.top_count)
        .map(PerformerEntry::from_result)
        .collect();

    Ok(RosterAnalytics {
        key: key.clone(),
        student_count: results.len(),
        no_data_count: no_data_roll_nos.len(),
        no_data_roll_nos,
        withheld_count,
        class_average: round_2_decimals(class_average),
        top_score: round_2_decimals(top_score),
        need_support,
        support_threshold: threshold,
        distribution,
        top_performers,
        needs_improvement,
        subject_performance: subject_performance(&results),
    })
}

/// Mean subject percentage per subject name, highest first. Ties keep the
/// order in which subjects first appear in the roster.
fn subject_performance(results: &[StudentResult]) -> Vec<SubjectPerformance> {
    let mut order: Vec<&str> = Vec::new();
    let mut sums: HashMap<&str, (f64, usize)> = HashMap::new();
    for r in results {
        for s in &r.per_subject {
            let entry = sums.entry(s.subject.as_str()).or_insert_with(|| {
                order.push(s.subject.as_str());
                (0.0, 0)
            });
            entry.0 += s.percentage;
            entry.1 += 1;
        }
    }

    let mut out: Vec<SubjectPerformance> = order
        .into_iter()
        .filter_map(|name| {
            let (sum, count) = sums.get(name).copied()?;
            Some(SubjectPerformance {
                subject: name.to_string(),
                average: round_2_decimals(sum / (count as f64)),
                student_count: count,
            })
        })
        .collect();
    out.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MarkEntry, MarkValue, SubjectType};

    fn key() -> RosterKey {
        RosterKey::new("BCA", 2, "2024-25")
    }

    fn def(name: &str, imin: f64, imax: f64, emin: f64, emax: f64) -> SubjectDefinition {
        SubjectDefinition {
            name: name.into(),
            subject_type: SubjectType::Theory,
            internal_min: imin,
            internal_max: imax,
            external_min: emin,
            external_max: emax,
        }
    }

    fn ident(roll: &str, name: &str) -> StudentIdentity {
        StudentIdentity {
            roll_no: roll.into(),
            enrollment_no: format!("EN{}", roll),
            name: name.into(),
        }
    }

    fn rec(roll: &str, name: &str, marks: &[(&str, f64, f64)]) -> StudentResultRecord {
        StudentResultRecord {
            key: key(),
            student: ident(roll, name),
            marks: marks
                .iter()
                .map(|(s, i, e)| MarkEntry {
                    subject: s.to_string(),
                    internal: MarkValue::Marks(*i),
                    external: MarkValue::Marks(*e),
                })
                .collect(),
            withheld: false,
        }
    }

    #[test]
    fn class_average_top_score_and_need_support() {
        let defs = vec![def("Maths", 0.0, 20.0, 0.0, 80.0)];
        let records = vec![
            rec("1", "A", &[("Maths", 10.0, 30.0)]),
            rec("2", "B", &[("Maths", 15.0, 40.0)]),
            rec("3", "C", &[("Maths", 20.0, 50.0)]),
            rec("4", "D", &[("Maths", 15.0, 70.0)]),
            rec("5", "E", &[("Maths", 15.0, 80.0)]),
        ];
        let a = compute_roster_analytics(&key(), &records, &defs, &[], &AnalyticsConfig::default())
            .unwrap();
        assert_eq!(a.class_average, 69.0);
        assert_eq!(a.top_score, 95.0);
        assert_eq!(a.need_support, 2);
        let d = &a.distribution;
        assert_eq!(d.pass + d.supply + d.fail, 5);
        assert_eq!(a.distribution.pass, 5);
        let top: Vec<&str> = a.top_performers.iter().map(|p| p.roll_no.as_str()).collect();
        assert_eq!(top, vec!["5", "4", "3"]);
        let low: Vec<&str> = a.needs_improvement.iter().map(|p| p.roll_no.as_str()).collect();
        assert_eq!(low, vec!["1", "2"]);
    }

    fn mixed_roster() -> (Vec<SubjectDefinition>, Vec<StudentResultRecord>, Vec<StudentIdentity>) {
        let defs = vec![
            def("S1", 8.0, 20.0, 32.0, 80.0),
            def("S2", 8.0, 20.0, 32.0, 80.0),
            def("S3", 8.0, 20.0, 32.0, 80.0),
        ];
        let good = [("S1", 18.0, 70.0), ("S2", 18.0, 70.0), ("S3", 18.0, 70.0)];
        let records = vec![
            rec("R1", "Asha", &good),
            rec(
                "R2",
                "Bala",
                &[("S1", 10.0, 20.0), ("S2", 15.0, 50.0), ("S3", 15.0, 50.0)],
            ),
            rec(
                "R3",
                "Chen",
                &[("S1", 5.0, 10.0), ("S2", 5.0, 10.0), ("S3", 5.0, 10.0)],
            ),
            rec("R4", "Dev", &good),
            rec(
                "R5",
                "Esha",
                &[("S1", 15.0, 45.0), ("S2", 15.0, 45.0), ("S3", 15.0, 45.0)],
            ),
            rec("R6", "Farid", &[]),
        ];
        let roll = vec![
            ident("R1", "Asha"),
            ident("R2", "Bala"),
            ident("R7", "Gita"),
        ];
        (defs, records, roll)
    }

    #[test]
    fn distribution_lists_and_subject_performance() {
        let (defs, records, roll) = mixed_roster();
        let a = compute_roster_analytics(&key(), &records, &defs, &roll, &AnalyticsConfig::default())
            .unwrap();

        assert_eq!(a.student_count, 5);
        assert_eq!(a.no_data_count, 2);
        assert_eq!(a.no_data_roll_nos, vec!["R6".to_string(), "R7".to_string()]);
        assert_eq!(
            a.distribution,
            Distribution {
                pass: 3,
                supply: 1,
                fail: 1
            }
        );
        let d = &a.distribution;
        assert_eq!(d.pass + d.supply + d.fail, a.student_count);
        assert_eq!(a.class_average, 60.87);
        assert_eq!(a.top_score, 88.0);
        assert_eq!(a.need_support, 3);

        let top: Vec<&str> = a.top_performers.iter().map(|p| p.roll_no.as_str()).collect();
        assert_eq!(top, vec!["R1", "R4", "R5"]);
        // Roster order, not sorted; the FAIL division member is left out.
        let low: Vec<&str> = a.needs_improvement.iter().map(|p| p.roll_no.as_str()).collect();
        assert_eq!(low, vec!["R2", "R5"]);

        let subjects: Vec<(&str, f64)> = a
            .subject_performance
            .iter()
            .map(|s| (s.subject.as_str(), s.average))
            .collect();
        assert_eq!(subjects, vec![("S2", 63.2), ("S3", 63.2), ("S1", 56.2)]);
        assert!(a.subject_performance.iter().all(|s| s.student_count == 5));
    }

    #[test]
    fn config_controls_threshold_and_list_length() {
        let (defs, records, roll) = mixed_roster();
        let config = AnalyticsConfig {
            support_threshold: 50.0,
            top_count: 1,
        };
        let a = compute_roster_analytics(&key(), &records, &defs, &roll, &config).unwrap();
        assert_eq!(a.need_support, 1);
        assert_eq!(a.top_performers.len(), 1);
        assert!(a.needs_improvement.is_empty());
    }

    #[test]
    fn empty_roster_is_not_found() {
        let err =
            compute_roster_analytics(&key(), &[], &[], &[], &AnalyticsConfig::default()).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn roll_only_roster_reports_no_data() {
        let roll = vec![ident("R1", "Asha")];
        let a = compute_roster_analytics(&key(), &[], &[], &roll, &AnalyticsConfig::default())
            .unwrap();
        assert_eq!(a.student_count, 0);
        assert_eq!(a.no_data_count, 1);
        assert_eq!(a.class_average, 0.0);
        assert!(a.subject_performance.is_empty());
    }

    #[test]
    fn duplicate_roll_numbers_are_rejected() {
        let defs = vec![def("Maths", 0.0, 20.0, 0.0, 80.0)];
        let records = vec![
            rec("1", "A", &[("Maths", 10.0, 30.0)]),
            rec("1", "A again", &[("Maths", 15.0, 40.0)]),
        ];
        let err = compute_roster_analytics(&key(), &records, &defs, &[], &AnalyticsConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), "validation_failed");
    }

    #[test]
    fn records_from_another_roster_are_rejected() {
        let defs = vec![def("Maths", 0.0, 20.0, 0.0, 80.0)];
        let mut other = rec("1", "A", &[("Maths", 10.0, 30.0)]);
        other.key.semester = 4;
        let err = compute_roster_analytics(&key(), &[other], &defs, &[], &AnalyticsConfig::default())
            .unwrap_err();
        assert!(err.to_string().contains("sem4"));
    }

    #[test]
    fn member_computation_errors_propagate() {
        let defs = vec![def("Maths", 0.0, 20.0, 0.0, 80.0)];
        let records = vec![
            rec("1", "A", &[("Maths", 10.0, 30.0)]),
            rec("2", "B", &[("History", 10.0, 30.0)]),
        ];
        let err = compute_roster_analytics(&key(), &records, &defs, &[], &AnalyticsConfig::default())
            .unwrap_err();
        assert_eq!(err.code(), "computation_failed");
    }
}
