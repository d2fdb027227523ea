use crate::error::{EngineError, EngineResult};
use crate::model::{
    MarkEntry, MarkValue, RosterKey, StudentIdentity, StudentResultRecord, SubjectDefinition,
    SubjectType,
};
use crate::store::{RecordFilters, RosterStore, UpsertOutcome};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE_NAME: &str = "results.sqlite3";

const STATUS_SCORED: &str = "scored";
const STATUS_ABSENT: &str = "absent";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            semester INTEGER NOT NULL,
            session TEXT NOT NULL,
            name TEXT NOT NULL,
            subject_type TEXT NOT NULL,
            internal_min REAL NOT NULL,
            internal_max REAL NOT NULL,
            external_min REAL NOT NULL,
            external_max REAL NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(course, semester, session, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_roster ON subjects(course, semester, session)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS roll_students(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            semester INTEGER NOT NULL,
            session TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            enrollment_no TEXT NOT NULL,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            UNIQUE(course, semester, session, roll_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_roll_students_roster ON roll_students(course, semester, session, sort_order)",
        [],
    )?;

    // Derived values (total, percentage, classification) are never stored.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_records(
            id TEXT PRIMARY KEY,
            course TEXT NOT NULL,
            semester INTEGER NOT NULL,
            session TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            enrollment_no TEXT NOT NULL,
            student_name TEXT NOT NULL,
            withheld INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE(course, semester, session, roll_no)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_records_roster ON result_records(course, semester, session)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS result_marks(
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            idx INTEGER NOT NULL,
            subject_name TEXT NOT NULL,
            internal_value REAL,
            internal_status TEXT NOT NULL,
            external_value REAL,
            external_status TEXT NOT NULL,
            FOREIGN KEY(record_id) REFERENCES result_records(id) ON DELETE CASCADE,
            UNIQUE(record_id, subject_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_result_marks_record ON result_marks(record_id, idx)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

fn mark_to_columns(v: MarkValue) -> (Option<f64>, &'static str) {
    match v {
        MarkValue::Absent => (None, STATUS_ABSENT),
        MarkValue::Marks(x) => (Some(x), STATUS_SCORED),
    }
}

fn mark_from_columns(value: Option<f64>, status: &str) -> EngineResult<MarkValue> {
    match (status, value) {
        (STATUS_ABSENT, _) => Ok(MarkValue::Absent),
        (STATUS_SCORED, Some(v)) => Ok(MarkValue::Marks(v)),
        (STATUS_SCORED, None) => Err(EngineError::Storage(
            "scored mark row has no value".to_string(),
        )),
        (other, _) => Err(EngineError::Storage(format!(
            "unknown mark status: {}",
            other
        ))),
    }
}

pub fn upsert_subject(
    conn: &Connection,
    key: &RosterKey,
    def: &SubjectDefinition,
) -> EngineResult<()> {
    // Existing subjects keep their position; new ones go last.
    conn.execute(
        "INSERT INTO subjects(id, course, semester, session, name, subject_type,
                              internal_min, internal_max, external_min, external_max, sort_order)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                (SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subjects
                 WHERE course = ?2 AND semester = ?3 AND session = ?4))
         ON CONFLICT(course, semester, session, name) DO UPDATE SET
           subject_type = excluded.subject_type,
           internal_min = excluded.internal_min,
           internal_max = excluded.internal_max,
           external_min = excluded.external_min,
           external_max = excluded.external_max",
        params![
            Uuid::new_v4().to_string(),
            key.course,
            key.semester,
            key.session,
            def.name,
            def.subject_type.as_str(),
            def.internal_min,
            def.internal_max,
            def.external_min,
            def.external_max,
        ],
    )?;
    Ok(())
}

pub fn delete_subject(conn: &Connection, key: &RosterKey, name: &str) -> EngineResult<bool> {
    let n = conn.execute(
        "DELETE FROM subjects WHERE course = ? AND semester = ? AND session = ? AND name = ?",
        params![key.course, key.semester, key.session, name],
    )?;
    Ok(n > 0)
}

/// Replace the roll list of a roster; list order becomes roster order.
pub fn replace_roll_list(
    conn: &Connection,
    key: &RosterKey,
    students: &[StudentIdentity],
) -> EngineResult<usize> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM roll_students WHERE course = ? AND semester = ? AND session = ?",
        params![key.course, key.semester, key.session],
    )?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO roll_students(id, course, semester, session, roll_no, enrollment_no, name, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (i, s) in students.iter().enumerate() {
            stmt.execute(params![
                Uuid::new_v4().to_string(),
                key.course,
                key.semester,
                key.session,
                s.roll_no,
                s.enrollment_no,
                s.name,
                i as i64,
            ])?;
        }
    }
    tx.commit()?;
    Ok(students.len())
}

/// Literal, case-insensitive substring match on name or roll number.
fn matches_search(student: &StudentIdentity, search: &str) -> bool {
    let needle = search.to_lowercase();
    student.name.to_lowercase().contains(&needle)
        || student.roll_no.to_lowercase().contains(&needle)
}

pub fn delete_record(conn: &Connection, key: &RosterKey, roll_no: &str) -> EngineResult<bool> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM result_marks WHERE record_id IN (
           SELECT id FROM result_records
           WHERE course = ? AND semester = ? AND session = ? AND roll_no = ?
         )",
        params![key.course, key.semester, key.session, roll_no],
    )?;
    let n = tx.execute(
        "DELETE FROM result_records WHERE course = ? AND semester = ? AND session = ? AND roll_no = ?",
        params![key.course, key.semester, key.session, roll_no],
    )?;
    tx.commit()?;
    Ok(n > 0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterSummary {
    #[serde(flatten)]
    pub key: RosterKey,
    pub record_count: i64,
    pub roll_count: i64,
    pub subject_count: i64,
}

pub fn list_rosters(conn: &Connection) -> EngineResult<Vec<RosterSummary>> {
    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = conn.prepare(
        "SELECT
           k.course,
           k.semester,
           k.session,
           (SELECT COUNT(*) FROM result_records r
            WHERE r.course = k.course AND r.semester = k.semester AND r.session = k.session),
           (SELECT COUNT(*) FROM roll_students s
            WHERE s.course = k.course AND s.semester = k.semester AND s.session = k.session),
           (SELECT COUNT(*) FROM subjects d
            WHERE d.course = k.course AND d.semester = k.semester AND d.session = k.session)
         FROM (
           SELECT course, semester, session FROM result_records
           UNION SELECT course, semester, session FROM roll_students
           UNION SELECT course, semester, session FROM subjects
         ) k
         ORDER BY k.course, k.semester, k.session",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok(RosterSummary {
                key: RosterKey {
                    course: r.get(0)?,
                    semester: r.get(1)?,
                    session: r.get(2)?,
                },
                record_count: r.get(3)?,
                roll_count: r.get(4)?,
                subject_count: r.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl RosterStore for Connection {
    fn subject_definitions(&self, key: &RosterKey) -> EngineResult<Vec<SubjectDefinition>> {
        let mut stmt = self.prepare(
            "SELECT name, subject_type, internal_min, internal_max, external_min, external_max
             FROM subjects
             WHERE course = ? AND semester = ? AND session = ?
             ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map(params![key.course, key.semester, key.session], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, f64>(2)?,
                    r.get::<_, f64>(3)?,
                    r.get::<_, f64>(4)?,
                    r.get::<_, f64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (name, type_raw, imin, imax, emin, emax) in rows {
            let Some(subject_type) = SubjectType::parse(&type_raw) else {
                return Err(EngineError::Storage(format!(
                    "subject {} has unknown type {}",
                    name, type_raw
                )));
            };
            out.push(SubjectDefinition {
                name,
                subject_type,
                internal_min: imin,
                internal_max: imax,
                external_min: emin,
                external_max: emax,
            });
        }
        Ok(out)
    }

    fn student_result_records(
        &self,
        key: &RosterKey,
        filters: &RecordFilters,
    ) -> EngineResult<Vec<StudentResultRecord>> {
        let mut sql = String::from(
            "SELECT r.id, r.roll_no, r.enrollment_no, r.student_name, r.withheld
             FROM result_records r
             LEFT JOIN roll_students rs
               ON rs.course = r.course AND rs.semester = r.semester
              AND rs.session = r.session AND rs.roll_no = r.roll_no
             WHERE r.course = ? AND r.semester = ? AND r.session = ?",
        );
        let mut binds: Vec<Value> = vec![
            Value::Text(key.course.clone()),
            Value::Integer(key.semester),
            Value::Text(key.session.clone()),
        ];
        if let Some(roll_no) = &filters.roll_no {
            sql.push_str(" AND r.roll_no = ?");
            binds.push(Value::Text(roll_no.clone()));
        }
        if let Some(withheld) = filters.withheld {
            sql.push_str(" AND r.withheld = ?");
            binds.push(Value::Integer(withheld as i64));
        }
        if let Some(subject) = &filters.subject {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM result_marks m WHERE m.record_id = r.id AND m.subject_name = ?)",
            );
            binds.push(Value::Text(subject.clone()));
        }
        // Roll-list order first, then records outside the roll list by first submission.
        sql.push_str(" ORDER BY COALESCE(rs.sort_order, 9223372036854775807), r.rowid");

        let mut stmt = self.prepare(&sql)?;
        let heads = stmt
            .query_map(params_from_iter(binds), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    StudentIdentity {
                        roll_no: r.get(1)?,
                        enrollment_no: r.get(2)?,
                        name: r.get(3)?,
                    },
                    r.get::<_, i64>(4)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Search matches with Unicode case folding; `%` and `_` stay literal.
        let heads: Vec<_> = match &filters.search {
            Some(search) => heads
                .into_iter()
                .filter(|(_, student, _)| matches_search(student, search))
                .collect(),
            None => heads,
        };
        if heads.is_empty() {
            return Ok(Vec::new());
        }

        let mut marks_by_record: HashMap<String, Vec<MarkEntry>> = HashMap::new();
        let mut marks_stmt = self.prepare(
            "SELECT m.record_id, m.subject_name, m.internal_value, m.internal_status,
                    m.external_value, m.external_status
             FROM result_marks m
             JOIN result_records r ON r.id = m.record_id
             WHERE r.course = ? AND r.semester = ? AND r.session = ?
             ORDER BY m.record_id, m.idx",
        )?;
        let mark_rows = marks_stmt
            .query_map(params![key.course, key.semester, key.session], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<f64>>(4)?,
                    r.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (record_id, subject, iv, is, ev, es) in mark_rows {
            let entry = MarkEntry {
                subject,
                internal: mark_from_columns(iv, &is)?,
                external: mark_from_columns(ev, &es)?,
            };
            marks_by_record.entry(record_id).or_default().push(entry);
        }

        Ok(heads
            .into_iter()
            .map(|(id, student, withheld)| StudentResultRecord {
                key: key.clone(),
                student,
                marks: marks_by_record.remove(&id).unwrap_or_default(),
                withheld,
            })
            .collect())
    }

    fn upsert_student_result_record(
        &self,
        record: &StudentResultRecord,
    ) -> EngineResult<UpsertOutcome> {
        let key = &record.key;
        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.unchecked_transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM result_records
                 WHERE course = ? AND semester = ? AND session = ? AND roll_no = ?",
                params![key.course, key.semester, key.session, record.student.roll_no],
                |r| r.get(0),
            )
            .optional()?;

        let (record_id, outcome) = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE result_records
                     SET enrollment_no = ?, student_name = ?, withheld = ?, updated_at = ?
                     WHERE id = ?",
                    params![
                        record.student.enrollment_no,
                        record.student.name,
                        record.withheld as i64,
                        now,
                        id,
                    ],
                )?;
                (id, UpsertOutcome::Replaced)
            }
            None => {
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO result_records(id, course, semester, session, roll_no, enrollment_no,
                                                student_name, withheld, created_at, updated_at)
                     VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        id,
                        key.course,
                        key.semester,
                        key.session,
                        record.student.roll_no,
                        record.student.enrollment_no,
                        record.student.name,
                        record.withheld as i64,
                        now,
                        now,
                    ],
                )?;
                (id, UpsertOutcome::Inserted)
            }
        };

        // Full replace: the previous mark list never survives a resubmission.
        tx.execute("DELETE FROM result_marks WHERE record_id = ?", [&record_id])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO result_marks(id, record_id, idx, subject_name,
                                          internal_value, internal_status, external_value, external_status)
                 VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            )?;
            for (i, m) in record.marks.iter().enumerate() {
                let (iv, is) = mark_to_columns(m.internal);
                let (ev, es) = mark_to_columns(m.external);
                stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    record_id,
                    i as i64,
                    m.subject,
                    iv,
                    is,
                    ev,
                    es,
                ])?;
            }
        }
        tx.commit()?;
        Ok(outcome)
    }

    fn roll_list(&self, key: &RosterKey) -> EngineResult<Vec<StudentIdentity>> {
        let mut stmt = self.prepare(
            "SELECT roll_no, enrollment_no, name
             FROM roll_students
             WHERE course = ? AND semester = ? AND session = ?
             ORDER BY sort_order",
        )?;
        let rows = stmt
            .query_map(params![key.course, key.semester, key.session], |r| {
                Ok(StudentIdentity {
                    roll_no: r.get(0)?,
                    enrollment_no: r.get(1)?,
                    name: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
