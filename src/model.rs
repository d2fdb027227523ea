use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Wire form of the absence sentinel on a mark component.
pub const ABSENT_MARK: &str = "A";
/// Display form of a subject total when any component is absent.
pub const ABSENT_DISPLAY: &str = "AB";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectType {
    Theory,
    Practical,
    Project,
    Elective,
}

impl SubjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectType::Theory => "theory",
            SubjectType::Practical => "practical",
            SubjectType::Project => "project",
            SubjectType::Elective => "elective",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "theory" => Some(SubjectType::Theory),
            "practical" => Some(SubjectType::Practical),
            "project" => Some(SubjectType::Project),
            "elective" => Some(SubjectType::Elective),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkComponent {
    Internal,
    External,
}

impl MarkComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            MarkComponent::Internal => "internal",
            MarkComponent::External => "external",
        }
    }
}

impl fmt::Display for MarkComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds for one subject within a session. Referenced by name from mark entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub subject_type: SubjectType,
    pub internal_min: f64,
    pub internal_max: f64,
    pub external_min: f64,
    pub external_max: f64,
}

impl SubjectDefinition {
    pub fn max_total(&self) -> f64 {
        self.internal_max + self.external_max
    }

    /// Minimum combined total; below this the subject counts as failed.
    pub fn pass_total(&self) -> f64 {
        self.internal_min + self.external_min
    }

    pub fn component_max(&self, component: MarkComponent) -> f64 {
        match component {
            MarkComponent::Internal => self.internal_max,
            MarkComponent::External => self.external_max,
        }
    }
}

/// One component of a subject mark: a number, or the absence sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarkValue {
    Absent,
    Marks(f64),
}

impl MarkValue {
    pub fn is_absent(self) -> bool {
        matches!(self, MarkValue::Absent)
    }

    /// Numeric contribution to totals. Absence counts as 0.
    pub fn numeric(self) -> f64 {
        match self {
            MarkValue::Absent => 0.0,
            MarkValue::Marks(v) => v,
        }
    }
}

impl Serialize for MarkValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MarkValue::Absent => serializer.serialize_str(ABSENT_MARK),
            MarkValue::Marks(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for MarkValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Num(f64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Num(v) => Ok(MarkValue::Marks(v)),
            Wire::Text(s) if s.eq_ignore_ascii_case(ABSENT_MARK) => Ok(MarkValue::Absent),
            Wire::Text(s) => Err(serde::de::Error::custom(format!(
                "expected a number or \"{}\", got {:?}",
                ABSENT_MARK, s
            ))),
        }
    }
}

/// Subject total as shown to readers: `"AB"` when any component is absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DisplayTotal {
    Absent,
    Marks(f64),
}

impl Serialize for DisplayTotal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DisplayTotal::Absent => serializer.serialize_str(ABSENT_DISPLAY),
            DisplayTotal::Marks(v) => serializer.serialize_f64(*v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub subject: String,
    pub internal: MarkValue,
    pub external: MarkValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentIdentity {
    pub roll_no: String,
    #[serde(default)]
    pub enrollment_no: String,
    pub name: String,
}

/// (course, semester, session): the scope shared by one roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RosterKey {
    pub course: String,
    pub semester: i64,
    pub session: String,
}

impl RosterKey {
    pub fn new(course: impl Into<String>, semester: i64, session: impl Into<String>) -> Self {
        Self {
            course: course.into(),
            semester,
            session: session.into(),
        }
    }
}

impl fmt::Display for RosterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/sem{}/{}", self.course, self.semester, self.session)
    }
}

/// Stored marks for one student in one roster. Derived values are never kept here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResultRecord {
    #[serde(flatten)]
    pub key: RosterKey,
    pub student: StudentIdentity,
    pub marks: Vec<MarkEntry>,
    #[serde(default)]
    pub withheld: bool,
}

impl StudentResultRecord {
    pub fn mark_for(&self, subject: &str) -> Option<&MarkEntry> {
        self.marks.iter().find(|m| m.subject == subject)
    }
}

/// Snapshot of one roster as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    pub key: RosterKey,
    pub subjects: Vec<SubjectDefinition>,
    pub roll: Vec<StudentIdentity>,
    pub records: Vec<StudentResultRecord>,
}
