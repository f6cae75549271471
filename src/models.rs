use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub term_code: String,
    #[serde(default)]
    pub term: String,
    #[serde(default)]
    pub banner_id: String,
}

impl Term {
    pub fn label(&self) -> &str {
        if self.term.trim().is_empty() {
            &self.term_code
        } else {
            &self.term
        }
    }
}

/// Body of the term-codes endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TermCodesBody {
    Wrapped {
        #[serde(rename = "termCodeDetails")]
        term_code_details: Vec<Term>,
    },
    Bare(Vec<Term>),
}

impl TermCodesBody {
    pub fn into_terms(self) -> Vec<Term> {
        match self {
            TermCodesBody::Wrapped { term_code_details } => term_code_details,
            TermCodesBody::Bare(terms) => terms,
        }
    }
}

/// GPA snapshot for one (student, term) pair. The default value, with both
/// fields null, stands in for a failed or empty fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaRecord {
    #[serde(default)]
    pub term_gpa: Option<f64>,
    #[serde(default)]
    pub cumulative_gpa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "CourseWire")]
pub struct Course {
    pub crn: String,
    pub title: String,
    pub grade: Option<String>,
    pub credit_hours: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CourseWire {
    #[serde(default, alias = "courseReferenceNumber")]
    crn: Option<String>,
    #[serde(default, alias = "courseTitle")]
    title: Option<String>,
    #[serde(default)]
    course_number: Option<String>,
    #[serde(default)]
    grade: Option<String>,
    #[serde(default)]
    credit_hours: Option<f64>,
    #[serde(default)]
    credits: Option<CreditsWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreditsWire {
    #[serde(default)]
    credit_hours: Option<f64>,
}

impl From<CourseWire> for Course {
    fn from(wire: CourseWire) -> Self {
        let title = wire
            .title
            .filter(|t| !t.trim().is_empty())
            .or(wire.course_number.filter(|n| !n.trim().is_empty()))
            .unwrap_or_else(|| "Unknown Course".to_string());
        let credit_hours = wire
            .credit_hours
            .or(wire.credits.and_then(|c| c.credit_hours))
            .filter(|h| h.is_finite() && *h >= 0.0)
            .unwrap_or(0.0);

        Course {
            crn: wire.crn.unwrap_or_default().trim().to_string(),
            title,
            grade: normalize_grade(wire.grade),
            credit_hours,
        }
    }
}

/// Blank and `--` grades mean the course is still in progress.
pub fn normalize_grade(grade: Option<String>) -> Option<String> {
    grade
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty() && g != "--")
}

/// Body of the course-details endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CoursesBody {
    Wrapped { courses: Vec<Course> },
    Bare(Vec<Course>),
}

impl CoursesBody {
    pub fn into_courses(self) -> Vec<Course> {
        match self {
            CoursesBody::Wrapped { courses } => courses,
            CoursesBody::Bare(courses) => courses,
        }
    }
}

/// `attendance_percentage` of `None` means "not yet available", which is
/// different from zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub crn: String,
    pub attendance_percentage: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceBody {
    #[serde(default, alias = "percentage", alias = "attendance")]
    pub attendance_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionAttendance {
    #[serde(default)]
    pub section_id: String,
    #[serde(default)]
    pub term_code: Option<String>,
    #[serde(default, alias = "courseTitle")]
    pub title: Option<String>,
    #[serde(default, alias = "percentage")]
    pub attendance_percentage: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicPerformance {
    #[serde(default, alias = "courseReferenceNumber")]
    pub crn: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub credit_hours: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One enrolled course joined with its attendance.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRow {
    pub crn: String,
    pub title: String,
    pub grade: Option<String>,
    pub credit_hours: f64,
    pub attendance_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GpaHistoryPoint {
    pub term_code: String,
    pub term: String,
    pub term_gpa: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn course_accepts_nested_credit_hours_and_title_fallbacks() {
        let course: Course = serde_json::from_value(json!({
            "courseReferenceNumber": "20431",
            "courseNumber": "MATH 201",
            "grade": "--",
            "credits": { "creditHours": 4 }
        }))
        .unwrap();

        assert_eq!(course.crn, "20431");
        assert_eq!(course.title, "MATH 201");
        assert_eq!(course.grade, None);
        assert_eq!(course.credit_hours, 4.0);
    }

    #[test]
    fn course_without_title_or_number_is_unknown() {
        let course: Course =
            serde_json::from_value(json!({ "crn": "CS301", "grade": "B+" })).unwrap();
        assert_eq!(course.title, "Unknown Course");
        assert_eq!(course.grade.as_deref(), Some("B+"));
        assert_eq!(course.credit_hours, 0.0);
    }

    #[test]
    fn term_codes_body_accepts_wrapped_and_bare_lists() {
        let wrapped: TermCodesBody = serde_json::from_value(json!({
            "termCodeDetails": [{ "termCode": "202610", "term": "Spring 2026", "bannerId": "A001" }]
        }))
        .unwrap();
        let bare: TermCodesBody =
            serde_json::from_value(json!([{ "termCode": "202610" }])).unwrap();

        assert_eq!(wrapped.into_terms()[0].banner_id, "A001");
        let bare = bare.into_terms();
        assert_eq!(bare[0].label(), "202610");
    }

    #[test]
    fn section_attendance_keeps_unknown_fields() {
        let section: SectionAttendance = serde_json::from_value(json!({
            "sectionId": "S-1",
            "attendancePercentage": 88.5,
            "instructor": "Dr. Ames"
        }))
        .unwrap();
        assert_eq!(section.attendance_percentage, Some(88.5));
        assert_eq!(section.extra.get("instructor"), Some(&json!("Dr. Ames")));
    }
}
