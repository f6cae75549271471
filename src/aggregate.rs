use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{AttendanceRecord, Course, DisplayRow, GpaRecord};

/// Letter grade to grade points. Marks missing from the table (pass/fail,
/// in-progress, unrecognised) do not count toward a computed GPA.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradeScale {
    points: BTreeMap<String, f64>,
}

impl Default for GradeScale {
    fn default() -> Self {
        let points = [
            ("A", 4.0),
            ("A-", 3.7),
            ("B+", 3.3),
            ("B", 3.0),
            ("B-", 2.7),
            ("C+", 2.3),
            ("C", 2.0),
            ("C-", 1.7),
            ("D+", 1.3),
            ("D", 1.0),
            ("D-", 0.7),
            ("F", 0.0),
        ]
        .into_iter()
        .map(|(grade, value)| (grade.to_string(), value))
        .collect();
        Self { points }
    }
}

impl GradeScale {
    pub fn from_points(points: BTreeMap<String, f64>) -> Self {
        Self { points }
    }

    pub fn points(&self, grade: &str) -> Option<f64> {
        self.points.get(grade.trim()).copied()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.points.iter().map(|(g, v)| (g.as_str(), *v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpaSource {
    /// Cumulative GPA supplied by the records backend.
    Reported,
    /// Credit-weighted average of the term's letter grades.
    Computed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregate {
    pub rows: Vec<DisplayRow>,
    pub current_gpa: f64,
    pub gpa_delta: Option<f64>,
    pub gpa_source: GpaSource,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    scale: GradeScale,
}

impl Aggregator {
    pub fn new(scale: GradeScale) -> Self {
        Self { scale }
    }

    /// `previous` is `None` when the student has no earlier term; a failed
    /// previous-term fetch is passed as `Some(&GpaRecord::default())`.
    pub fn aggregate(
        &self,
        courses: &[Course],
        attendance: &[AttendanceRecord],
        current: &GpaRecord,
        previous: Option<&GpaRecord>,
    ) -> Aggregate {
        let courses = first_by_crn(courses);
        let rows = join_rows(&courses, attendance);

        let (current_gpa, gpa_source) = match current.cumulative_gpa {
            Some(value) if value.is_finite() => (value, GpaSource::Reported),
            _ => (self.weighted_gpa(&courses), GpaSource::Computed),
        };

        let gpa_delta = previous.map(|record| {
            let previous_gpa = record
                .term_gpa
                .or(record.cumulative_gpa)
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            current_gpa - previous_gpa
        });

        Aggregate {
            rows,
            current_gpa,
            gpa_delta,
            gpa_source,
        }
    }

    /// Credit-weighted GPA over gradable courses, 0 when none are gradable.
    /// A repeated crn counts once, as its first occurrence.
    pub fn compute_gpa(&self, courses: &[Course]) -> f64 {
        self.weighted_gpa(&first_by_crn(courses))
    }

    fn weighted_gpa(&self, courses: &[&Course]) -> f64 {
        let (points, credits) = courses
            .iter()
            .filter_map(|course| {
                let value = self.scale.points(course.grade.as_deref()?)?;
                Some((value * course.credit_hours, course.credit_hours))
            })
            .fold((0.0, 0.0), |(p, c), (dp, dc)| (p + dp, c + dc));

        if credits > 0.0 {
            points / credits
        } else {
            0.0
        }
    }
}

/// Drops repeated course reference numbers, keeping the first occurrence.
pub fn dedup_courses(courses: Vec<Course>) -> Vec<Course> {
    let mut seen = HashSet::new();
    courses
        .into_iter()
        .filter(|course| {
            let first = seen.insert(course.crn.clone());
            if !first {
                warn!(crn = %course.crn, "duplicate course reference number, keeping first");
            }
            first
        })
        .collect()
}

fn first_by_crn(courses: &[Course]) -> Vec<&Course> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(courses.len());
    for course in courses {
        if seen.insert(course.crn.as_str()) {
            unique.push(course);
        }
    }
    unique
}

fn join_rows(courses: &[&Course], attendance: &[AttendanceRecord]) -> Vec<DisplayRow> {
    let by_crn: HashMap<&str, Option<f64>> = attendance
        .iter()
        .map(|record| (record.crn.as_str(), record.attendance_percentage))
        .collect();

    courses
        .iter()
        .map(|course| DisplayRow {
            crn: course.crn.clone(),
            title: course.title.clone(),
            grade: course.grade.clone(),
            credit_hours: course.credit_hours,
            attendance_percentage: by_crn.get(course.crn.as_str()).copied().flatten(),
        })
        .collect()
}
