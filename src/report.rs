use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::GpaSource;
use crate::models::{DisplayRow, GpaHistoryPoint};
use crate::status::{DeltaDirection, DeltaIndicator, Status, StatusMapper};
use crate::tracker::{FetchKind, Snapshot};

pub const PARTIAL_DATA_ADVISORY: &str =
    "Some information could not be loaded right now. Showing what is available.";

const GPA_SCALE_MAX: f64 = 4.0;
const CHART_WIDTH: usize = 40;

/// Which sections of the card are rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayOptions {
    pub show_gpa: bool,
    pub show_delta: bool,
    pub show_attendance: bool,
    pub show_grades: bool,
    pub show_legend: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            show_gpa: true,
            show_delta: true,
            show_attendance: true,
            show_grades: true,
            show_legend: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub crn: String,
    pub title: String,
    pub grade: String,
    pub low_grade: bool,
    pub credit_hours: f64,
    pub attendance: String,
    pub attendance_percentage: Option<f64>,
    pub status: Status,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpaView {
    pub value: f64,
    pub display: String,
    pub source: GpaSource,
    pub status: Status,
    pub color: String,
    pub delta: Option<DeltaIndicator>,
    pub message: String,
}

/// Display-ready card contents, also emitted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportView {
    pub generated_at: DateTime<Utc>,
    pub term_code: String,
    pub term: String,
    pub previous_term: Option<String>,
    pub advisory: Option<String>,
    pub gpa: GpaView,
    pub rows: Vec<RowView>,
}

impl ReportView {
    pub fn new(snapshot: &Snapshot, mapper: &StatusMapper, generated_at: DateTime<Utc>) -> Self {
        let aggregate = &snapshot.aggregate;
        let (delta, message) = mapper.gpa_comparison(
            aggregate.gpa_delta,
            snapshot.has_failed(FetchKind::PreviousGpa),
        );
        let gpa = GpaView {
            value: aggregate.current_gpa,
            display: format!("{:.2}", aggregate.current_gpa),
            source: aggregate.gpa_source,
            status: mapper.gpa_status(aggregate.current_gpa),
            color: mapper.gpa_color(aggregate.current_gpa).to_string(),
            delta,
            message: message.to_string(),
        };

        Self {
            generated_at,
            term_code: snapshot.selection.current.term_code.clone(),
            term: snapshot.selection.current.label().to_string(),
            previous_term: snapshot
                .selection
                .previous
                .as_ref()
                .map(|t| t.label().to_string()),
            advisory: snapshot
                .has_partial_failure()
                .then(|| PARTIAL_DATA_ADVISORY.to_string()),
            gpa,
            rows: aggregate.rows.iter().map(|row| row_view(row, mapper)).collect(),
        }
    }
}

pub fn row_view(row: &DisplayRow, mapper: &StatusMapper) -> RowView {
    RowView {
        crn: row.crn.clone(),
        title: row.title.clone(),
        grade: row.grade.clone().unwrap_or_else(|| "--".to_string()),
        low_grade: mapper.is_low_grade(row.grade.as_deref()),
        credit_hours: row.credit_hours,
        attendance: format_attendance(row.attendance_percentage),
        attendance_percentage: row.attendance_percentage,
        status: mapper.attendance_status(row.attendance_percentage),
        color: mapper.attendance_color(row.attendance_percentage).to_string(),
    }
}

pub fn format_attendance(pct: Option<f64>) -> String {
    match pct {
        Some(value) => format!("{}%", trim_number(value)),
        None => "N/A".to_string(),
    }
}

fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.1}")
    }
}

pub fn build_report(
    snapshot: &Snapshot,
    mapper: &StatusMapper,
    display: &DisplayOptions,
    generated_at: DateTime<Utc>,
) -> String {
    let view = ReportView::new(snapshot, mapper, generated_at);
    let mut output = String::new();

    let _ = writeln!(output, "# Success Tracker");
    let _ = writeln!(
        output,
        "{} ({}), generated {}",
        view.term,
        view.term_code,
        view.generated_at.format("%Y-%m-%d %H:%M UTC")
    );

    if let Some(advisory) = &view.advisory {
        let _ = writeln!(output);
        let _ = writeln!(output, "> {advisory}");
    }

    if display.show_gpa {
        let gpa = &view.gpa;
        let source = match gpa.source {
            GpaSource::Reported => "reported",
            GpaSource::Computed => "computed from grades",
        };
        let _ = writeln!(output);
        let _ = writeln!(output, "## Cumulative GPA");
        let _ = writeln!(
            output,
            "{} ({source}) - {} [{}]",
            gpa.display,
            gpa.status.label(),
            gpa.color
        );

        if display.show_delta {
            if let Some(delta) = &gpa.delta {
                let arrow = match delta.direction {
                    DeltaDirection::Up | DeltaDirection::Unchanged => "up",
                    DeltaDirection::Down => "down",
                };
                let _ = writeln!(
                    output,
                    "{arrow} {:.2} from last term [{}]",
                    delta.magnitude, delta.color
                );
            }
            let _ = writeln!(output, "{}", gpa.message);
        }
    }

    if display.show_attendance || display.show_grades {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Academic Performance - {}", view.term);

        if view.rows.is_empty() {
            let _ = writeln!(output, "No attendance data available.");
        } else {
            let _ = writeln!(output, "{}", table_header(display));
            let _ = writeln!(output, "{}", table_rule(display));
            for row in &view.rows {
                let _ = writeln!(output, "{}", table_row(row, display));
            }
        }
    }

    if display.show_legend && display.show_attendance {
        let _ = writeln!(output);
        let legend: Vec<String> = [Status::OnTrack, Status::NeedsAttention, Status::Critical]
            .into_iter()
            .map(|status| format!("{} [{}]", status.label(), mapper.status_color(status)))
            .collect();
        let _ = writeln!(output, "Legend: {}", legend.join(", "));
    }

    output
}

fn table_header(display: &DisplayOptions) -> String {
    let mut cells = vec!["CRN", "Course"];
    if display.show_grades {
        cells.extend(["Grade", "Credit hours"]);
    }
    if display.show_attendance {
        cells.extend(["Attendance", "Status"]);
    }
    format!("| {} |", cells.join(" | "))
}

fn table_rule(display: &DisplayOptions) -> String {
    let mut columns = 2;
    if display.show_grades {
        columns += 2;
    }
    if display.show_attendance {
        columns += 2;
    }
    format!("|{}", "---|".repeat(columns))
}

fn table_row(row: &RowView, display: &DisplayOptions) -> String {
    let mut cells = vec![row.crn.clone(), row.title.clone()];
    if display.show_grades {
        let grade = if row.low_grade {
            format!("{} (low)", row.grade)
        } else {
            row.grade.clone()
        };
        cells.push(grade);
        cells.push(trim_number(row.credit_hours));
    }
    if display.show_attendance {
        cells.push(row.attendance.clone());
        cells.push(format!("{} [{}]", row.status.label(), row.color));
    }
    format!("| {} |", cells.join(" | "))
}

pub fn write_csv<W: std::io::Write>(
    rows: &[DisplayRow],
    mapper: &StatusMapper,
    writer: W,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for row in rows {
        writer.serialize(row_view(row, mapper))?;
    }
    writer.flush()?;
    Ok(())
}

/// Horizontal bars on the 0-4 GPA axis, oldest term first.
pub fn render_history(points: &[GpaHistoryPoint]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Term GPA Report");

    if points.is_empty() {
        let _ = writeln!(output, "No terms available.");
        return output;
    }

    let width = points.iter().map(|p| p.term.len()).max().unwrap_or(0);
    for point in points {
        match point.term_gpa {
            Some(gpa) => {
                let filled = ((gpa.clamp(0.0, GPA_SCALE_MAX) / GPA_SCALE_MAX) * CHART_WIDTH as f64)
                    .round() as usize;
                let _ = writeln!(
                    output,
                    "{:<width$}  {:>4.2} {}",
                    point.term,
                    gpa,
                    "#".repeat(filled)
                );
            }
            None => {
                let _ = writeln!(output, "{:<width$}   N/A", point.term);
            }
        }
    }
    output
}
