use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    OnTrack,
    NeedsAttention,
    Critical,
    Unknown,
}

impl Status {
    pub fn label(self) -> &'static str {
        match self {
            Status::OnTrack => "On Track",
            Status::NeedsAttention => "Needs Attention",
            Status::Critical => "Critical",
            Status::Unknown => "Unknown",
        }
    }
}

/// Lower bounds, inclusive, of the on-track and needs-attention tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TierThresholds {
    pub on_track: f64,
    pub needs_attention: f64,
}

impl TierThresholds {
    fn tier(&self, value: f64) -> Status {
        if value >= self.on_track {
            Status::OnTrack
        } else if value >= self.needs_attention {
            Status::NeedsAttention
        } else {
            Status::Critical
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Thresholds {
    pub attendance: TierThresholds,
    pub gpa: TierThresholds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            attendance: TierThresholds {
                on_track: 75.0,
                needs_attention: 60.0,
            },
            gpa: TierThresholds {
                on_track: 3.5,
                needs_attention: 3.0,
            },
        }
    }
}

/// Hex color codes. Unset keys in a config file keep these defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColorConfig {
    pub good_attendance: String,
    pub decent_attendance: String,
    pub poor_attendance: String,
    pub unknown_attendance: String,
    pub gpa_increase: String,
    pub gpa_decrease: String,
    /// Fixed GPA circle color; when unset the circle follows the GPA status.
    pub gpa_circle: Option<String>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            good_attendance: "#006114".to_string(),
            decent_attendance: "#F27A0A".to_string(),
            poor_attendance: "#F20A0A".to_string(),
            unknown_attendance: "#9E9E9E".to_string(),
            gpa_increase: "#006114".to_string(),
            gpa_decrease: "#F20A0A".to_string(),
            gpa_circle: None,
        }
    }
}

impl ColorConfig {
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        let mut entries = vec![
            ("good_attendance", self.good_attendance.as_str()),
            ("decent_attendance", self.decent_attendance.as_str()),
            ("poor_attendance", self.poor_attendance.as_str()),
            ("unknown_attendance", self.unknown_attendance.as_str()),
            ("gpa_increase", self.gpa_increase.as_str()),
            ("gpa_decrease", self.gpa_decrease.as_str()),
        ];
        if let Some(circle) = &self.gpa_circle {
            entries.push(("gpa_circle", circle.as_str()));
        }
        entries
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaDirection {
    Up,
    Unchanged,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeltaIndicator {
    pub direction: DeltaDirection,
    pub magnitude: f64,
    pub color: String,
}

pub const PREVIOUS_GPA_UNAVAILABLE: &str = "Previous term GPA unavailable";

#[derive(Debug, Clone, Default)]
pub struct StatusMapper {
    thresholds: Thresholds,
    colors: ColorConfig,
    low_grades: Vec<String>,
}

impl StatusMapper {
    pub fn new(thresholds: Thresholds, colors: ColorConfig, low_grades: Vec<String>) -> Self {
        Self {
            thresholds,
            colors,
            low_grades,
        }
    }

    pub fn attendance_status(&self, pct: Option<f64>) -> Status {
        match pct {
            Some(value) if value.is_finite() => self.thresholds.attendance.tier(value),
            _ => Status::Unknown,
        }
    }

    pub fn gpa_status(&self, gpa: f64) -> Status {
        self.thresholds.gpa.tier(gpa)
    }

    pub fn status_color(&self, status: Status) -> &str {
        match status {
            Status::OnTrack => self.colors.good_attendance.as_str(),
            Status::NeedsAttention => self.colors.decent_attendance.as_str(),
            Status::Critical => self.colors.poor_attendance.as_str(),
            Status::Unknown => self.colors.unknown_attendance.as_str(),
        }
    }

    pub fn attendance_color(&self, pct: Option<f64>) -> &str {
        self.status_color(self.attendance_status(pct))
    }

    pub fn gpa_color(&self, gpa: f64) -> &str {
        match &self.colors.gpa_circle {
            Some(color) => color.as_str(),
            None => self.status_color(self.gpa_status(gpa)),
        }
    }

    /// `None` when there is no previous term to compare against.
    pub fn delta_indicator(&self, delta: Option<f64>) -> Option<DeltaIndicator> {
        let delta = delta?;
        let direction = delta_direction(delta);
        let color = match direction {
            DeltaDirection::Down => &self.colors.gpa_decrease,
            DeltaDirection::Up | DeltaDirection::Unchanged => &self.colors.gpa_increase,
        };
        Some(DeltaIndicator {
            direction,
            magnitude: round2(delta.abs()),
            color: color.clone(),
        })
    }

    pub fn gpa_message(&self, delta: Option<f64>) -> &'static str {
        match delta.map(delta_direction) {
            None => "No previous term data available",
            Some(DeltaDirection::Up) => "Congratulations! GPA improved",
            Some(DeltaDirection::Down) => "GPA decreased from last term",
            Some(DeltaDirection::Unchanged) => "GPA remained the same",
        }
    }

    /// Indicator and message together. A previous term whose GPA could not be
    /// loaded hides the indicator instead of comparing against zero.
    pub fn gpa_comparison(
        &self,
        delta: Option<f64>,
        previous_unavailable: bool,
    ) -> (Option<DeltaIndicator>, &'static str) {
        if previous_unavailable {
            return (None, PREVIOUS_GPA_UNAVAILABLE);
        }
        (self.delta_indicator(delta), self.gpa_message(delta))
    }

    pub fn is_low_grade(&self, grade: Option<&str>) -> bool {
        grade.is_some_and(|g| self.low_grades.iter().any(|low| low == g.trim()))
    }
}

fn delta_direction(delta: f64) -> DeltaDirection {
    let rounded = round2(delta);
    if rounded > 0.0 {
        DeltaDirection::Up
    } else if rounded < 0.0 {
        DeltaDirection::Down
    } else {
        DeltaDirection::Unchanged
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> StatusMapper {
        StatusMapper::new(
            Thresholds::default(),
            ColorConfig::default(),
            vec!["D".to_string(), "F".to_string()],
        )
    }

    #[test]
    fn attendance_tiers_follow_inclusive_lower_bounds() {
        let mapper = mapper();
        assert_eq!(mapper.attendance_status(Some(80.0)), Status::OnTrack);
        assert_eq!(mapper.attendance_status(Some(75.0)), Status::OnTrack);
        assert_eq!(mapper.attendance_status(Some(60.0)), Status::NeedsAttention);
        assert_eq!(mapper.attendance_status(Some(59.9)), Status::Critical);
        assert_eq!(mapper.attendance_status(Some(0.0)), Status::Critical);
        assert_eq!(mapper.attendance_status(None), Status::Unknown);
    }

    #[test]
    fn gpa_tiers() {
        let mapper = mapper();
        assert_eq!(mapper.gpa_status(3.9), Status::OnTrack);
        assert_eq!(mapper.gpa_status(3.5), Status::OnTrack);
        assert_eq!(mapper.gpa_status(3.0), Status::NeedsAttention);
        assert_eq!(mapper.gpa_status(2.99), Status::Critical);
    }

    #[test]
    fn thresholds_can_be_overridden() {
        let thresholds = Thresholds {
            attendance: TierThresholds {
                on_track: 90.0,
                needs_attention: 40.0,
            },
            gpa: TierThresholds {
                on_track: 5.0,
                needs_attention: 3.0,
            },
        };
        let mapper = StatusMapper::new(thresholds, ColorConfig::default(), Vec::new());
        assert_eq!(mapper.attendance_status(Some(80.0)), Status::NeedsAttention);
        assert_eq!(mapper.attendance_status(Some(39.0)), Status::Critical);
        assert_eq!(mapper.gpa_status(3.8), Status::NeedsAttention);
    }

    #[test]
    fn colors_follow_status_with_defaults() {
        let mapper = mapper();
        assert_eq!(mapper.attendance_color(Some(91.0)), "#006114");
        assert_eq!(mapper.attendance_color(Some(68.0)), "#F27A0A");
        assert_eq!(mapper.attendance_color(Some(25.0)), "#F20A0A");
        assert_eq!(mapper.attendance_color(None), "#9E9E9E");
        assert_eq!(mapper.gpa_color(3.1), "#F27A0A");
    }

    #[test]
    fn fixed_gpa_circle_color_overrides_status() {
        let colors = ColorConfig {
            gpa_circle: Some("#123456".to_string()),
            ..ColorConfig::default()
        };
        let mapper = StatusMapper::new(Thresholds::default(), colors, Vec::new());
        assert_eq!(mapper.gpa_color(1.0), "#123456");
    }

    #[test]
    fn delta_indicator_points_up_for_improvement() {
        let mapper = mapper();
        let indicator = mapper.delta_indicator(Some(3.8 - 3.5)).unwrap();
        assert_eq!(indicator.direction, DeltaDirection::Up);
        assert_eq!(indicator.magnitude, 0.3);
        assert_eq!(indicator.color, "#006114");
        assert_eq!(mapper.gpa_message(Some(0.3)), "Congratulations! GPA improved");
    }

    #[test]
    fn delta_indicator_points_down_for_decline() {
        let mapper = mapper();
        let indicator = mapper.delta_indicator(Some(-0.15)).unwrap();
        assert_eq!(indicator.direction, DeltaDirection::Down);
        assert_eq!(indicator.color, "#F20A0A");
        assert_eq!(mapper.gpa_message(Some(-0.15)), "GPA decreased from last term");
    }

    #[test]
    fn tiny_delta_counts_as_unchanged() {
        let mapper = mapper();
        let indicator = mapper.delta_indicator(Some(0.001)).unwrap();
        assert_eq!(indicator.direction, DeltaDirection::Unchanged);
        assert_eq!(mapper.gpa_message(Some(0.0)), "GPA remained the same");
    }

    #[test]
    fn no_previous_term_hides_indicator() {
        let mapper = mapper();
        assert!(mapper.delta_indicator(None).is_none());
        assert_eq!(mapper.gpa_message(None), "No previous term data available");
    }

    #[test]
    fn unavailable_previous_gpa_suppresses_comparison() {
        let mapper = mapper();
        let (indicator, message) = mapper.gpa_comparison(Some(2.1), true);
        assert!(indicator.is_none());
        assert_eq!(message, PREVIOUS_GPA_UNAVAILABLE);

        let (indicator, message) = mapper.gpa_comparison(Some(2.1), false);
        assert_eq!(indicator.unwrap().direction, DeltaDirection::Up);
        assert_eq!(message, "Congratulations! GPA improved");
    }

    #[test]
    fn low_grades_are_flagged() {
        let mapper = mapper();
        assert!(mapper.is_low_grade(Some("F")));
        assert!(!mapper.is_low_grade(Some("B")));
        assert!(!mapper.is_low_grade(None));
    }
}
