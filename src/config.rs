use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregator, GradeScale};
use crate::error::TrackerError;
use crate::report::DisplayOptions;
use crate::status::{ColorConfig, StatusMapper, Thresholds, TierThresholds};

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Institution-specific term codes that never appear in the timeline.
    pub excluded_term_codes: Vec<String>,
    pub low_grades: Vec<String>,
    pub request_timeout_secs: u64,
    /// Cap on concurrent attendance requests; unset means no cap.
    pub attendance_concurrency: Option<usize>,
    pub thresholds: Thresholds,
    pub colors: ColorConfig,
    pub grade_scale: GradeScale,
    pub display: DisplayOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            excluded_term_codes: Vec::new(),
            low_grades: ["D+", "D", "D-", "F"].iter().map(|g| g.to_string()).collect(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            attendance_concurrency: None,
            thresholds: Thresholds::default(),
            colors: ColorConfig::default(),
            grade_scale: GradeScale::default(),
            display: DisplayOptions::default(),
        }
    }
}

impl TrackerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, TrackerError> {
        let config: TrackerConfig =
            toml::from_str(raw).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, TrackerError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TrackerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        for (key, value) in self.colors.entries() {
            if !is_hex_color(value) {
                return Err(TrackerError::Config(format!(
                    "colors.{key} must be a #RGB or #RRGGBB hex code, got {value:?}"
                )));
            }
        }

        check_tiers("thresholds.attendance", &self.thresholds.attendance)?;
        check_tiers("thresholds.gpa", &self.thresholds.gpa)?;
        let attendance = self.thresholds.attendance;
        if attendance.needs_attention < 0.0 || attendance.on_track > 100.0 {
            return Err(TrackerError::Config(
                "thresholds.attendance must lie within 0..=100".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(TrackerError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.attendance_concurrency == Some(0) {
            return Err(TrackerError::Config(
                "attendance_concurrency must be greater than zero".to_string(),
            ));
        }
        if let Some((grade, value)) = self.grade_scale.entries().find(|(_, v)| !v.is_finite()) {
            return Err(TrackerError::Config(format!(
                "grade_scale.{grade} must be a finite number, got {value}"
            )));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.grade_scale.clone())
    }

    pub fn status_mapper(&self) -> StatusMapper {
        StatusMapper::new(self.thresholds, self.colors.clone(), self.low_grades.clone())
    }
}

fn check_tiers(key: &str, tiers: &TierThresholds) -> Result<(), TrackerError> {
    if !tiers.on_track.is_finite() || !tiers.needs_attention.is_finite() {
        return Err(TrackerError::Config(format!("{key} must be finite numbers")));
    }
    if tiers.needs_attention > tiers.on_track {
        return Err(TrackerError::Config(format!(
            "{key}.needs_attention ({}) exceeds {key}.on_track ({})",
            tiers.needs_attention, tiers.on_track
        )));
    }
    Ok(())
}

pub fn is_hex_color(value: &str) -> bool {
    let Some(digits) = value.strip_prefix('#') else {
        return false;
    };
    matches!(digits.len(), 3 | 6) && digits.bytes().all(|b| b.is_ascii_hexdigit())
}
