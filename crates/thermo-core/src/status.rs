//! # Temperature Status Policy
//!
//! Turns a reading into the status message pushed to the registry, where it
//! is shown on the access-control console next to the person's record.
//!
//! ## Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Status Classification                             │
//! │                                                                         │
//! │        LOW           │          NORMAL           │       ALARM          │
//! │   ───────────────────┼───────────────────────────┼───────────────────   │
//! │                    min (34.0)                  max (37.5)               │
//! │                                                                         │
//! │   t <  min           → low message,    alarm = false                    │
//! │   min <= t < max     → normal message, alarm = false                    │
//! │   t >= max           → alarm message,  alarm = true                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Thresholds and message templates come from configuration. Templates use
//! a `{temperature}` placeholder rendered with one decimal.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Placeholder replaced by the reading in status templates.
pub const TEMPERATURE_PLACEHOLDER: &str = "{temperature}";

/// Default lower bound of a normal reading.
pub const DEFAULT_MIN_TEMPERATURE: f64 = 34.0;

/// Default alarm threshold.
///
/// ## Business Reason
/// 37.5 °C is the usual fever screening cut-off at building entrances.
pub const DEFAULT_MAX_TEMPERATURE: f64 = 37.5;

/// Rounds a reading to one decimal.
#[inline]
pub fn round_temperature(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Classification of a single reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TemperatureStatus {
    /// Within the configured band.
    Normal,
    /// At or above the alarm threshold.
    Alarm,
    /// Below the lower bound (usually a bad measurement).
    Low,
}

impl std::fmt::Display for TemperatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemperatureStatus::Normal => write!(f, "normal"),
            TemperatureStatus::Alarm => write!(f, "alarm"),
            TemperatureStatus::Low => write!(f, "low"),
        }
    }
}

/// Rendered status message ready for the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusMessage {
    /// Classification.
    pub status: TemperatureStatus,
    /// Human readable text.
    pub text: String,
    /// Raise the registry's alarm flag.
    pub alarm: bool,
}

/// Thresholds and templates used to classify readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusPolicy {
    /// Readings below this are "low".
    pub min: f64,
    /// Readings at or above this raise the alarm.
    pub max: f64,
    /// Template for normal readings.
    pub normal_template: String,
    /// Template for alarm readings.
    pub alarm_template: String,
    /// Template for low readings.
    pub low_template: String,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        StatusPolicy {
            min: DEFAULT_MIN_TEMPERATURE,
            max: DEFAULT_MAX_TEMPERATURE,
            normal_template: "temperature normal ({temperature}°)".to_string(),
            alarm_template: "temperature elevated ({temperature}°)".to_string(),
            low_template: "temperature low ({temperature}°)".to_string(),
        }
    }
}

impl StatusPolicy {
    /// Classifies a reading.
    pub fn classify(&self, temperature: f64) -> TemperatureStatus {
        if temperature >= self.max {
            TemperatureStatus::Alarm
        } else if temperature < self.min {
            TemperatureStatus::Low
        } else {
            TemperatureStatus::Normal
        }
    }

    /// Classifies a reading and renders its message.
    pub fn evaluate(&self, temperature: f64) -> StatusMessage {
        let status = self.classify(temperature);
        let template = match status {
            TemperatureStatus::Normal => &self.normal_template,
            TemperatureStatus::Alarm => &self.alarm_template,
            TemperatureStatus::Low => &self.low_template,
        };

        StatusMessage {
            status,
            text: render_template(template, temperature),
            alarm: status == TemperatureStatus::Alarm,
        }
    }
}

/// Substitutes the reading into a template.
pub fn render_template(template: &str, temperature: f64) -> String {
    template.replace(TEMPERATURE_PLACEHOLDER, &format!("{:.1}", temperature))
}
