use crate::domain::layout::TimelineConfig;
use crate::infrastructure::error::CoreError;
use chrono::NaiveTime;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TIMELINE_JSON: &str = "timeline.json";

const DEFAULT_DAY_START_HOUR: u32 = 6;
const DEFAULT_DAY_END_HOUR: u32 = 23;
const DEFAULT_SLOT_MINUTES: u32 = 30;
const DEFAULT_HOUR_HEIGHT_PX: f64 = 72.0;
const DEFAULT_OCCURRENCE_START: &str = "09:00";

/// Timeline rendering window and materialization defaults, as configured
/// under `<workspace>/config/timeline.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineSettings {
    pub day_start_hour: u32,
    pub day_end_hour: u32,
    pub slot_minutes: u32,
    pub hour_height_px: f64,
    /// Fallback start for occurrences materialized with no prior slot.
    pub default_occurrence_start: NaiveTime,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            day_start_hour: DEFAULT_DAY_START_HOUR,
            day_end_hour: DEFAULT_DAY_END_HOUR,
            slot_minutes: DEFAULT_SLOT_MINUTES,
            hour_height_px: DEFAULT_HOUR_HEIGHT_PX,
            default_occurrence_start: NaiveTime::from_hms_opt(9, 0, 0)
                .expect("valid fixed time"),
        }
    }
}

impl TimelineSettings {
    pub fn timeline_config(&self) -> TimelineConfig {
        TimelineConfig {
            start_hour: self.day_start_hour,
            end_hour: self.day_end_hour,
            hour_height: self.hour_height_px as f32,
            slot_minutes: self.slot_minutes,
        }
    }
}

fn default_files() -> HashMap<&'static str, Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Daygrid"
            }),
        ),
        (
            TIMELINE_JSON,
            serde_json::json!({
                "schema": 1,
                "dayStartHour": DEFAULT_DAY_START_HOUR,
                "dayEndHour": DEFAULT_DAY_END_HOUR,
                "slotMinutes": DEFAULT_SLOT_MINUTES,
                "hourHeightPx": DEFAULT_HOUR_HEIGHT_PX,
                "defaultOccurrenceStart": DEFAULT_OCCURRENCE_START
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), CoreError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, CoreError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| CoreError::InvalidInput(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(CoreError::InvalidInput(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

/// Read the timeline settings, falling back to the defaults per field when a
/// value is absent or malformed.
pub fn load_timeline_settings(config_dir: &Path) -> Result<TimelineSettings, CoreError> {
    let timeline = read_config(&config_dir.join(TIMELINE_JSON))?;
    let defaults = TimelineSettings::default();

    let read_hour = |key: &str, fallback: u32| {
        timeline
            .get(key)
            .and_then(Value::as_u64)
            .map(|value| value as u32)
            .filter(|value| *value <= 24)
            .unwrap_or(fallback)
    };

    let default_occurrence_start = timeline
        .get("defaultOccurrenceStart")
        .and_then(Value::as_str)
        .and_then(|raw| crate::domain::timegrid::parse_time(raw).ok())
        .unwrap_or(defaults.default_occurrence_start);

    Ok(TimelineSettings {
        day_start_hour: read_hour("dayStartHour", defaults.day_start_hour),
        day_end_hour: read_hour("dayEndHour", defaults.day_end_hour),
        slot_minutes: timeline
            .get("slotMinutes")
            .and_then(Value::as_u64)
            .map(|value| value as u32)
            .filter(|value| *value > 0)
            .unwrap_or(defaults.slot_minutes),
        hour_height_px: timeline
            .get("hourHeightPx")
            .and_then(Value::as_f64)
            .filter(|value| *value > 0.0)
            .unwrap_or(defaults.hour_height_px),
        default_occurrence_start,
    })
}

pub fn read_app_name(config_dir: &Path) -> Result<String, CoreError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let name = app
        .get("appName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("Daygrid");
    Ok(name.to_string())
}
