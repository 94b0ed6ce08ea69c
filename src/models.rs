//! Vendor payloads and the simplified shapes returned to agents.
//!
//! Vendor-facing types use the API's camelCase field names. Response shapes
//! built by this crate (temperature state, sleep summaries) use snake_case.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// --- Authentication ---

/// Request body for the password grant.
#[derive(Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub grant_type: &'a str,
    pub username: &'a str,
    pub password: &'a str,
}

/// Response from the token endpoint.
///
/// `Debug` is manually implemented to redact the token.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .finish()
    }
}

// --- Temperature ---

/// `GET /users/{id}/temperature` as returned by the vendor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorTemperature {
    #[serde(default)]
    pub current_level: Option<i64>,
    #[serde(default)]
    pub current_state: Option<VendorTemperatureState>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VendorTemperatureState {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub level: Option<i64>,
}

/// Simplified heating/cooling state of one side of the pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemperatureState {
    pub current_level: i64,
    pub target_level: i64,
    pub heating: bool,
    pub cooling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl From<VendorTemperature> for TemperatureState {
    fn from(raw: VendorTemperature) -> Self {
        let target_level = raw.current_level.unwrap_or(0);
        let (current_level, state) = match raw.current_state {
            Some(s) => (s.level.unwrap_or(0), s.kind),
            None => (0, None),
        };
        Self {
            current_level,
            target_level,
            heating: target_level > 0,
            cooling: target_level < 0,
            state,
        }
    }
}

// --- Sleep ---

#[derive(Deserialize)]
pub(crate) struct TrendsResponse {
    #[serde(default)]
    pub days: Vec<SleepDay>,
}

/// One vendor day record. Fields this crate does not interpret are kept in
/// `extra` so the raw record round-trips through `get_sleep_data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepDay {
    #[serde(default)]
    pub day: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tnt: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_quality_score: Option<SleepQualityScore>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageSegment>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepQualityScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hrv: Option<MetricScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<MetricScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<MetricScore>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A vendor sub-score: normalized score plus the night's and baseline values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSegment {
    pub stage: String,
    #[serde(default)]
    pub duration: i64,
}

impl SleepDay {
    /// Total seconds per stage, keyed by lower-cased stage name.
    ///
    /// Only stages present in the record appear; repeated segments of the
    /// same stage are summed.
    pub fn stage_totals(&self) -> BTreeMap<String, i64> {
        let mut totals = BTreeMap::new();
        for segment in &self.stages {
            *totals.entry(segment.stage.to_lowercase()).or_insert(0) += segment.duration;
        }
        totals
    }

    fn quality(&self) -> Option<&SleepQualityScore> {
        self.sleep_quality_score.as_ref()
    }

    pub fn hrv(&self) -> Option<&MetricScore> {
        self.quality().and_then(|q| q.hrv.as_ref())
    }

    pub fn respiratory_rate(&self) -> Option<&MetricScore> {
        self.quality().and_then(|q| q.respiratory_rate.as_ref())
    }

    pub fn heart_rate(&self) -> Option<&MetricScore> {
        self.quality().and_then(|q| q.heart_rate.as_ref())
    }
}

/// Per-night headline numbers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepScore {
    pub date: String,
    pub score: Option<i64>,
    pub duration_seconds: Option<i64>,
    pub toss_and_turns: Option<i64>,
}

impl SleepScore {
    pub fn from_day(date: &str, day: &SleepDay) -> Self {
        Self {
            date: day.day.clone().unwrap_or_else(|| date.to_string()),
            score: day.score,
            duration_seconds: day.sleep_duration,
            toss_and_turns: day.tnt,
        }
    }
}

/// A vital-sign reading for one night (HRV, respiratory rate, heart rate).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VitalReading {
    pub date: String,
    #[serde(flatten)]
    pub metric: MetricScore,
}

/// Stage durations for one night.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepStages {
    pub date: String,
    pub stages: BTreeMap<String, i64>,
}

// --- Presence & device ---

#[derive(Debug, Default, Deserialize)]
pub(crate) struct PresenceResponse {
    #[serde(default)]
    pub presence: Option<bool>,
}

/// Hardware status of the pod assigned to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_water: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_priming: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heard: Option<String>,
}

// --- Alarms ---

/// A vendor alarm. `id` is assigned by the vendor on create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    pub id: String,
    #[serde(default)]
    pub enabled: bool,
    pub time: String,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub vibration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// Body for `POST /users/{id}/alarms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlarm {
    pub time: String,
    pub days_of_week: Vec<u8>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub vibration: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

/// Partial alarm update; absent fields are left untouched by the vendor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
}

impl AlarmUpdate {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_none()
            && self.time.is_none()
            && self.days_of_week.is_none()
            && self.vibration.is_none()
            && self.sound.is_none()
    }
}

#[derive(Deserialize)]
pub(crate) struct AlarmList {
    #[serde(default)]
    pub alarms: Vec<Alarm>,
}

// --- Schedules ---

/// A recurring temperature change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: String,
    pub start_time: String,
    pub level: i64,
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchedule {
    pub start_time: String,
    pub level: i64,
    pub days_of_week: Vec<u8>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl ScheduleUpdate {
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none()
            && self.level.is_none()
            && self.days_of_week.is_none()
            && self.enabled.is_none()
    }
}

#[derive(Deserialize)]
pub(crate) struct ScheduleList {
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

// --- Preferences ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    Imperial,
    Metric,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BedSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub units: Units,
    pub timezone: String,
    #[serde(default)]
    pub bed_side: Option<BedSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_goal: Option<u32>,
}

/// Partial preferences update.
///
/// `bed_side` distinguishes "leave unchanged" (`None`) from "clear"
/// (`Some(None)`, sent as JSON `null`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<Units>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub bed_side: Option<Option<BedSide>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_goal: Option<u32>,
}

impl PreferencesUpdate {
    pub fn is_empty(&self) -> bool {
        self.units.is_none()
            && self.timezone.is_none()
            && self.bed_side.is_none()
            && self.sleep_goal.is_none()
    }
}

fn default_true() -> bool {
    true
}

/// Present-but-null deserializes to `Some(None)`; absent stays `None` via `default`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temperature(current_state_level: Option<i64>, current_level: Option<i64>) -> TemperatureState {
        let raw: VendorTemperature = serde_json::from_value(json!({
            "currentLevel": current_level,
            "currentState": { "type": "smart", "level": current_state_level }
        }))
        .unwrap();
        raw.into()
    }

    #[test]
    fn positive_target_is_heating() {
        let t = temperature(Some(5), Some(30));
        assert_eq!(t.current_level, 5);
        assert_eq!(t.target_level, 30);
        assert!(t.heating);
        assert!(!t.cooling);
        assert_eq!(t.state.as_deref(), Some("smart"));
    }

    #[test]
    fn negative_target_is_cooling() {
        let t = temperature(Some(0), Some(-40));
        assert!(!t.heating);
        assert!(t.cooling);
    }

    #[test]
    fn zero_target_is_neither() {
        let t = temperature(Some(10), Some(0));
        assert!(!t.heating);
        assert!(!t.cooling);
    }

    #[test]
    fn missing_temperature_fields_read_as_zero() {
        let raw: VendorTemperature = serde_json::from_value(json!({})).unwrap();
        let t = TemperatureState::from(raw);
        assert_eq!(t.current_level, 0);
        assert_eq!(t.target_level, 0);
        assert!(t.state.is_none());
    }

    #[test]
    fn stage_names_are_lowercased_and_only_observed() {
        let day: SleepDay = serde_json::from_value(json!({
            "day": "2024-03-01",
            "stages": [
                { "stage": "DEEP", "duration": 120 },
                { "stage": "LIGHT", "duration": 240 }
            ]
        }))
        .unwrap();
        let totals = day.stage_totals();
        assert_eq!(
            serde_json::to_value(&totals).unwrap(),
            json!({ "deep": 120, "light": 240 })
        );
        assert!(!totals.contains_key("rem"));
    }

    #[test]
    fn repeated_stages_are_summed() {
        let day: SleepDay = serde_json::from_value(json!({
            "stages": [
                { "stage": "light", "duration": 100 },
                { "stage": "Rem", "duration": 50 },
                { "stage": "LIGHT", "duration": 20 }
            ]
        }))
        .unwrap();
        let totals = day.stage_totals();
        assert_eq!(totals.get("light"), Some(&120));
        assert_eq!(totals.get("rem"), Some(&50));
    }

    #[test]
    fn unknown_day_fields_round_trip() {
        let raw = json!({
            "day": "2024-03-01",
            "score": 81,
            "presenceDuration": 30000,
            "sleepQualityScore": { "hrv": { "score": 70, "current": 45.5 }, "sleepDurationSeconds": { "score": 90 } }
        });
        let day: SleepDay = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(day.hrv().and_then(|h| h.current), Some(45.5));
        let back = serde_json::to_value(&day).unwrap();
        assert_eq!(back["presenceDuration"], json!(30000));
        assert_eq!(back["sleepQualityScore"]["sleepDurationSeconds"]["score"], json!(90));
    }

    #[test]
    fn preferences_update_distinguishes_null_from_absent() {
        let absent: PreferencesUpdate = serde_json::from_value(json!({ "timezone": "UTC" })).unwrap();
        assert_eq!(absent.bed_side, None);
        assert_eq!(serde_json::to_value(&absent).unwrap(), json!({ "timezone": "UTC" }));

        let cleared: PreferencesUpdate = serde_json::from_value(json!({ "bedSide": null })).unwrap();
        assert_eq!(cleared.bed_side, Some(None));
        assert_eq!(serde_json::to_value(&cleared).unwrap(), json!({ "bedSide": null }));

        let left: PreferencesUpdate = serde_json::from_value(json!({ "bedSide": "left" })).unwrap();
        assert_eq!(left.bed_side, Some(Some(BedSide::Left)));
    }

    #[test]
    fn new_alarm_omits_id() {
        let alarm = NewAlarm {
            time: "07:30".into(),
            days_of_week: vec![1, 2, 3, 4, 5],
            enabled: true,
            vibration: false,
            sound: None,
        };
        let body = serde_json::to_value(&alarm).unwrap();
        assert!(body.get("id").is_none());
        assert_eq!(body["daysOfWeek"], json!([1, 2, 3, 4, 5]));
    }

    #[test]
    fn token_response_debug_redacts() {
        let token: TokenResponse = serde_json::from_value(json!({
            "access_token": "secret-token", "expires_in": 3600, "userId": "u1"
        }))
        .unwrap();
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("u1"));
    }
}
