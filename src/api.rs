//! Eight Sleep API facade.
//!
//! One method per vendor resource. Every call goes through
//! [`EightSleepClient`], so authentication and the single 401 retry are
//! handled below this layer. Errors are prefixed with the operation name via
//! [`EightSleepError::context`]; the error kind never changes.
//!
//! ## Endpoints
//!
//! | Method | Path                                     | Used by                        |
//! |--------|------------------------------------------|--------------------------------|
//! | GET    | `/users/{id}`                            | `get_user_profile`             |
//! | GET    | `/users/{id}/temperature`                | `get_temperature`              |
//! | PUT    | `/users/{id}/temperature`                | `set_temperature`, `turn_on/off` |
//! | GET    | `/users/{id}/trends`                     | all sleep metrics              |
//! | GET    | `/users/{id}/presence`                   | `get_presence`                 |
//! | GET    | `/users/{id}/device`                     | `get_device_status`            |
//! | *      | `/users/{id}/alarms[/{alarmId}[/...]]`   | alarm CRUD, snooze, dismiss    |
//! | *      | `/users/{id}/schedules[/{scheduleId}]`   | schedule CRUD                  |
//! | GET/PUT| `/users/{id}/preferences`                | preferences                    |

use chrono::{Days, NaiveDate};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::client::EightSleepClient;
use crate::error::{EightSleepError, Result};
use crate::models::{
    Alarm, AlarmList, AlarmUpdate, DeviceStatus, MetricScore, NewAlarm, NewSchedule, Preferences,
    PreferencesUpdate, PresenceResponse, Schedule, ScheduleList, ScheduleUpdate, SleepDay,
    SleepScore, SleepStages, TemperatureState, TrendsResponse, VendorTemperature, VitalReading,
};

/// Lowest and highest heating level accepted by the pod.
pub const MIN_LEVEL: i64 = -100;
pub const MAX_LEVEL: i64 = 100;

/// Typed operations over the vendor REST API.
pub struct EightSleepApi {
    client: EightSleepClient,
    timezone: String,
}

impl EightSleepApi {
    /// `timezone` is sent with every trends query.
    pub fn new(client: EightSleepClient, timezone: impl Into<String>) -> Self {
        Self {
            client,
            timezone: timezone.into(),
        }
    }

    /// Resolve an explicit user id, or fall back to the active one.
    pub async fn resolve_user(&self, user_id: Option<&str>) -> Result<String> {
        match user_id {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => self.client.user_id().await,
        }
    }

    // --- Profile & device ---

    pub async fn get_user_profile(&self, user_id: &str) -> Result<Value> {
        self.client
            .get(&format!("/users/{user_id}"), &[])
            .await
            .map_err(|e| e.context("get_user_profile"))
    }

    pub async fn get_device_status(&self, user_id: &str) -> Result<DeviceStatus> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/device"), &[])
            .await;
        decode(raw, "get_device_status")
    }

    /// Whether someone is in bed. A missing `presence` field reads as `false`.
    pub async fn get_presence(&self, user_id: &str) -> Result<bool> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/presence"), &[])
            .await;
        let presence: PresenceResponse = decode(raw.map(null_to_object), "get_presence")?;
        Ok(presence.presence.unwrap_or(false))
    }

    // --- Temperature ---

    pub async fn get_temperature(&self, user_id: &str) -> Result<TemperatureState> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/temperature"), &[])
            .await;
        let vendor: VendorTemperature = decode(raw.map(null_to_object), "get_temperature")?;
        Ok(vendor.into())
    }

    /// Set the heating level, optionally only for `duration_secs` seconds.
    ///
    /// The level is validated before any network call. The acknowledgement
    /// does not confirm that the pod reached the level.
    pub async fn set_temperature(
        &self,
        user_id: &str,
        level: i64,
        duration_secs: u64,
    ) -> Result<Value> {
        validate_level(level).map_err(|e| e.context("set_temperature"))?;

        let path = format!("/users/{user_id}/temperature");
        self.client
            .put(&path, &json!({ "currentLevel": level }))
            .await
            .map_err(|e| e.context("set_temperature"))?;

        if duration_secs > 0 {
            self.client
                .put(
                    &path,
                    &json!({ "timeBased": { "level": level, "durationSeconds": duration_secs } }),
                )
                .await
                .map_err(|e| e.context("set_temperature"))?;
        }

        Ok(json!({ "success": true, "level": level, "duration": duration_secs }))
    }

    /// Switch the pod side on (`smart` mode) or off.
    pub async fn set_power(&self, user_id: &str, on: bool) -> Result<Value> {
        let state = if on { "smart" } else { "off" };
        self.client
            .put(
                &format!("/users/{user_id}/temperature"),
                &json!({ "currentState": { "type": state } }),
            )
            .await
            .map_err(|e| e.context(if on { "turn_on" } else { "turn_off" }))?;
        Ok(json!({ "success": true, "state": state }))
    }

    // --- Sleep ---

    /// Day records between `start` and `end` (default `start + 1 day`).
    ///
    /// An empty list is a valid answer here; the single-night helpers turn
    /// it into [`EightSleepError::NotFound`].
    pub async fn get_sleep_data(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Result<Vec<SleepDay>> {
        let end = match end {
            Some(d) => d,
            None => start.checked_add_days(Days::new(1)).ok_or_else(|| {
                EightSleepError::Validation(format!("date out of range: {start}"))
                    .context("get_sleep_data")
            })?,
        };
        if end < start {
            return Err(EightSleepError::Validation(format!(
                "end_date {end} is before start_date {start}"
            ))
            .context("get_sleep_data"));
        }

        let query = [
            ("tz", self.timezone.clone()),
            ("from", start.to_string()),
            ("to", end.to_string()),
            ("include-main", "false".to_string()),
            ("include-all-sessions", "true".to_string()),
            ("model-version", "v2".to_string()),
        ];
        let raw = self
            .client
            .get(&format!("/users/{user_id}/trends"), &query)
            .await;
        let trends: TrendsResponse = decode(raw.map(null_to_object), "get_sleep_data")?;
        debug!("trends {start}..{end}: {} day(s)", trends.days.len());
        Ok(trends.days)
    }

    /// First day record for `date`. Longer ranges are not aggregated.
    async fn first_day(&self, user_id: &str, date: NaiveDate, operation: &str) -> Result<SleepDay> {
        self.get_sleep_data(user_id, date, None)
            .await
            .map_err(|e| e.context(operation))?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EightSleepError::NotFound(format!("no sleep data for {date}")).context(operation)
            })
    }

    pub async fn get_sleep_score(&self, user_id: &str, date: NaiveDate) -> Result<SleepScore> {
        let day = self.first_day(user_id, date, "get_sleep_score").await?;
        Ok(SleepScore::from_day(&date.to_string(), &day))
    }

    pub async fn get_hrv(&self, user_id: &str, date: NaiveDate) -> Result<VitalReading> {
        let day = self.first_day(user_id, date, "get_hrv").await?;
        Ok(reading(date, &day, day.hrv()))
    }

    pub async fn get_respiratory_rate(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<VitalReading> {
        let day = self.first_day(user_id, date, "get_respiratory_rate").await?;
        Ok(reading(date, &day, day.respiratory_rate()))
    }

    pub async fn get_heart_rate(&self, user_id: &str, date: NaiveDate) -> Result<VitalReading> {
        let day = self.first_day(user_id, date, "get_heart_rate").await?;
        Ok(reading(date, &day, day.heart_rate()))
    }

    pub async fn get_sleep_stages(&self, user_id: &str, date: NaiveDate) -> Result<SleepStages> {
        let day = self.first_day(user_id, date, "get_sleep_stages").await?;
        Ok(SleepStages {
            date: day.day.clone().unwrap_or_else(|| date.to_string()),
            stages: day.stage_totals(),
        })
    }

    /// One headline summary per returned day.
    pub async fn get_sleep_trends(
        &self,
        user_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<SleepScore>> {
        let days = self
            .get_sleep_data(user_id, start, Some(end))
            .await
            .map_err(|e| e.context("get_sleep_trends"))?;
        let fallback = start.to_string();
        Ok(days
            .iter()
            .map(|d| SleepScore::from_day(&fallback, d))
            .collect())
    }

    // --- Alarms ---

    pub async fn list_alarms(&self, user_id: &str) -> Result<Vec<Alarm>> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/alarms"), &[])
            .await;
        let list: AlarmList = decode(raw.map(null_to_object), "list_alarms")?;
        Ok(list.alarms)
    }

    /// Create an alarm. The vendor assigns the id; retries may double-create.
    pub async fn create_alarm(&self, user_id: &str, alarm: &NewAlarm) -> Result<Value> {
        self.client
            .post(&format!("/users/{user_id}/alarms"), &to_body(alarm)?)
            .await
            .map_err(|e| e.context("create_alarm"))
    }

    pub async fn update_alarm(
        &self,
        user_id: &str,
        alarm_id: &str,
        update: &AlarmUpdate,
    ) -> Result<Value> {
        if update.is_empty() {
            return Err(EightSleepError::Validation("no alarm fields given".into())
                .context("update_alarm"));
        }
        self.client
            .put(
                &format!("/users/{user_id}/alarms/{alarm_id}"),
                &to_body(update)?,
            )
            .await
            .map_err(|e| e.context("update_alarm"))
    }

    pub async fn delete_alarm(&self, user_id: &str, alarm_id: &str) -> Result<Value> {
        self.client
            .delete(&format!("/users/{user_id}/alarms/{alarm_id}"))
            .await
            .map_err(|e| e.context("delete_alarm"))?;
        Ok(json!({ "success": true, "deleted": alarm_id }))
    }

    pub async fn snooze_alarm(&self, user_id: &str, alarm_id: &str, minutes: u32) -> Result<Value> {
        self.client
            .put(
                &format!("/users/{user_id}/alarms/{alarm_id}/snooze"),
                &json!({ "snoozeMinutes": minutes }),
            )
            .await
            .map_err(|e| e.context("snooze_alarm"))?;
        Ok(json!({ "success": true, "snoozed_minutes": minutes }))
    }

    pub async fn dismiss_alarm(&self, user_id: &str, alarm_id: &str) -> Result<Value> {
        self.client
            .put(
                &format!("/users/{user_id}/alarms/{alarm_id}/dismiss"),
                &json!({}),
            )
            .await
            .map_err(|e| e.context("dismiss_alarm"))?;
        Ok(json!({ "success": true }))
    }

    // --- Schedules ---

    pub async fn list_schedules(&self, user_id: &str) -> Result<Vec<Schedule>> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/schedules"), &[])
            .await;
        let list: ScheduleList = decode(raw.map(null_to_object), "list_schedules")?;
        Ok(list.schedules)
    }

    pub async fn create_schedule(&self, user_id: &str, schedule: &NewSchedule) -> Result<Value> {
        validate_level(schedule.level).map_err(|e| e.context("create_schedule"))?;
        self.client
            .post(&format!("/users/{user_id}/schedules"), &to_body(schedule)?)
            .await
            .map_err(|e| e.context("create_schedule"))
    }

    pub async fn update_schedule(
        &self,
        user_id: &str,
        schedule_id: &str,
        update: &ScheduleUpdate,
    ) -> Result<Value> {
        if update.is_empty() {
            return Err(EightSleepError::Validation("no schedule fields given".into())
                .context("update_schedule"));
        }
        if let Some(level) = update.level {
            validate_level(level).map_err(|e| e.context("update_schedule"))?;
        }
        self.client
            .put(
                &format!("/users/{user_id}/schedules/{schedule_id}"),
                &to_body(update)?,
            )
            .await
            .map_err(|e| e.context("update_schedule"))
    }

    pub async fn delete_schedule(&self, user_id: &str, schedule_id: &str) -> Result<Value> {
        self.client
            .delete(&format!("/users/{user_id}/schedules/{schedule_id}"))
            .await
            .map_err(|e| e.context("delete_schedule"))?;
        Ok(json!({ "success": true, "deleted": schedule_id }))
    }

    // --- Preferences ---

    pub async fn get_preferences(&self, user_id: &str) -> Result<Preferences> {
        let raw = self
            .client
            .get(&format!("/users/{user_id}/preferences"), &[])
            .await;
        decode(raw, "get_preferences")
    }

    pub async fn update_preferences(
        &self,
        user_id: &str,
        update: &PreferencesUpdate,
    ) -> Result<Value> {
        if update.is_empty() {
            return Err(
                EightSleepError::Validation("no preference fields given".into())
                    .context("update_preferences"),
            );
        }
        self.client
            .put(&format!("/users/{user_id}/preferences"), &to_body(update)?)
            .await
            .map_err(|e| e.context("update_preferences"))
    }
}

/// Reject heating levels outside `MIN_LEVEL..=MAX_LEVEL`.
pub fn validate_level(level: i64) -> Result<()> {
    if (MIN_LEVEL..=MAX_LEVEL).contains(&level) {
        Ok(())
    } else {
        Err(EightSleepError::Validation(format!(
            "level must be between {MIN_LEVEL} and {MAX_LEVEL}, got {level}"
        )))
    }
}

fn reading(date: NaiveDate, day: &SleepDay, metric: Option<&MetricScore>) -> VitalReading {
    VitalReading {
        date: day.day.clone().unwrap_or_else(|| date.to_string()),
        metric: metric.cloned().unwrap_or_default(),
    }
}

/// Decode a vendor payload, tagging both transport and decode failures with `operation`.
fn decode<T: DeserializeOwned>(raw: Result<Value>, operation: &str) -> Result<T> {
    let value = raw.map_err(|e| e.context(operation))?;
    serde_json::from_value(value).map_err(|e| {
        EightSleepError::Protocol(format!("unexpected response shape: {e}")).context(operation)
    })
}

/// Empty 2xx bodies come back as `null`; treat them as an empty object.
fn null_to_object(value: Value) -> Value {
    if value.is_null() {
        json!({})
    } else {
        value
    }
}

fn to_body<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| EightSleepError::Protocol(format!("failed to encode request: {e}")))
}
