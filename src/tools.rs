//! MCP tool definitions and handlers.
//!
//! Each tool is defined as a JSON schema (returned by [`tool_definitions`])
//! and handled by an async function dispatched from [`handle_tool_call`].
//! Every tool accepts an optional `user_id`; when omitted the configured (or
//! token-issued) user is addressed.
//!
//! ## Tool categories
//!
//! - **Pod**: `get_user_profile`, `get_device_status`, `get_presence`
//! - **Temperature**: `get_temperature`, `set_temperature`, `turn_on`, `turn_off`
//! - **Sleep**: `get_sleep_data`, `get_sleep_score`, `get_hrv`,
//!   `get_respiratory_rate`, `get_heart_rate`, `get_sleep_stages`,
//!   `get_sleep_trends`
//! - **Alarms**: `list_alarms`, `create_alarm`, `update_alarm`,
//!   `delete_alarm`, `snooze_alarm`, `dismiss_alarm`
//! - **Schedules**: `list_schedules`, `create_schedule`, `update_schedule`,
//!   `delete_schedule`
//! - **Preferences**: `get_preferences`, `update_preferences`
//!
//! Arguments are validated before any network call; results are returned as
//! pretty-printed JSON text.

use chrono::{Days, Local, NaiveDate, NaiveTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::api::{validate_level, EightSleepApi};
use crate::error::{EightSleepError, Result};
use crate::models::{
    AlarmUpdate, BedSide, NewAlarm, NewSchedule, PreferencesUpdate, ScheduleUpdate, Units,
};

/// Days covered by `get_sleep_trends` when no end date is given.
const DEFAULT_TREND_DAYS: u64 = 7;
const DEFAULT_SNOOZE_MINUTES: u32 = 9;

/// Returns all tool definitions.
pub fn tool_definitions() -> Vec<Value> {
    vec![
        // --- Pod ---
        json!({
            "name": "get_user_profile",
            "description": "Get the Eight Sleep account profile: name, email, assigned device and side.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "get_device_status",
            "description": "Get the pod's hardware status: online state, firmware version, water level and priming state.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "get_presence",
            "description": "Check whether someone is currently in bed on the user's side.",
            "inputSchema": schema(json!({}), &[])
        }),
        // --- Temperature ---
        json!({
            "name": "get_temperature",
            "description": "Get the current and target heating level of the user's side. Levels run from -100 (coldest) to 100 (warmest); heating/cooling flags follow the target level.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "set_temperature",
            "description": "Set the heating level of the user's side. Optionally hold the level only for a number of seconds, after which the pod returns to its schedule.",
            "inputSchema": schema(json!({
                "level": {
                    "type": "integer",
                    "description": "Heating level from -100 (coldest) to 100 (warmest).",
                    "minimum": -100,
                    "maximum": 100
                },
                "duration": {
                    "type": "integer",
                    "description": "Seconds to hold the level. 0 (default) sets it indefinitely.",
                    "minimum": 0,
                    "default": 0
                }
            }), &["level"])
        }),
        json!({
            "name": "turn_on",
            "description": "Turn on temperature control (smart mode) for the user's side.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "turn_off",
            "description": "Turn off temperature control for the user's side.",
            "inputSchema": schema(json!({}), &[])
        }),
        // --- Sleep ---
        json!({
            "name": "get_sleep_data",
            "description": "Get raw per-night sleep records between two dates. Returns an empty list when no nights were recorded.",
            "inputSchema": schema(json!({
                "start_date": date_property("First night (YYYY-MM-DD)."),
                "end_date": date_property("Last night, exclusive (YYYY-MM-DD). Defaults to the day after start_date.")
            }), &["start_date"])
        }),
        json!({
            "name": "get_sleep_score",
            "description": "Get the sleep score, sleep duration and toss-and-turn count for one night.",
            "inputSchema": schema(json!({ "date": night_property() }), &[])
        }),
        json!({
            "name": "get_hrv",
            "description": "Get heart-rate variability for one night: score, night value and personal baseline.",
            "inputSchema": schema(json!({ "date": night_property() }), &[])
        }),
        json!({
            "name": "get_respiratory_rate",
            "description": "Get breathing rate for one night: score, night value (breaths/min) and personal baseline.",
            "inputSchema": schema(json!({ "date": night_property() }), &[])
        }),
        json!({
            "name": "get_heart_rate",
            "description": "Get resting heart rate for one night: night value (bpm) and personal baseline.",
            "inputSchema": schema(json!({ "date": night_property() }), &[])
        }),
        json!({
            "name": "get_sleep_stages",
            "description": "Get seconds spent in each sleep stage (awake, light, deep, rem) for one night. Stages the pod did not record are omitted.",
            "inputSchema": schema(json!({ "date": night_property() }), &[])
        }),
        json!({
            "name": "get_sleep_trends",
            "description": "Get one summary (score, duration, toss-and-turns) per night over a date range.",
            "inputSchema": schema(json!({
                "start_date": date_property("First night (YYYY-MM-DD)."),
                "end_date": date_property("Last night, exclusive (YYYY-MM-DD). Defaults to 7 days after start_date.")
            }), &["start_date"])
        }),
        // --- Alarms ---
        json!({
            "name": "list_alarms",
            "description": "List the user's alarms.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "create_alarm",
            "description": "Create a new alarm. Calling twice creates two alarms.",
            "inputSchema": schema(json!({
                "time": time_property("Alarm time (HH:mm, 24h)."),
                "days_of_week": days_property(),
                "enabled": {
                    "type": "boolean",
                    "description": "Whether the alarm is active. Default true.",
                    "default": true
                },
                "vibration": {
                    "type": "boolean",
                    "description": "Wake with pod vibration. Default true.",
                    "default": true
                },
                "sound": {
                    "type": "string",
                    "description": "Optional sound name to play."
                }
            }), &["time", "days_of_week"])
        }),
        json!({
            "name": "update_alarm",
            "description": "Update an existing alarm. Only the given fields change.",
            "inputSchema": schema(json!({
                "alarm_id": { "type": "string", "description": "Alarm ID from list_alarms." },
                "time": time_property("New alarm time (HH:mm, 24h)."),
                "days_of_week": days_property(),
                "enabled": { "type": "boolean", "description": "Enable or disable the alarm." },
                "vibration": { "type": "boolean", "description": "Wake with pod vibration." },
                "sound": { "type": "string", "description": "Sound name to play." }
            }), &["alarm_id"])
        }),
        json!({
            "name": "delete_alarm",
            "description": "Delete an alarm permanently.",
            "inputSchema": schema(json!({
                "alarm_id": { "type": "string", "description": "Alarm ID from list_alarms." }
            }), &["alarm_id"])
        }),
        json!({
            "name": "snooze_alarm",
            "description": "Snooze a ringing alarm.",
            "inputSchema": schema(json!({
                "alarm_id": { "type": "string", "description": "Alarm ID from list_alarms." },
                "minutes": {
                    "type": "integer",
                    "description": "Snooze length in minutes. Default 9.",
                    "minimum": 1,
                    "maximum": 60,
                    "default": DEFAULT_SNOOZE_MINUTES
                }
            }), &["alarm_id"])
        }),
        json!({
            "name": "dismiss_alarm",
            "description": "Stop a ringing alarm.",
            "inputSchema": schema(json!({
                "alarm_id": { "type": "string", "description": "Alarm ID from list_alarms." }
            }), &["alarm_id"])
        }),
        // --- Schedules ---
        json!({
            "name": "list_schedules",
            "description": "List the user's temperature schedules.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "create_schedule",
            "description": "Create a recurring temperature change. Calling twice creates two schedules.",
            "inputSchema": schema(json!({
                "start_time": time_property("Time the level takes effect (HH:mm, 24h)."),
                "level": {
                    "type": "integer",
                    "description": "Heating level from -100 to 100.",
                    "minimum": -100,
                    "maximum": 100
                },
                "days_of_week": days_property(),
                "enabled": {
                    "type": "boolean",
                    "description": "Whether the schedule is active. Default true.",
                    "default": true
                }
            }), &["start_time", "level", "days_of_week"])
        }),
        json!({
            "name": "update_schedule",
            "description": "Update an existing temperature schedule. Only the given fields change.",
            "inputSchema": schema(json!({
                "schedule_id": { "type": "string", "description": "Schedule ID from list_schedules." },
                "start_time": time_property("New start time (HH:mm, 24h)."),
                "level": {
                    "type": "integer",
                    "description": "Heating level from -100 to 100.",
                    "minimum": -100,
                    "maximum": 100
                },
                "days_of_week": days_property(),
                "enabled": { "type": "boolean", "description": "Enable or disable the schedule." }
            }), &["schedule_id"])
        }),
        json!({
            "name": "delete_schedule",
            "description": "Delete a temperature schedule permanently.",
            "inputSchema": schema(json!({
                "schedule_id": { "type": "string", "description": "Schedule ID from list_schedules." }
            }), &["schedule_id"])
        }),
        // --- Preferences ---
        json!({
            "name": "get_preferences",
            "description": "Get the user's preferences: units, timezone, bed side and sleep goal.",
            "inputSchema": schema(json!({}), &[])
        }),
        json!({
            "name": "update_preferences",
            "description": "Update user preferences. Only the given fields change; pass bed_side=null to clear the side.",
            "inputSchema": schema(json!({
                "units": {
                    "type": "string",
                    "description": "Measurement units.",
                    "enum": ["imperial", "metric"]
                },
                "timezone": {
                    "type": "string",
                    "description": "IANA timezone, e.g. 'America/New_York'."
                },
                "bed_side": {
                    "type": ["string", "null"],
                    "description": "Which side of the bed the user sleeps on.",
                    "enum": ["left", "right", null]
                },
                "sleep_goal": {
                    "type": "integer",
                    "description": "Nightly sleep goal in minutes.",
                    "minimum": 0,
                    "maximum": 1440
                }
            }), &[])
        }),
    ]
}

/// Build an object schema: adds the common `user_id` property.
fn schema(mut properties: Value, required: &[&str]) -> Value {
    properties["user_id"] = json!({
        "type": "string",
        "description": "Eight Sleep user ID. Omit to use the configured user."
    });
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn date_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "pattern": "^\\d{4}-\\d{2}-\\d{2}$"
    })
}

fn night_property() -> Value {
    date_property("Night to read (YYYY-MM-DD). Defaults to today.")
}

fn time_property(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description,
        "pattern": "^([01]\\d|2[0-3]):[0-5]\\d$"
    })
}

fn days_property() -> Value {
    json!({
        "type": "array",
        "description": "Days of week the entry repeats on (0=Sunday ... 6=Saturday).",
        "items": { "type": "integer", "minimum": 0, "maximum": 6 },
        "uniqueItems": true
    })
}

/// Handle a tool call and return MCP content.
pub async fn handle_tool_call(name: &str, args: &Value, api: &EightSleepApi) -> ToolResult {
    debug!(tool = name, "tool call");
    let result = match name {
        "get_user_profile" => handle_user_profile(args, api).await,
        "get_device_status" => handle_device_status(args, api).await,
        "get_presence" => handle_presence(args, api).await,
        "get_temperature" => handle_get_temperature(args, api).await,
        "set_temperature" => handle_set_temperature(args, api).await,
        "turn_on" => handle_power(args, api, true).await,
        "turn_off" => handle_power(args, api, false).await,
        "get_sleep_data" => handle_sleep_data(args, api).await,
        "get_sleep_score" => handle_sleep_score(args, api).await,
        "get_hrv" => handle_hrv(args, api).await,
        "get_respiratory_rate" => handle_respiratory_rate(args, api).await,
        "get_heart_rate" => handle_heart_rate(args, api).await,
        "get_sleep_stages" => handle_sleep_stages(args, api).await,
        "get_sleep_trends" => handle_sleep_trends(args, api).await,
        "list_alarms" => handle_list_alarms(args, api).await,
        "create_alarm" => handle_create_alarm(args, api).await,
        "update_alarm" => handle_update_alarm(args, api).await,
        "delete_alarm" => handle_delete_alarm(args, api).await,
        "snooze_alarm" => handle_snooze_alarm(args, api).await,
        "dismiss_alarm" => handle_dismiss_alarm(args, api).await,
        "list_schedules" => handle_list_schedules(args, api).await,
        "create_schedule" => handle_create_schedule(args, api).await,
        "update_schedule" => handle_update_schedule(args, api).await,
        "delete_schedule" => handle_delete_schedule(args, api).await,
        "get_preferences" => handle_get_preferences(args, api).await,
        "update_preferences" => handle_update_preferences(args, api).await,
        _ => return ToolResult::error(format!("Unknown tool: {name}")),
    };

    match result {
        Ok(v) => ToolResult::success(v),
        Err(e) => {
            warn!(tool = name, retryable = e.is_retryable(), "tool call failed: {e}");
            ToolResult::error(e.to_string())
        }
    }
}

/// Result of an MCP tool call, ready to be serialized into a JSON-RPC response.
#[derive(Debug)]
pub struct ToolResult {
    /// MCP content blocks (a single `{"type":"text","text":"..."}` entry).
    pub content: Vec<Value>,
    /// Whether the tool call failed (maps to `isError` in the MCP response).
    pub is_error: bool,
}

impl ToolResult {
    fn success(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_default();
        Self {
            content: vec![json!({ "type": "text", "text": text })],
            is_error: false,
        }
    }

    fn error(message: String) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": message })],
            is_error: true,
        }
    }

    /// Text of the first content block.
    pub fn text(&self) -> &str {
        self.content
            .first()
            .and_then(|c| c["text"].as_str())
            .unwrap_or("")
    }
}

// --- Argument decoding ---

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UserArgs {
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NightArgs {
    user_id: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RangeArgs {
    user_id: Option<String>,
    start_date: String,
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetTemperatureArgs {
    user_id: Option<String>,
    level: i64,
    #[serde(default)]
    duration: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateAlarmArgs {
    user_id: Option<String>,
    time: String,
    days_of_week: Vec<u8>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    vibration: bool,
    sound: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateAlarmArgs {
    user_id: Option<String>,
    alarm_id: String,
    time: Option<String>,
    days_of_week: Option<Vec<u8>>,
    enabled: Option<bool>,
    vibration: Option<bool>,
    sound: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AlarmIdArgs {
    user_id: Option<String>,
    alarm_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnoozeArgs {
    user_id: Option<String>,
    alarm_id: String,
    #[serde(default = "default_snooze_minutes")]
    minutes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreateScheduleArgs {
    user_id: Option<String>,
    start_time: String,
    level: i64,
    days_of_week: Vec<u8>,
    #[serde(default = "default_true")]
    enabled: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateScheduleArgs {
    user_id: Option<String>,
    schedule_id: String,
    start_time: Option<String>,
    level: Option<i64>,
    days_of_week: Option<Vec<u8>>,
    enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleIdArgs {
    user_id: Option<String>,
    schedule_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdatePreferencesArgs {
    user_id: Option<String>,
    units: Option<Units>,
    timezone: Option<String>,
    #[serde(default, deserialize_with = "crate::models::double_option")]
    bed_side: Option<Option<BedSide>>,
    sleep_goal: Option<u32>,
}

fn default_true() -> bool {
    true
}

fn default_snooze_minutes() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}

/// Decode tool arguments. A missing `arguments` object reads as `{}`.
fn parse_args<T: DeserializeOwned>(args: &Value) -> Result<T> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| EightSleepError::Validation(e.to_string()))
}

fn parse_date(field: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        EightSleepError::Validation(format!("{field} must be YYYY-MM-DD, got '{raw}'"))
    })
}

fn night_or_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(d) => parse_date("date", d),
        None => Ok(Local::now().date_naive()),
    }
}

/// Accept `HH:mm` on a 24h clock.
fn validate_time(field: &str, raw: &str) -> Result<()> {
    let well_formed = raw.len() == 5 && NaiveTime::parse_from_str(raw, "%H:%M").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(EightSleepError::Validation(format!(
            "{field} must be HH:mm (24h), got '{raw}'"
        )))
    }
}

/// Days are 0 (Sunday) through 6 (Saturday).
fn validate_days(days: &[u8]) -> Result<()> {
    if days.is_empty() {
        return Err(EightSleepError::Validation(
            "days_of_week must name at least one day".into(),
        ));
    }
    match days.iter().find(|d| **d > 6) {
        Some(bad) => Err(EightSleepError::Validation(format!(
            "days_of_week entries must be 0-6 (0=Sunday), got {bad}"
        ))),
        None => Ok(()),
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| EightSleepError::Protocol(format!("failed to encode result: {e}")))
}

// --- Pod ---

async fn handle_user_profile(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.get_user_profile(&user).await
}

async fn handle_device_status(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_device_status(&user).await?)
}

async fn handle_presence(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let present = api.get_presence(&user).await?;
    Ok(json!({ "present": present }))
}

// --- Temperature ---

async fn handle_get_temperature(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_temperature(&user).await?)
}

async fn handle_set_temperature(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: SetTemperatureArgs = parse_args(args)?;
    // Resolving the user may log in, so the level is checked first.
    validate_level(a.level)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.set_temperature(&user, a.level, a.duration).await
}

async fn handle_power(args: &Value, api: &EightSleepApi, on: bool) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.set_power(&user, on).await
}

// --- Sleep ---

async fn handle_sleep_data(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: RangeArgs = parse_args(args)?;
    let start = parse_date("start_date", &a.start_date)?;
    let end = a
        .end_date
        .as_deref()
        .map(|d| parse_date("end_date", d))
        .transpose()?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let days = api.get_sleep_data(&user, start, end).await?;
    Ok(json!({ "days": to_json(days)? }))
}

async fn handle_sleep_score(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: NightArgs = parse_args(args)?;
    let date = night_or_today(a.date.as_deref())?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_sleep_score(&user, date).await?)
}

async fn handle_hrv(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: NightArgs = parse_args(args)?;
    let date = night_or_today(a.date.as_deref())?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_hrv(&user, date).await?)
}

async fn handle_respiratory_rate(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: NightArgs = parse_args(args)?;
    let date = night_or_today(a.date.as_deref())?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_respiratory_rate(&user, date).await?)
}

async fn handle_heart_rate(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: NightArgs = parse_args(args)?;
    let date = night_or_today(a.date.as_deref())?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_heart_rate(&user, date).await?)
}

async fn handle_sleep_stages(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: NightArgs = parse_args(args)?;
    let date = night_or_today(a.date.as_deref())?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_sleep_stages(&user, date).await?)
}

async fn handle_sleep_trends(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: RangeArgs = parse_args(args)?;
    let start = parse_date("start_date", &a.start_date)?;
    let end = match a.end_date.as_deref() {
        Some(d) => parse_date("end_date", d)?,
        None => start
            .checked_add_days(Days::new(DEFAULT_TREND_DAYS))
            .ok_or_else(|| EightSleepError::Validation(format!("date out of range: {start}")))?,
    };
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let nights = api.get_sleep_trends(&user, start, end).await?;
    Ok(json!({ "nights": to_json(nights)? }))
}

// --- Alarms ---

async fn handle_list_alarms(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let alarms = api.list_alarms(&user).await?;
    Ok(json!({ "alarms": to_json(alarms)? }))
}

async fn handle_create_alarm(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: CreateAlarmArgs = parse_args(args)?;
    validate_time("time", &a.time)?;
    validate_days(&a.days_of_week)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let alarm = NewAlarm {
        time: a.time,
        days_of_week: a.days_of_week,
        enabled: a.enabled,
        vibration: a.vibration,
        sound: a.sound,
    };
    api.create_alarm(&user, &alarm).await
}

async fn handle_update_alarm(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UpdateAlarmArgs = parse_args(args)?;
    if let Some(t) = &a.time {
        validate_time("time", t)?;
    }
    if let Some(d) = &a.days_of_week {
        validate_days(d)?;
    }
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let update = AlarmUpdate {
        enabled: a.enabled,
        time: a.time,
        days_of_week: a.days_of_week,
        vibration: a.vibration,
        sound: a.sound,
    };
    api.update_alarm(&user, &a.alarm_id, &update).await
}

async fn handle_delete_alarm(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: AlarmIdArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.delete_alarm(&user, &a.alarm_id).await
}

async fn handle_snooze_alarm(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: SnoozeArgs = parse_args(args)?;
    if !(1..=60).contains(&a.minutes) {
        return Err(EightSleepError::Validation(format!(
            "minutes must be between 1 and 60, got {}",
            a.minutes
        )));
    }
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.snooze_alarm(&user, &a.alarm_id, a.minutes).await
}

async fn handle_dismiss_alarm(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: AlarmIdArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.dismiss_alarm(&user, &a.alarm_id).await
}

// --- Schedules ---

async fn handle_list_schedules(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let schedules = api.list_schedules(&user).await?;
    Ok(json!({ "schedules": to_json(schedules)? }))
}

async fn handle_create_schedule(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: CreateScheduleArgs = parse_args(args)?;
    validate_time("start_time", &a.start_time)?;
    validate_days(&a.days_of_week)?;
    validate_level(a.level)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let schedule = NewSchedule {
        start_time: a.start_time,
        level: a.level,
        days_of_week: a.days_of_week,
        enabled: a.enabled,
    };
    api.create_schedule(&user, &schedule).await
}

async fn handle_update_schedule(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UpdateScheduleArgs = parse_args(args)?;
    if let Some(t) = &a.start_time {
        validate_time("start_time", t)?;
    }
    if let Some(d) = &a.days_of_week {
        validate_days(d)?;
    }
    if let Some(level) = a.level {
        validate_level(level)?;
    }
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    let update = ScheduleUpdate {
        start_time: a.start_time,
        level: a.level,
        days_of_week: a.days_of_week,
        enabled: a.enabled,
    };
    api.update_schedule(&user, &a.schedule_id, &update).await
}

async fn handle_delete_schedule(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: ScheduleIdArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.delete_schedule(&user, &a.schedule_id).await
}

// --- Preferences ---

async fn handle_get_preferences(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UserArgs = parse_args(args)?;
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    to_json(api.get_preferences(&user).await?)
}

async fn handle_update_preferences(args: &Value, api: &EightSleepApi) -> Result<Value> {
    let a: UpdatePreferencesArgs = parse_args(args)?;
    let update = PreferencesUpdate {
        units: a.units,
        timezone: a.timezone,
        bed_side: a.bed_side,
        sleep_goal: a.sleep_goal,
    };
    let user = api.resolve_user(a.user_id.as_deref()).await?;
    api.update_preferences(&user, &update).await
}
