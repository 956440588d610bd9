//! Read model shared by capability modules and the dashboard API.

use std::collections::BTreeMap;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Inclusive calendar window used by every read aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePreset {
    Day,
    Week,
    Month,
}

impl RangePreset {
    /// Unknown or missing names fall back to a month.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(|value| value.trim().to_ascii_lowercase()).as_deref() {
            Some("day") => Self::Day,
            Some("week") => Self::Week,
            _ => Self::Month,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl TimeRange {
    pub fn new(since: NaiveDate, until: NaiveDate) -> Self {
        Self { since, until }
    }

    pub fn preset(preset: RangePreset, today: NaiveDate) -> Self {
        let since = match preset {
            RangePreset::Day => today - chrono::Duration::days(1),
            RangePreset::Week => today - chrono::Duration::days(7),
            RangePreset::Month => today
                .checked_sub_months(Months::new(1))
                .unwrap_or_else(|| today - chrono::Duration::days(30)),
        };
        Self { since, until: today }
    }

    pub fn ending_today(preset: RangePreset) -> Self {
        Self::preset(preset, Utc::now().date_naive())
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let date = timestamp.date_naive();
        date >= self.since && date <= self.until
    }

    /// `YYYY-MM-DD`, the form every backend query language accepts.
    pub fn since_str(&self) -> String {
        self.since.format("%Y-%m-%d").to_string()
    }

    pub fn until_str(&self) -> String {
        self.until.format("%Y-%m-%d").to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Info,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertItem {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub source: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub description: String,
    pub items: Vec<AlertItem>,
    pub timestamp: DateTime<Utc>,
}

/// Metric name to integer value for one module.
pub type SummaryMetrics = BTreeMap<String, i64>;

/// Parses RFC 3339 timestamps from backend payloads; anything else is `None`.
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}
