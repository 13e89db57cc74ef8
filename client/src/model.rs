use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field name to measured value, as posted by devices and returned in readings.
pub type Fields = BTreeMap<String, f64>;

/// A named data-collection bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub allowed_fields: Vec<String>,
    pub max_fields: u32,
    pub min_write_interval_seconds: u64,
    pub min_read_interval_seconds: u64,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/channels`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannel {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub allowed_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScope {
    Read,
    Write,
    #[default]
    ReadWrite,
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyScope::Read => "read",
            KeyScope::Write => "write",
            KeyScope::ReadWrite => "readwrite",
        })
    }
}

impl FromStr for KeyScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(KeyScope::Read),
            "write" => Ok(KeyScope::Write),
            "readwrite" => Ok(KeyScope::ReadWrite),
            other => Err(format!("unknown key scope '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub key: String,
    pub scope: KeyScope,
    #[serde(rename = "channelId")]
    pub channel_id: String,
}

/// One sampled observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub ts: DateTime<Utc>,
    pub fields: Fields,
}

/// One point of a single-field time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDataPoint {
    pub ts: DateTime<Utc>,
    pub value: f64,
}

/// Acknowledgement returned by reading submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
}

impl ComparisonOp {
    pub const ALL: [ComparisonOp; 5] = [
        ComparisonOp::Gt,
        ComparisonOp::Gte,
        ComparisonOp::Lt,
        ComparisonOp::Lte,
        ComparisonOp::Eq,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Eq => "==",
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComparisonOp::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown comparison operator '{s}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub op: ComparisonOp,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

impl Action {
    pub fn webhook(url: impl Into<String>) -> Self {
        Self {
            kind: "webhook".to_string(),
            url: url.into(),
        }
    }
}

/// A conditional webhook rule attached to one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub channel_id: String,
    pub name: String,
    pub enabled: bool,
    pub rule: Rule,
    pub action: Action,
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/workflows`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewWorkflow {
    pub name: String,
    pub enabled: bool,
    pub rule: Rule,
    pub action: Action,
}

impl NewWorkflow {
    /// An enabled workflow.
    pub fn new(name: impl Into<String>, rule: Rule, action: Action) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            rule,
            action,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingsQuery {
    pub limit: u32,
    pub since: Option<DateTime<Utc>>,
}

impl Default for ReadingsQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            since: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesQuery {
    pub field: String,
    pub limit: u32,
    pub since: Option<DateTime<Utc>>,
}

impl SeriesQuery {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            limit: 50,
            since: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportQuery {
    pub limit: u32,
}

impl Default for ExportQuery {
    fn default() -> Self {
        Self { limit: 1000 }
    }
}
