//! Domain types shared across AlertGrid crates.
//!
//! An [`Alarm`] is the desired-state definition of a monitoring rule. Its
//! `version` is globally unique, doubles as the id of the task created on
//! a Kapacitor node, and is the key used to shard alarms across nodes.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Unique alarm version; also the Kapacitor task id.
pub type AlarmVersion = String;

/// Marker that identifies task ids owned by AlertGrid.
pub const DEFAULT_NAMESPACE: &str = "loda_";

/// Group-by value meaning "group by every tag, no time window".
pub const GROUP_BY_ALL: &str = "*";

// ── Alarm ──────────────────────────────────────────────────────────

/// Alerting strategy, determines the shape of the generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Alert on the spread (max - min) of the value within a window.
    Relative,
    /// Alert on an aggregate of the value crossing a threshold.
    Threshold,
    /// Alert when a series stops reporting. Not generated by AlertGrid.
    #[serde(alias = "dead_man")]
    DeadMan,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Relative => "relative",
            TriggerKind::Threshold => "threshold",
            TriggerKind::DeadMan => "deadman",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired-state definition of a monitoring rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    pub version: AlarmVersion,
    /// Human readable name, only used in logs.
    #[serde(default)]
    pub name: String,
    pub db: String,
    pub rp: String,
    pub measurement: String,
    /// InfluxQL filter, without the `WHERE` keyword.
    #[serde(rename = "where", default)]
    pub where_clause: String,
    /// `*` or a comma separated list of tags.
    #[serde(rename = "groupby", default)]
    pub group_by: String,
    /// Query period, e.g. "5m".
    pub period: String,
    /// Evaluation interval, e.g. "1m".
    pub every: String,
    pub trigger: TriggerKind,
    /// Aggregation function for threshold alarms (e.g. "mean").
    #[serde(default)]
    pub func: String,
    /// Comparison operator, e.g. ">".
    pub expression: String,
    #[serde(deserialize_with = "string_or_number")]
    pub value: String,
    /// Start hour of the active window (0-23).
    #[serde(default, alias = "starttime", deserialize_with = "optional_hour")]
    pub stime: Option<String>,
    /// End hour of the active window (0-23).
    #[serde(default, alias = "endtime", deserialize_with = "optional_hour")]
    pub etime: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub enable: bool,
}

/// Whether `task_id` carries the AlertGrid namespace marker.
///
/// Tasks without the marker were created by someone else and must never
/// be deleted by the engine.
pub fn is_owned(task_id: &str, namespace: &str) -> bool {
    !namespace.is_empty() && task_id.contains(namespace)
}

// ── Alarm sets ─────────────────────────────────────────────────────

/// Desired alarms keyed by version.
pub type AlarmSet = HashMap<AlarmVersion, Alarm>;

/// On-disk alarm documents: either keyed by version or a plain list.
#[derive(Deserialize)]
#[serde(untagged)]
enum AlarmDocument {
    Keyed(BTreeMap<String, Alarm>),
    List(Vec<Alarm>),
}

/// Parse a JSON alarm document into an [`AlarmSet`].
///
/// Keyed documents are re-keyed by each alarm's own version so the map key
/// can never disagree with the task id. When two entries share a version
/// the first one wins (document order for lists, key order for objects)
/// and the rest are logged and dropped.
pub fn parse_alarm_set(json: &str) -> serde_json::Result<AlarmSet> {
    let alarms = match serde_json::from_str::<AlarmDocument>(json)? {
        AlarmDocument::Keyed(map) => map.into_values().collect::<Vec<_>>(),
        AlarmDocument::List(list) => list,
    };

    let mut set = AlarmSet::with_capacity(alarms.len());
    for alarm in alarms {
        match set.entry(alarm.version.clone()) {
            Entry::Occupied(kept) => {
                warn!(
                    version = %alarm.version,
                    kept = %kept.get().name,
                    dropped = %alarm.name,
                    "duplicate alarm version, dropping"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(alarm);
            }
        }
    }
    Ok(set)
}

// ── serde helpers ──────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(untagged)]
enum BoolOrString {
    Bool(bool),
    Str(String),
}

/// Accepts `true`/`false` or the string forms a boolean parser accepts.
/// Anything unrecognised means disabled.
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => b,
        BoolOrString::Str(s) => matches!(s.as_str(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Str(String),
}

impl NumberOrString {
    fn into_string(self) -> String {
        match self {
            NumberOrString::Int(i) => i.to_string(),
            NumberOrString::Float(f) => f.to_string(),
            NumberOrString::Str(s) => s,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(NumberOrString::deserialize(deserializer)?.into_string())
}

/// Empty strings and nulls both mean "no bound".
fn optional_hour<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NumberOrString>::deserialize(deserializer)?;
    Ok(raw
        .map(NumberOrString::into_string)
        .filter(|s| !s.trim().is_empty()))
}
