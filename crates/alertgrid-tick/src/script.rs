//! Batch TICKscript builder and renderer.
//!
//! The rendered layout (indentation, blank alignment line, spacing inside
//! the crit lambda) is what existing Kapacitor deployments already run, so
//! it is kept byte-for-byte stable.

use std::fmt;

use alertgrid_core::{Alarm, GROUP_BY_ALL, TriggerKind};

use crate::window::{HourWindow, time_window};
use crate::{TickError, TickResult};

/// Tumbling window every grouped query is bucketed by.
const TIME_BUCKET: &str = "time(1m,-5s)";
/// Aligns buckets on wall-clock minutes with a fixed stagger.
const ALIGNMENT: &str = ".align()\n.offset(5s)";
const RELATIVE_SELECT: &str = r#"(max("value")-min("value")) as diff"#;
const RELATIVE_FIELD: &str = "diff";

/// Grouping of the batch query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBy {
    /// `groupBy(*)`: every tag, no time bucketing.
    All,
    /// One-minute buckets, further split by the listed tags.
    Windowed { tags: Vec<String> },
}

impl GroupBy {
    pub fn parse(raw: &str) -> Self {
        if raw == GROUP_BY_ALL {
            return GroupBy::All;
        }
        let tags = raw
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        GroupBy::Windowed { tags }
    }

    /// Modifier rendered on the line after `.groupBy(..)`.
    fn alignment(&self) -> &'static str {
        match self {
            GroupBy::All => "",
            GroupBy::Windowed { .. } => ALIGNMENT,
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::All => f.write_str(GROUP_BY_ALL),
            GroupBy::Windowed { tags } => {
                f.write_str(TIME_BUCKET)?;
                for tag in tags {
                    write!(f, ", '{tag}'")?;
                }
                Ok(())
            }
        }
    }
}

/// Structured form of a batch alert script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickScript {
    pub select: String,
    pub database: String,
    pub retention_policy: String,
    pub measurement: String,
    pub filter: Option<String>,
    pub period: String,
    pub every: String,
    pub group_by: GroupBy,
    /// Result column the crit lambda compares.
    pub crit_field: String,
    pub expression: String,
    pub threshold: String,
    pub window: Option<HourWindow>,
    /// Full alert callback, including the version query parameter.
    pub post_url: String,
}

impl TickScript {
    /// Build the clause set for `alarm`, posting alerts to `event_addr`.
    pub fn from_alarm(alarm: &Alarm, event_addr: &str) -> TickResult<Self> {
        let filter = Some(alarm.where_clause.trim())
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        let window = time_window(alarm.stime.as_deref(), alarm.etime.as_deref())?;

        let (select, crit_field) = match alarm.trigger {
            TriggerKind::Relative => (RELATIVE_SELECT.to_string(), RELATIVE_FIELD.to_string()),
            TriggerKind::Threshold => {
                let func = alarm.func.trim();
                if func.is_empty() {
                    return Err(TickError::MissingFunction(alarm.version.clone()));
                }
                (format!("{func}(value)"), func.to_string())
            }
            other => return Err(TickError::UnsupportedTrigger(other.to_string())),
        };

        Ok(Self {
            select,
            database: alarm.db.clone(),
            retention_policy: alarm.rp.clone(),
            measurement: alarm.measurement.clone(),
            filter,
            period: alarm.period.clone(),
            every: alarm.every.clone(),
            group_by: GroupBy::parse(&alarm.group_by),
            crit_field,
            expression: alarm.expression.clone(),
            threshold: alarm.value.clone(),
            window,
            post_url: format!("{event_addr}?version={}", alarm.version),
        })
    }
}

impl fmt::Display for TickScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filter = self
            .filter
            .as_ref()
            .map(|w| format!("WHERE {w}"))
            .unwrap_or_default();
        let window = self.window.as_ref().map(|w| w.to_string()).unwrap_or_default();

        writeln!(f)?;
        writeln!(f, "batch")?;
        writeln!(f, "    |query('''")?;
        writeln!(f, "        SELECT {}", self.select)?;
        writeln!(
            f,
            "        FROM \"{}\".\"{}\".\"{}\" {filter}",
            self.database, self.retention_policy, self.measurement
        )?;
        writeln!(f, "    ''')")?;
        writeln!(f, "        .period({})", self.period)?;
        writeln!(f, "        .every({})", self.every)?;
        writeln!(f, "        .groupBy({})", self.group_by)?;
        writeln!(f, "        {}", self.group_by.alignment())?;
        writeln!(f, "    |alert()")?;
        writeln!(
            f,
            "        .crit(lambda: \"{}\" {} {} {window})",
            self.crit_field, self.expression, self.threshold
        )?;
        write!(f, "        .post('{}')", self.post_url)
    }
}

/// Render the TICKscript for `alarm`.
pub fn generate(alarm: &Alarm, event_addr: &str) -> TickResult<String> {
    Ok(TickScript::from_alarm(alarm, event_addr)?.to_string())
}
