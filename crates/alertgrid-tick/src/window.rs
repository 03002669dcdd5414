//! Active-hours predicate appended to alert conditions.

use std::fmt;

use tracing::warn;

use crate::{TickError, TickResult};

/// Inclusive range of hours during which an alarm may fire.
///
/// `start > end` means the window wraps past midnight (22 → 2 covers
/// 22:00 through 02:59). The bounds render exactly as the alarm spelled
/// them, so `"08"` stays `08`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HourWindow {
    pub start: u8,
    pub end: u8,
    start_text: String,
    end_text: String,
}

impl HourWindow {
    pub fn wraps_midnight(&self) -> bool {
        self.start > self.end
    }

    fn joiner(&self) -> &'static str {
        if self.wraps_midnight() { "OR" } else { "AND" }
    }
}

impl fmt::Display for HourWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AND (hour(\"time\") >= {} {} hour(\"time\") <= {})",
            self.start_text,
            self.joiner(),
            self.end_text
        )
    }
}

/// Build the active-hours window from raw alarm bounds.
///
/// Returns `None` when either bound is missing or both are equal (the
/// alarm is active all day). Bounds that are not hours of the day are an
/// error.
pub fn time_window(start: Option<&str>, end: Option<&str>) -> TickResult<Option<HourWindow>> {
    let (Some(raw_start), Some(raw_end)) = (non_blank(start), non_blank(end)) else {
        return Ok(None);
    };

    let (Some(start), Some(end)) = (parse_hour(raw_start), parse_hour(raw_end)) else {
        warn!(stime = raw_start, etime = raw_end, "malformed alarm time window");
        return Err(TickError::MalformedTimeWindow {
            start: raw_start.to_string(),
            end: raw_end.to_string(),
        });
    };

    if start == end {
        return Ok(None);
    }
    Ok(Some(HourWindow {
        start,
        end,
        start_text: raw_start.to_string(),
        end_text: raw_end.to_string(),
    }))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_hour(s: &str) -> Option<u8> {
    s.parse::<u8>().ok().filter(|h| *h < 24)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daytime_window_joins_with_and() {
        let window = time_window(Some("10"), Some("18")).unwrap().unwrap();
        assert!(!window.wraps_midnight());
        assert_eq!(
            window.to_string(),
            r#"AND (hour("time") >= 10 AND hour("time") <= 18)"#
        );
    }

    #[test]
    fn overnight_window_joins_with_or() {
        let window = time_window(Some("22"), Some("2")).unwrap().unwrap();
        assert!(window.wraps_midnight());
        assert_eq!(
            window.to_string(),
            r#"AND (hour("time") >= 22 OR hour("time") <= 2)"#
        );
    }

    #[test]
    fn bounds_render_as_written() {
        let window = time_window(Some("08"), Some("17")).unwrap().unwrap();
        assert_eq!(window.start, 8);
        assert_eq!(
            window.to_string(),
            r#"AND (hour("time") >= 08 AND hour("time") <= 17)"#
        );
    }

    #[test]
    fn equal_bounds_mean_all_day() {
        assert_eq!(time_window(Some("5"), Some("5")).unwrap(), None);
    }

    #[test]
    fn missing_bound_means_all_day() {
        assert_eq!(time_window(None, Some("5")).unwrap(), None);
        assert_eq!(time_window(Some("5"), None).unwrap(), None);
        assert_eq!(time_window(Some(""), Some("  ")).unwrap(), None);
        // The other bound is not inspected when one is absent.
        assert_eq!(time_window(Some("x"), None).unwrap(), None);
    }

    #[test]
    fn non_numeric_bound_is_rejected() {
        assert_eq!(
            time_window(Some("x"), Some("2")),
            Err(TickError::MalformedTimeWindow {
                start: "x".into(),
                end: "2".into()
            })
        );
    }

    #[test]
    fn out_of_range_bound_is_rejected() {
        assert!(matches!(
            time_window(Some("0"), Some("24")),
            Err(TickError::MalformedTimeWindow { .. })
        ));
        assert!(matches!(
            time_window(Some("-1"), Some("4")),
            Err(TickError::MalformedTimeWindow { .. })
        ));
    }
}
