//! Time-window arithmetic for the historical/live boundary.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeDelta, Utc};

/// Margin behind "now" that the replay service cannot serve yet.
pub const DEFAULT_HISTORICAL_LAG: TimeDelta = TimeDelta::minutes(14);

/// Date format of the replay `from` parameter.
const REPLAY_DATE_FORMAT: &str = "%Y-%m-%d";

/// A historical replay range.
///
/// The replay service only serves whole days, so `from` is a date while
/// `to` is a precise instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    /// First day of the replay (inclusive).
    pub from: NaiveDate,
    /// End of the replay.
    pub to: DateTime<Utc>,
    /// The start the caller actually needed, before day truncation.
    pub requested_start: DateTime<Utc>,
}

impl ReplayWindow {
    /// Plan the replay range for a lookback ending at `now`.
    ///
    /// `to = now - lag`, `requested_start = to - lookback`, and `from` is
    /// `requested_start` truncated to its day.
    #[must_use]
    pub fn plan(now: DateTime<Utc>, lookback: TimeDelta, lag: TimeDelta) -> Self {
        let to = now - lag;
        let requested_start = to - lookback;
        Self {
            from: requested_start.date_naive(),
            to,
            requested_start,
        }
    }

    /// `from` as sent to the replay service (`YYYY-MM-DD`).
    #[must_use]
    pub fn from_param(&self) -> String {
        self.from.format(REPLAY_DATE_FORMAT).to_string()
    }

    /// `to` as sent to the replay service (ISO-8601, millisecond precision).
    #[must_use]
    pub fn to_param(&self) -> String {
        self.to.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// Point from which recorded live data is read.
///
/// When historical data arrived, live data picks up at the last historical
/// timestamp. Otherwise live data alone must cover the whole lookback.
#[must_use]
pub fn cutover(
    actual_hist_end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: TimeDelta,
) -> DateTime<Utc> {
    actual_hist_end.unwrap_or(now - lookback)
}
