use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Compute the `[start, end)` query window for one collection cycle.
/// The reports API has historically lagged by tens of hours and backfilled,
/// so the historic window is kept large and re-scanned each cycle instead of
/// trusting a single cursor.
pub fn query_window(
    now: DateTime<Utc>,
    lag_minutes: i64,
    historic_window_minutes: i64,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = now - Duration::minutes(lag_minutes);
    let start = end - Duration::minutes(historic_window_minutes);
    (start, end)
}

/// Day-sharded index name: `{prefix}-{YYYY.MM.dd}`.
pub fn day_index(prefix: &str, date: NaiveDate) -> String {
    format!("{}-{}", prefix, date.format("%Y.%m.%d"))
}

/// The state-index shards a dedup probe must cover: today and the two
/// preceding days, so markers written just before midnight are still seen.
pub fn marker_indices(prefix: &str, today: NaiveDate) -> Vec<String> {
    (0..3)
        .map(|back| day_index(prefix, today - Duration::days(back)))
        .collect()
}
