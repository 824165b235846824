use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Report timezone offset when `SIMS_UTC_OFFSET_HOURS` is unset (US Central, standard time).
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -6;

pub fn report_offset() -> anyhow::Result<FixedOffset> {
    let hours = match std::env::var("SIMS_UTC_OFFSET_HOURS") {
        Ok(s) if !s.trim().is_empty() => s
            .trim()
            .parse::<i32>()
            .with_context(|| format!("invalid SIMS_UTC_OFFSET_HOURS: {s}"))?,
        _ => DEFAULT_UTC_OFFSET_HOURS,
    };
    FixedOffset::east_opt(hours * 3600)
        .with_context(|| format!("SIMS_UTC_OFFSET_HOURS out of range: {hours}"))
}

/// The date a run reports on: the explicit `YYYY-MM-DD` argument when given, otherwise
/// the calendar date of `now_utc` in the report timezone.
pub fn resolve_run_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    offset: FixedOffset,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s:?}, expected YYYY-MM-DD"));
    }
    Ok(now_utc.with_timezone(&offset).date_naive())
}
