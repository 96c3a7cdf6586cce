use chrono::NaiveDate;
use tracing::info;

use crate::db::{make_period_id, Store};
use crate::error::{AppError, Result};

/// Resolves the period to run for, handling explicit overrides, first runs,
/// re-runs, and multi-day catch-up. `confirm` is the operator-consent hook
/// for catch-ups longer than five days; returning false aborts the run.
pub async fn resolve_period<F>(
    store: &Store,
    today: &str,
    explicit_days_back: Option<i64>,
    confirm: F,
) -> Result<(String, i64)>
where
    F: FnOnce(i64, &str) -> bool,
{
    if let Some(days_back) = explicit_days_back.filter(|&d| d > 0) {
        let period_id = if days_back == 1 {
            today.to_string()
        } else {
            let today_date = parse_date(today)?;
            let start = (today_date - chrono::Duration::days(days_back - 1))
                .format("%Y-%m-%d")
                .to_string();
            make_period_id(&start, today)
        };
        info!("collecting {} day(s) of articles ({})", days_back, period_id);
        return Ok((period_id, days_back));
    }

    let Some(last_run) = store.last_run_date().await? else {
        info!("first run detected, collecting today's articles");
        return Ok((today.to_string(), 1));
    };

    let last_date = parse_date(&last_run)?;
    let today_date = parse_date(today)?;
    let missed_days = (today_date - last_date).num_days();

    if missed_days <= 0 {
        info!("already ran today ({}); re-running pipeline", today);
        return Ok((today.to_string(), 1));
    }

    if missed_days == 1 {
        info!("daily run for {}", today);
        return Ok((today.to_string(), 1));
    }

    // Catch-up over the gap since the last run.
    let start = (last_date + chrono::Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();
    let period_id = make_period_id(&start, today);

    if missed_days > 5 {
        if !confirm(missed_days, &period_id) {
            return Err(AppError::UserAbort);
        }
    } else {
        info!("catching up {} days ({})", missed_days, period_id);
    }

    Ok((period_id, missed_days))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| AppError::Config(format!("invalid date {s:?}: {e}")))
}
