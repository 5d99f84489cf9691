use chrono::Datelike;
use derive_new::new;
use serde::{Deserialize, Serialize};

use crate::time::Date;

/// Fixed approximation of the average month length, in days.
pub const AVERAGE_MONTH_DAYS: f64 = 30.44;

/// Number of views recorded on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct DailyView {
    pub date: Date,
    pub views: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub total_views: u64,
    pub views_today: u64,
    pub views_this_month: u64,
    pub views_this_year: u64,
    pub average_daily_views: f64,
    pub average_monthly_views: f64,
}

impl Metrics {
    /// Aggregates the history as seen on `today`. An empty history yields all zeros.
    pub fn aggregate(history: &[DailyView], today: Date) -> Metrics {
        let Some(earliest) = history.iter().map(|entry| entry.date).min() else {
            return Metrics::default();
        };

        let mut metrics = Metrics::default();

        for entry in history {
            metrics.total_views = metrics.total_views.saturating_add(entry.views);

            if entry.date == today {
                metrics.views_today = entry.views;
            }

            if entry.date.year() == today.year() {
                metrics.views_this_year = metrics.views_this_year.saturating_add(entry.views);

                if entry.date.month() == today.month() {
                    metrics.views_this_month = metrics.views_this_month.saturating_add(entry.views);
                }
            }
        }

        metrics.average_daily_views = metrics.total_views as f64 / span_days(earliest, today) as f64;
        metrics.average_monthly_views = metrics.average_daily_views * AVERAGE_MONTH_DAYS;

        metrics
    }
}

/// Whole days from `earliest` to `today`, both ends included. Never less than 1.
pub fn span_days(earliest: Date, today: Date) -> i64 {
    ((today - earliest).num_days() + 1).max(1)
}
