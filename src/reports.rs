//! Series shaping behind the admin reporting endpoints. The grouping runs in
//! SQL in the handlers; everything here works on the aggregated rows.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const ORDERS_PER_DAY_WINDOW_DAYS: i64 = 180;

/// Trailing windows a "most bought products" report may cover.
pub const PERIOD_CHOICES: [u32; 3] = [30, 60, 90];

/// Parallel label/value series, ready for a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<i64>,
}

pub fn is_valid_period(days: u32) -> bool {
    PERIOD_CHOICES.contains(&days)
}

pub fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    now - Duration::days(days)
}

/// Orders counted per `YYYY-MM-DD` day, oldest day first.
pub fn orders_per_day<I, S>(days: I) -> Series
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    let mut per_day: BTreeMap<String, i64> = BTreeMap::new();
    for (day, count) in days {
        *per_day.entry(day.into()).or_default() += count;
    }

    let (labels, values) = per_day.into_iter().unzip();
    Series { labels, values }
}

/// Sums quantities per product name, highest first; ties break on name.
pub fn most_bought<I, S>(lines: I) -> Series
where
    I: IntoIterator<Item = (S, i64)>,
    S: Into<String>,
{
    let mut per_product: BTreeMap<String, i64> = BTreeMap::new();
    for (name, quantity) in lines {
        *per_product.entry(name.into()).or_default() += quantity;
    }

    let mut ranked: Vec<(String, i64)> = per_product.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let (labels, values) = ranked.into_iter().unzip();
    Series { labels, values }
}
