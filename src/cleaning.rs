//! Null imputation and type coercion for normalized sales records.
//!
//! Missing competition/promo2 fields are filled with date-derived
//! defaults: a competitor with no recorded opening date is treated as
//! having always existed as of the sale date, and a missing promo2 start
//! week falls back to the sale date's ISO week. A missing competition
//! distance becomes the 100000.0 "no nearby competitor" sentinel.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::ingest::RawSalesRecord;

/// Distance sentinel for records with no nearby competitor on file.
pub const NO_COMPETITOR_DISTANCE: f64 = 100_000.0;

/// Sentinel for stores outside the recurring promo program.
pub const NO_PROMO_INTERVAL: &str = "0";

/// A sales record after imputation and coercion. All previously nullable
/// competition/promo2 fields are integral from here on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub store: i64,
    pub day_of_week: u32,
    pub date: NaiveDate,
    pub open: i64,
    pub promo: i64,
    pub state_holiday: String,
    pub school_holiday: i64,
    pub store_type: String,
    pub assortment: String,
    pub competition_distance: f64,
    pub competition_open_since_month: i64,
    pub competition_open_since_year: i64,
    pub promo2: i64,
    pub promo2_since_week: i64,
    pub promo2_since_year: i64,
    pub promo_interval: String,
}

#[derive(Debug, Error)]
pub enum CleaningError {
    #[error("unparseable date '{value}': {source}")]
    ParseDate {
        value: String,
        source: chrono::ParseError,
    },
}

/// Cleans a whole batch. Fails on the first unparseable date; no
/// partial-batch recovery.
pub fn clean_records(records: &[RawSalesRecord]) -> Result<Vec<CleanedRecord>, CleaningError> {
    let mut cleaned = Vec::with_capacity(records.len());
    for record in records {
        cleaned.push(clean_record(record)?);
    }

    info!(
        component = "cleaning",
        event = "cleaning.finish",
        rows = cleaned.len()
    );
    Ok(cleaned)
}

fn clean_record(record: &RawSalesRecord) -> Result<CleanedRecord, CleaningError> {
    let date = parse_date(&record.date)?;

    Ok(CleanedRecord {
        store: record.store,
        day_of_week: record.day_of_week,
        date,
        open: record.open,
        promo: record.promo,
        state_holiday: record.state_holiday.clone(),
        school_holiday: record.school_holiday,
        store_type: record.store_type.clone(),
        assortment: record.assortment.clone(),
        competition_distance: match record.competition_distance {
            Some(value) if !value.is_nan() => value,
            _ => NO_COMPETITOR_DISTANCE,
        },
        competition_open_since_month: impute_integral(
            record.competition_open_since_month,
            i64::from(date.month()),
        ),
        competition_open_since_year: impute_integral(
            record.competition_open_since_year,
            i64::from(date.year()),
        ),
        promo2: record.promo2,
        promo2_since_week: impute_integral(
            record.promo2_since_week,
            i64::from(date.iso_week().week()),
        ),
        promo2_since_year: impute_integral(record.promo2_since_year, i64::from(date.year())),
        promo_interval: record
            .promo_interval
            .clone()
            .unwrap_or_else(|| NO_PROMO_INTERVAL.to_string()),
    })
}

fn parse_date(value: &str) -> Result<NaiveDate, CleaningError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|source| CleaningError::ParseDate {
        value: value.to_string(),
        source,
    })
}

// Coercion truncates; sources are integral or derived from integral
// calendar fields, so no rounding is involved.
fn impute_integral(value: Option<f64>, default: i64) -> i64 {
    match value {
        Some(v) if !v.is_nan() => v as i64,
        _ => default,
    }
}
