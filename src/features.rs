//! Calendar and competition-relative feature derivation.
//!
//! Week-numbering conventions in this stage are intentionally mixed and
//! must stay that way for parity with the fitted model:
//! - `year_week` uses the U.S.-style Sunday-anchored week number
//!   (week 00 = days before the first Sunday of the year),
//! - `promo2_since` resolves (year, week) with Monday-anchored weeks
//!   (week 0 = days before the first Monday), anchored one week early,
//! - imputation upstream uses ISO weeks.

use chrono::{Datelike, Duration as ChronoDuration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::cleaning::CleanedRecord;

/// A sales record with derived features, after closed-store filtering.
/// The transient `open` and `promo_interval` columns are gone, and the
/// intermediate `competition_since`/`promo2_since` dates have already
/// been folded into the age features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub store: i64,
    pub day_of_week: u32,
    pub date: NaiveDate,
    pub promo: i64,
    pub state_holiday: Option<String>,
    pub school_holiday: i64,
    pub store_type: String,
    pub assortment: Option<String>,
    pub competition_distance: f64,
    pub competition_open_since_month: i64,
    pub competition_open_since_year: i64,
    pub promo2: i64,
    pub promo2_since_week: i64,
    pub promo2_since_year: i64,
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub week_of_year: i64,
    pub year_week: String,
    pub competition_time_month: i64,
    pub promo2_time_week: i64,
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("invalid competition open date: year={year} month={month}")]
    InvalidCompetitionDate { year: i64, month: i64 },
    #[error("invalid promo2 start week: year={year} week={week}")]
    InvalidPromoWeek { year: i64, week: i64 },
}

/// Derives features for a cleaned batch, then drops rows with
/// `open == 0`. Relative order of kept rows is preserved; a single
/// invalid date combination aborts the whole batch.
pub fn derive_features(records: &[CleanedRecord]) -> Result<Vec<FeatureRecord>, FeatureError> {
    let rows_in = records.len();
    let mut derived = Vec::with_capacity(rows_in);
    for record in records {
        derived.push(derive_record(record)?);
    }

    let mut kept = Vec::with_capacity(derived.len());
    for (record, open) in derived.into_iter().zip(records.iter().map(|r| r.open)) {
        if open != 0 {
            kept.push(record);
        }
    }

    info!(
        component = "features",
        event = "features.derive.finish",
        rows_in = rows_in,
        rows_kept = kept.len(),
        rows_dropped = rows_in - kept.len()
    );
    Ok(kept)
}

fn derive_record(record: &CleanedRecord) -> Result<FeatureRecord, FeatureError> {
    let date = record.date;

    let competition_since = competition_since(
        record.competition_open_since_year,
        record.competition_open_since_month,
    )?;
    let competition_time_month = (date - competition_since).num_days().div_euclid(30);

    let promo2_since = promo2_since(record.promo2_since_year, record.promo2_since_week)?;
    let promo2_time_week = (date - promo2_since).num_days().div_euclid(7);

    Ok(FeatureRecord {
        store: record.store,
        day_of_week: record.day_of_week,
        date,
        promo: record.promo,
        state_holiday: map_state_holiday(record),
        school_holiday: record.school_holiday,
        store_type: record.store_type.clone(),
        assortment: map_assortment(record),
        competition_distance: record.competition_distance,
        competition_open_since_month: record.competition_open_since_month,
        competition_open_since_year: record.competition_open_since_year,
        promo2: record.promo2,
        promo2_since_week: record.promo2_since_week,
        promo2_since_year: record.promo2_since_year,
        year: i64::from(date.year()),
        month: i64::from(date.month()),
        day: i64::from(date.day()),
        week_of_year: i64::from(date.iso_week().week()),
        year_week: date.format("%Y-%U").to_string(),
        competition_time_month,
        promo2_time_week,
    })
}

fn map_state_holiday(record: &CleanedRecord) -> Option<String> {
    let name = match record.state_holiday.as_str() {
        "a" => "public_holiday",
        "b" => "easter_holiday",
        "c" => "christmas",
        "0" => "regular_day",
        other => {
            warn!(
                component = "features",
                event = "features.derive.unmapped_code",
                field = "state_holiday",
                code = other,
                store = record.store,
                date = %record.date
            );
            return None;
        }
    };
    Some(name.to_string())
}

fn map_assortment(record: &CleanedRecord) -> Option<String> {
    let name = match record.assortment.as_str() {
        "a" => "basic",
        "b" => "extra",
        "c" => "extended",
        other => {
            warn!(
                component = "features",
                event = "features.derive.unmapped_code",
                field = "assortment",
                code = other,
                store = record.store,
                date = %record.date
            );
            return None;
        }
    };
    Some(name.to_string())
}

fn competition_since(year: i64, month: i64) -> Result<NaiveDate, FeatureError> {
    if !(1..=12).contains(&month) {
        return Err(FeatureError::InvalidCompetitionDate { year, month });
    }
    let year_i32 =
        i32::try_from(year).map_err(|_| FeatureError::InvalidCompetitionDate { year, month })?;
    NaiveDate::from_ymd_opt(year_i32, month as u32, 1)
        .ok_or(FeatureError::InvalidCompetitionDate { year, month })
}

/// Start of the promo2 week: the Monday resolved from (year, week) under
/// Monday-anchored week numbering, shifted one week back. The shift
/// matches the fitted training pipeline and must not be "corrected".
fn promo2_since(year: i64, week: i64) -> Result<NaiveDate, FeatureError> {
    let monday = monday_of_week(year, week).ok_or(FeatureError::InvalidPromoWeek { year, week })?;
    monday
        .checked_sub_signed(ChronoDuration::days(7))
        .ok_or(FeatureError::InvalidPromoWeek { year, week })
}

// Resolves (year, week, Monday) the way strptime's %Y-%W-%w does:
// week 1 starts at the first Monday of the year, week 0 covers the days
// before it (its "Monday" lands in the previous year).
fn monday_of_week(year: i64, week: i64) -> Option<NaiveDate> {
    if !(0..=53).contains(&week) {
        return None;
    }
    let jan1 = NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, 1, 1)?;
    let first_weekday = i64::from(jan1.weekday().num_days_from_monday());
    let day_of_year = if week == 0 {
        1 - first_weekday
    } else {
        let week0_len = (7 - first_weekday) % 7;
        1 + week0_len + 7 * (week - 1)
    };
    jan1.checked_add_signed(ChronoDuration::days(day_of_year - 1))
}
