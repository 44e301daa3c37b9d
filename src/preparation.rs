//! Rescaling, encoding, and projection to the model feature set.
//!
//! Two rescaling steps are deliberately fed a different source column
//! than the one they overwrite (`competition_time_month` is scaled from
//! `competition_distance`, `promo2_time_week` from `year`). The fitted
//! model downstream was trained against exactly this wiring, so it is
//! reproduced verbatim here. Likewise, every call re-fits the scalers on
//! the current batch, so results are only comparable within one call.

use std::f64::consts::PI;

use tracing::info;

use crate::features::FeatureRecord;
use crate::scalers::ParameterStore;

/// The exact column set the regressor consumes, in consumption order.
pub const FINAL_FEATURE_COLUMNS: [&str; 17] = [
    "store",
    "store_type",
    "assortment",
    "competition_distance",
    "competition_open_since_month",
    "competition_open_since_year",
    "promo2",
    "promo2_since_week",
    "promo2_since_year",
    "promo",
    "competition_time_month",
    "day_of_week_sin",
    "day_of_week_cos",
    "month_cos",
    "week_of_year_cos",
    "day_sin",
    "day_cos",
];

/// Row-major numeric feature matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl PreparedBatch {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Rescales, encodes, and projects a derived batch. Re-fits the scalers
/// and the store-type encoder on this batch (mutating `store`), then
/// projects to [`FINAL_FEATURE_COLUMNS`].
pub fn prepare_batch(store: &mut ParameterStore, records: &[FeatureRecord]) -> PreparedBatch {
    let competition_distance: Vec<f64> =
        records.iter().map(|r| r.competition_distance).collect();
    let year: Vec<f64> = records.iter().map(|r| r.year as f64).collect();
    let store_types: Vec<String> = records.iter().map(|r| r.store_type.clone()).collect();

    let mut columns: Vec<(String, Vec<f64>)> = Vec::new();
    let mut push = |name: &str, values: Vec<f64>| columns.push((name.to_string(), values));

    push("store", records.iter().map(|r| r.store as f64).collect());
    push(
        "store_type",
        store.store_type_scaler.fit_and_transform(&store_types),
    );
    push(
        "assortment",
        records.iter().map(|r| ordinal_assortment(r)).collect(),
    );
    push(
        "competition_distance",
        store
            .competition_distance_scaler
            .fit_and_transform(&competition_distance),
    );
    push(
        "competition_open_since_month",
        records
            .iter()
            .map(|r| r.competition_open_since_month as f64)
            .collect(),
    );
    push(
        "competition_open_since_year",
        records
            .iter()
            .map(|r| r.competition_open_since_year as f64)
            .collect(),
    );
    push("promo2", records.iter().map(|r| r.promo2 as f64).collect());
    push(
        "promo2_since_week",
        records.iter().map(|r| r.promo2_since_week as f64).collect(),
    );
    push(
        "promo2_since_year",
        records.iter().map(|r| r.promo2_since_year as f64).collect(),
    );
    push("promo", records.iter().map(|r| r.promo as f64).collect());
    push(
        "school_holiday",
        records.iter().map(|r| r.school_holiday as f64).collect(),
    );
    // Scaled from competition_distance, matching the fitted training
    // pipeline's wiring.
    push(
        "competition_time_month",
        store
            .competition_time_month_scaler
            .fit_and_transform(&competition_distance),
    );
    // Scaled from year, same caveat as above.
    push(
        "promo2_time_week",
        store.promo2_time_week_scaler.fit_and_transform(&year),
    );
    push("year", store.year_scaler.fit_and_transform(&year));

    for (name, values) in one_hot_state_holiday(records) {
        push(&name, values);
    }

    let cyclical = [
        ("day_of_week", 7.0),
        ("month", 12.0),
        ("week_of_year", 52.0),
        ("day", 30.0),
    ];
    for (name, period) in cyclical {
        let raw: Vec<f64> = records
            .iter()
            .map(|r| match name {
                "day_of_week" => f64::from(r.day_of_week),
                "month" => r.month as f64,
                "week_of_year" => r.week_of_year as f64,
                _ => r.day as f64,
            })
            .collect();
        let angle = |x: &f64| x * (2.0 * PI / period);
        push(
            &format!("{name}_sin"),
            raw.iter().map(|x| angle(x).sin()).collect(),
        );
        push(
            &format!("{name}_cos"),
            raw.iter().map(|x| angle(x).cos()).collect(),
        );
    }

    let batch = project(&columns, records.len());

    info!(
        component = "preparation",
        event = "preparation.finish",
        rows = batch.n_rows(),
        columns = batch.columns.len()
    );
    batch
}

fn ordinal_assortment(record: &FeatureRecord) -> f64 {
    match record.assortment.as_deref() {
        Some("basic") => 1.0,
        Some("extra") => 2.0,
        Some("extended") => 3.0,
        _ => f64::NAN,
    }
}

// One column per observed category, sorted by name; rows with a missing
// state_holiday are all-zero across the dummies.
fn one_hot_state_holiday(records: &[FeatureRecord]) -> Vec<(String, Vec<f64>)> {
    let mut categories: Vec<&str> = records
        .iter()
        .filter_map(|r| r.state_holiday.as_deref())
        .collect();
    categories.sort_unstable();
    categories.dedup();

    categories
        .into_iter()
        .map(|category| {
            let values = records
                .iter()
                .map(|r| match r.state_holiday.as_deref() {
                    Some(value) if value == category => 1.0,
                    _ => 0.0,
                })
                .collect();
            (format!("state_holiday_{category}"), values)
        })
        .collect()
}

fn project(columns: &[(String, Vec<f64>)], n_rows: usize) -> PreparedBatch {
    let selected: Vec<&Vec<f64>> = FINAL_FEATURE_COLUMNS
        .iter()
        .map(|name| {
            &columns
                .iter()
                .find(|(column, _)| column == name)
                .expect("all final columns are computed above")
                .1
        })
        .collect();

    let rows = (0..n_rows)
        .map(|row| selected.iter().map(|values| values[row]).collect())
        .collect();

    PreparedBatch {
        columns: FINAL_FEATURE_COLUMNS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalers::{FittedScaler, LabelEncoder};
    use chrono::NaiveDate;

    fn store() -> ParameterStore {
        ParameterStore {
            competition_distance_scaler: FittedScaler::Robust {
                center: 0.0,
                scale: 1.0,
            },
            competition_time_month_scaler: FittedScaler::Robust {
                center: 0.0,
                scale: 1.0,
            },
            promo2_time_week_scaler: FittedScaler::MinMax {
                data_min: 0.0,
                data_max: 1.0,
            },
            year_scaler: FittedScaler::MinMax {
                data_min: 0.0,
                data_max: 1.0,
            },
            store_type_scaler: LabelEncoder { classes: vec![] },
        }
    }

    fn record(store: i64, day_of_week: u32) -> FeatureRecord {
        FeatureRecord {
            store,
            day_of_week,
            date: NaiveDate::from_ymd_opt(2015, 7, 31).unwrap(),
            promo: 1,
            state_holiday: Some("regular_day".to_string()),
            school_holiday: 0,
            store_type: "c".to_string(),
            assortment: Some("basic".to_string()),
            competition_distance: 1270.0,
            competition_open_since_month: 9,
            competition_open_since_year: 2008,
            promo2: 0,
            promo2_since_week: 31,
            promo2_since_year: 2015,
            year: 2015,
            month: 7,
            day: 31,
            week_of_year: 31,
            year_week: "2015-30".to_string(),
            competition_time_month: 84,
            promo2_time_week: 0,
        }
    }

    #[test]
    fn projection_matches_final_column_set_in_order() {
        let mut params = store();
        let batch = prepare_batch(&mut params, &[record(1, 5), record(2, 6)]);
        assert_eq!(batch.columns, FINAL_FEATURE_COLUMNS.to_vec());
        assert_eq!(batch.n_rows(), 2);
        assert_eq!(batch.rows[0].len(), 17);
    }

    #[test]
    fn cyclical_encoding_at_angle_zero_and_full_period() {
        let mut params = store();
        let batch = prepare_batch(&mut params, &[record(1, 0), record(2, 7)]);
        let sin_idx = batch.column_index("day_of_week_sin").unwrap();
        let cos_idx = batch.column_index("day_of_week_cos").unwrap();

        assert!((batch.rows[0][sin_idx] - 0.0).abs() < 1e-12);
        assert!((batch.rows[0][cos_idx] - 1.0).abs() < 1e-12);
        // Full period wraps back to sin(2*pi) ~ 0.
        assert!(batch.rows[1][sin_idx].abs() < 1e-12);
        assert!((batch.rows[1][cos_idx] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn store_type_is_label_encoded_fresh_per_batch() {
        let mut params = store();
        let mut a = record(1, 5);
        a.store_type = "d".to_string();
        let mut b = record(2, 5);
        b.store_type = "a".to_string();

        let batch = prepare_batch(&mut params, &[a, b]);
        let idx = batch.column_index("store_type").unwrap();
        assert_eq!(batch.rows[0][idx], 1.0);
        assert_eq!(batch.rows[1][idx], 0.0);
        assert_eq!(params.store_type_scaler.classes, vec!["a", "d"]);
    }

    #[test]
    fn assortment_ordinal_mapping_and_missing_value() {
        let mut params = store();
        let mut a = record(1, 5);
        a.assortment = Some("extended".to_string());
        let mut b = record(2, 5);
        b.assortment = None;

        let batch = prepare_batch(&mut params, &[a, b]);
        let idx = batch.column_index("assortment").unwrap();
        assert_eq!(batch.rows[0][idx], 3.0);
        assert!(batch.rows[1][idx].is_nan());
    }

    #[test]
    fn one_hot_columns_cover_observed_categories_and_missing_rows_are_zero() {
        let mut a = record(1, 5);
        a.state_holiday = Some("public_holiday".to_string());
        let mut b = record(2, 5);
        b.state_holiday = Some("regular_day".to_string());
        let mut c = record(3, 5);
        c.state_holiday = None;

        let dummies = one_hot_state_holiday(&[a, b, c]);
        let names: Vec<&str> = dummies.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["state_holiday_public_holiday", "state_holiday_regular_day"]
        );
        assert_eq!(dummies[0].1, vec![1.0, 0.0, 0.0]);
        assert_eq!(dummies[1].1, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn competition_time_month_is_scaled_from_the_distance_column() {
        let mut params = store();
        let mut a = record(1, 5);
        a.competition_distance = 100.0;
        a.competition_time_month = 5;
        let mut b = record(2, 5);
        b.competition_distance = 300.0;
        b.competition_time_month = 50;

        let batch = prepare_batch(&mut params, &[a, b]);
        let cd_idx = batch.column_index("competition_distance").unwrap();
        let ctm_idx = batch.column_index("competition_time_month").unwrap();
        // Both scalers are robust and both are fed the distance column,
        // so the outputs coincide regardless of the month values.
        assert_eq!(batch.rows[0][cd_idx], batch.rows[0][ctm_idx]);
        assert_eq!(batch.rows[1][cd_idx], batch.rows[1][ctm_idx]);
    }

    #[test]
    fn refit_overwrites_persisted_scaler_state() {
        let mut params = store();
        prepare_batch(&mut params, &[record(1, 5), record(2, 6)]);
        // year column is [2015, 2015]: degenerate fit.
        assert_eq!(
            params.year_scaler,
            FittedScaler::MinMax {
                data_min: 2015.0,
                data_max: 2015.0
            }
        );
    }
}
