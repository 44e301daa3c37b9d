//! Raw sales-record ingestion and schema normalization.
//!
//! The upstream extract carries a fixed set of 16 PascalCase columns.
//! Ingestion renames them to their lower_snake_case equivalents while
//! materializing typed records, and fails fast when an expected column
//! is missing from the source.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

/// Raw-to-canonical column rename table. The mapping is bijective and
/// fixed; every raw column must be present in the source.
pub const RAW_COLUMNS: [(&str, &str); 16] = [
    ("Store", "store"),
    ("DayOfWeek", "day_of_week"),
    ("Date", "date"),
    ("Open", "open"),
    ("Promo", "promo"),
    ("StateHoliday", "state_holiday"),
    ("SchoolHoliday", "school_holiday"),
    ("StoreType", "store_type"),
    ("Assortment", "assortment"),
    ("CompetitionDistance", "competition_distance"),
    ("CompetitionOpenSinceMonth", "competition_open_since_month"),
    ("CompetitionOpenSinceYear", "competition_open_since_year"),
    ("Promo2", "promo2"),
    ("Promo2SinceWeek", "promo2_since_week"),
    ("Promo2SinceYear", "promo2_since_year"),
    ("PromoInterval", "promo_interval"),
];

/// One (store, day) observation after schema normalization. Nullable
/// competition/promo2 fields stay `Option` until the cleaning stage
/// imputes them; the date stays unparsed until cleaning as well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSalesRecord {
    pub store: i64,
    pub day_of_week: u32,
    pub date: String,
    pub open: i64,
    pub promo: i64,
    pub state_holiday: String,
    pub school_holiday: i64,
    pub store_type: String,
    pub assortment: String,
    pub competition_distance: Option<f64>,
    pub competition_open_since_month: Option<f64>,
    pub competition_open_since_year: Option<f64>,
    pub promo2: i64,
    pub promo2_since_week: Option<f64>,
    pub promo2_since_year: Option<f64>,
    pub promo_interval: Option<String>,
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("expected raw column '{0}' is absent from the source")]
    MissingColumn(String),
    #[error("expected raw field '{field}' is absent from record {index}")]
    MissingField { field: &'static str, index: usize },
    #[error("record {index} is not a JSON object")]
    NonObjectRecord { index: usize },
    #[error("input is not a record-oriented JSON array")]
    NotRecordArray,
    #[error("failed to parse field {field} value '{value}'")]
    ParseField { field: &'static str, value: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Verifies the raw header against [`RAW_COLUMNS`] and returns, for each
/// canonical column in table order, its index in the source header.
pub fn normalize_header(header: &StringRecord) -> Result<Vec<usize>, SchemaError> {
    let mut indices = Vec::with_capacity(RAW_COLUMNS.len());
    for (raw, _) in RAW_COLUMNS {
        let idx = header
            .iter()
            .position(|name| name == raw)
            .ok_or_else(|| SchemaError::MissingColumn(raw.to_string()))?;
        indices.push(idx);
    }
    Ok(indices)
}

pub fn load_raw_csv_path(path: &Path) -> Result<Vec<RawSalesRecord>, SchemaError> {
    let file = File::open(path)?;
    load_raw_csv(file)
}

/// Loads and normalizes a CSV record source. Empty cells become `None`
/// for nullable columns.
pub fn load_raw_csv<R: Read>(reader: R) -> Result<Vec<RawSalesRecord>, SchemaError> {
    let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    let indices = normalize_header(csv_reader.headers()?)?;

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        records.push(record_from_csv_row(&row, &indices)?);
    }

    info!(
        component = "ingest",
        event = "ingest.csv.loaded",
        rows = records.len()
    );
    Ok(records)
}

/// Normalizes a record-oriented JSON array (one object per record, raw
/// field names) into typed records.
pub fn raw_records_from_json(input: &str) -> Result<Vec<RawSalesRecord>, SchemaError> {
    let value: Value = serde_json::from_str(input)?;
    let Value::Array(items) = value else {
        return Err(SchemaError::NotRecordArray);
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let Value::Object(fields) = item else {
            return Err(SchemaError::NonObjectRecord { index });
        };
        records.push(record_from_json_object(fields, index)?);
    }

    info!(
        component = "ingest",
        event = "ingest.json.loaded",
        rows = records.len()
    );
    Ok(records)
}

fn record_from_json_object(
    fields: Map<String, Value>,
    index: usize,
) -> Result<RawSalesRecord, SchemaError> {
    let mut renamed = Map::with_capacity(RAW_COLUMNS.len());
    for (raw, canonical) in RAW_COLUMNS {
        let value = fields
            .get(raw)
            .cloned()
            .ok_or(SchemaError::MissingField { field: raw, index })?;
        renamed.insert(canonical.to_string(), coerce_json_field(canonical, value));
    }
    Ok(serde_json::from_value(Value::Object(renamed))?)
}

// Some exports carry StateHoliday `0` as a bare number; the canonical
// shape keeps categorical codes as strings.
fn coerce_json_field(canonical: &str, value: Value) -> Value {
    let string_typed = matches!(
        canonical,
        "date" | "state_holiday" | "store_type" | "assortment" | "promo_interval"
    );
    match value {
        Value::Number(n) if string_typed => Value::String(n.to_string()),
        other => other,
    }
}

fn record_from_csv_row(
    row: &StringRecord,
    indices: &[usize],
) -> Result<RawSalesRecord, SchemaError> {
    Ok(RawSalesRecord {
        store: parse_field(row, indices[0], "store")?,
        day_of_week: parse_field(row, indices[1], "day_of_week")?,
        date: cell(row, indices[2]).to_string(),
        open: parse_field(row, indices[3], "open")?,
        promo: parse_field(row, indices[4], "promo")?,
        state_holiday: cell(row, indices[5]).to_string(),
        school_holiday: parse_field(row, indices[6], "school_holiday")?,
        store_type: cell(row, indices[7]).to_string(),
        assortment: cell(row, indices[8]).to_string(),
        competition_distance: parse_nullable(row, indices[9], "competition_distance")?,
        competition_open_since_month: parse_nullable(row, indices[10], "competition_open_since_month")?,
        competition_open_since_year: parse_nullable(row, indices[11], "competition_open_since_year")?,
        promo2: parse_field(row, indices[12], "promo2")?,
        promo2_since_week: parse_nullable(row, indices[13], "promo2_since_week")?,
        promo2_since_year: parse_nullable(row, indices[14], "promo2_since_year")?,
        promo_interval: match cell(row, indices[15]) {
            "" => None,
            value => Some(value.to_string()),
        },
    })
}

fn cell<'a>(row: &'a StringRecord, idx: usize) -> &'a str {
    row.get(idx).unwrap_or("").trim()
}

fn parse_field<T: std::str::FromStr>(
    row: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<T, SchemaError> {
    let value = cell(row, idx);
    value.parse().map_err(|_| SchemaError::ParseField {
        field,
        value: value.to_string(),
    })
}

fn parse_nullable(
    row: &StringRecord,
    idx: usize,
    field: &'static str,
) -> Result<Option<f64>, SchemaError> {
    let value = cell(row, idx);
    if value.is_empty() || value.eq_ignore_ascii_case("na") {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| SchemaError::ParseField {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV_HEADER: &str = "Store,DayOfWeek,Date,Open,Promo,StateHoliday,SchoolHoliday,\
StoreType,Assortment,CompetitionDistance,CompetitionOpenSinceMonth,CompetitionOpenSinceYear,\
Promo2,Promo2SinceWeek,Promo2SinceYear,PromoInterval";

    #[test]
    fn csv_rows_are_renamed_and_typed() {
        let csv = format!(
            "{CSV_HEADER}\n1,5,2015-07-31,1,1,0,1,c,a,1270,9,2008,0,,,\n"
        );
        let records = load_raw_csv(csv.as_bytes()).expect("csv loads");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.store, 1);
        assert_eq!(record.day_of_week, 5);
        assert_eq!(record.date, "2015-07-31");
        assert_eq!(record.state_holiday, "0");
        assert_eq!(record.competition_distance, Some(1270.0));
        assert_eq!(record.competition_open_since_month, Some(9.0));
        assert_eq!(record.promo2_since_week, None);
        assert_eq!(record.promo_interval, None);
    }

    #[test]
    fn missing_column_is_a_schema_error() {
        let csv = "Store,DayOfWeek,Date\n1,5,2015-07-31\n";
        let err = load_raw_csv(csv.as_bytes()).expect_err("must fail");
        match err {
            SchemaError::MissingColumn(column) => assert_eq!(column, "Open"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unparseable_cell_names_field_and_value() {
        let csv = format!("{CSV_HEADER}\nx,5,2015-07-31,1,1,0,1,c,a,1270,9,2008,0,,,\n");
        let err = load_raw_csv(csv.as_bytes()).expect_err("must fail");
        match err {
            SchemaError::ParseField { field, value } => {
                assert_eq!(field, "store");
                assert_eq!(value, "x");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn json_records_are_renamed_with_null_passthrough() {
        let input = r#"[{
            "Store": 4, "DayOfWeek": 4, "Date": "2015-07-30", "Open": 1, "Promo": 0,
            "StateHoliday": 0, "SchoolHoliday": 0, "StoreType": "a", "Assortment": "c",
            "CompetitionDistance": null, "CompetitionOpenSinceMonth": null,
            "CompetitionOpenSinceYear": null, "Promo2": 1, "Promo2SinceWeek": 14,
            "Promo2SinceYear": 2011, "PromoInterval": "Jan,Apr,Jul,Oct"
        }]"#;

        let records = raw_records_from_json(input).expect("json loads");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].state_holiday, "0");
        assert_eq!(records[0].competition_distance, None);
        assert_eq!(records[0].promo2_since_week, Some(14.0));
        assert_eq!(
            records[0].promo_interval.as_deref(),
            Some("Jan,Apr,Jul,Oct")
        );
    }

    #[test]
    fn json_record_missing_raw_field_is_a_schema_error() {
        let input = r#"[{"Store": 4}]"#;
        let err = raw_records_from_json(input).expect_err("must fail");
        match err {
            SchemaError::MissingField { field, index } => {
                assert_eq!(field, "DayOfWeek");
                assert_eq!(index, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rename_table_is_bijective() {
        let mut canonical: Vec<&str> = RAW_COLUMNS.iter().map(|(_, c)| *c).collect();
        canonical.sort_unstable();
        canonical.dedup();
        assert_eq!(canonical.len(), RAW_COLUMNS.len());
    }
}
