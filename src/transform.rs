use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{ArrayRef, Float64Builder, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Canonical column names, applied positionally. The incoming header text is
/// ignored entirely.
pub const COLUMN_NAMES: [&str; 5] = [
    "location",
    "percent_global_total",
    "fossil_emissions_2023",
    "fossil_emissions_2000",
    "percent_change_from_2000",
];

/// Trim whitespace + strip outer quotes if present.
fn clean_str(raw: &str) -> &str {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        &trimmed[1..trimmed.len() - 1]
    } else {
        trimmed
    }
}

/// `"32.9%"` → `"32.9"`
fn strip_percent(raw: &str) -> String {
    clean_str(raw).replace('%', "").trim().to_string()
}

/// `"12,667,428"` → `"12667428"`
fn strip_thousands(raw: &str) -> String {
    clean_str(raw).replace(',', "").trim().to_string()
}

/// Normalise the change column's textual anomalies, in fixed order:
/// stray quotes, thousands separators, the "no change" idiom, explicit `+`
/// signs, the `%` suffix, and the Unicode minus glyph.
fn normalize_change(raw: &str) -> String {
    clean_str(raw)
        .replace('"', "")
        .replace(',', "")
        .replace("no change", "0")
        .replace('+', "")
        .replace('%', "")
        .replace('\u{2212}', "-")
        .trim()
        .to_string()
}

/// Rename the five columns to their canonical names and coerce the four
/// numeric ones to `Float64`.
///
/// Coercion policy is column-specific: `fossil_emissions_2023` aborts the
/// run on a non-numeric, non-blank value, while the other three numeric
/// columns turn such values into nulls. Blank cells become nulls everywhere.
pub fn clean_table(batch: &RecordBatch) -> Result<RecordBatch> {
    if batch.num_columns() != COLUMN_NAMES.len() {
        bail!(
            "expected {} columns, got {}",
            COLUMN_NAMES.len(),
            batch.num_columns()
        );
    }

    let location = batch.column(0).clone();
    let percent_global_total = coerce_column(string_column(batch, 1)?, strip_percent);
    let fossil_2023 = parse_column_strict(
        string_column(batch, 2)?,
        COLUMN_NAMES[2],
        strip_thousands,
    )?;
    let fossil_2000 = coerce_column(string_column(batch, 3)?, strip_thousands);
    let percent_change = coerce_column(string_column(batch, 4)?, normalize_change);

    let fields = vec![
        Field::new(COLUMN_NAMES[0], DataType::Utf8, false),
        Field::new(COLUMN_NAMES[1], DataType::Float64, true),
        Field::new(COLUMN_NAMES[2], DataType::Float64, true),
        Field::new(COLUMN_NAMES[3], DataType::Float64, true),
        Field::new(COLUMN_NAMES[4], DataType::Float64, true),
    ];
    let schema = Arc::new(Schema::new(fields));

    RecordBatch::try_new(
        schema,
        vec![
            location,
            percent_global_total,
            fossil_2023,
            fossil_2000,
            percent_change,
        ],
    )
    .context("assembling cleaned batch")
}

fn string_column<'a>(batch: &'a RecordBatch, idx: usize) -> Result<&'a StringArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| anyhow!("column {idx} is not a string column"))
}

/// Clean + parse each value, substituting null for anything unparseable.
fn coerce_column(arr: &StringArray, normalize: impl Fn(&str) -> String) -> ArrayRef {
    let mut b = Float64Builder::new();
    for opt in arr.iter() {
        let v = opt.and_then(|s| {
            let cleaned = normalize(s);
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse::<f64>().ok()
            }
        });
        b.append_option(v);
    }
    Arc::new(b.finish())
}

/// Clean + parse each value; a non-blank value that still fails to parse is
/// an error, not a null.
fn parse_column_strict(
    arr: &StringArray,
    column: &str,
    normalize: impl Fn(&str) -> String,
) -> Result<ArrayRef> {
    let mut b = Float64Builder::new();
    for (idx, opt) in arr.iter().enumerate() {
        match opt {
            None => b.append_null(),
            Some(raw) => {
                let cleaned = normalize(raw);
                if cleaned.is_empty() {
                    b.append_null();
                } else {
                    let v = cleaned.parse::<f64>().with_context(|| {
                        format!("row {idx}: cannot parse {raw:?} as a number in column {column}")
                    })?;
                    b.append_value(v);
                }
            }
        }
    }
    Ok(Arc::new(b.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array};

    /// Build a five-string-column batch with arbitrary header names.
    fn raw_batch(headers: [&str; 5], rows: &[[&str; 5]]) -> RecordBatch {
        let fields: Vec<Field> = headers
            .iter()
            .map(|n| Field::new(*n, DataType::Utf8, true))
            .collect();
        let columns: Vec<ArrayRef> = (0..5)
            .map(|col| {
                let values: Vec<&str> = rows.iter().map(|r| r[col]).collect();
                Arc::new(StringArray::from(values)) as ArrayRef
            })
            .collect();
        RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).expect("valid test batch")
    }

    fn float_column(batch: &RecordBatch, idx: usize) -> &Float64Array {
        batch
            .column(idx)
            .as_any()
            .downcast_ref::<Float64Array>()
            .expect("float column")
    }

    #[test]
    fn renames_columns_regardless_of_header_text() {
        let raw = raw_batch(
            ["Country", "% of world", "2023", "2000", "Change"],
            &[["China", "32.9%", "12,667,428", "3,649,063", "247%"]],
        );
        let cleaned = clean_table(&raw).expect("transform should succeed");
        let schema = cleaned.schema();
        let names: Vec<&str> = schema
            .fields()
            .iter()
            .map(|f| f.name().as_str())
            .collect();
        assert_eq!(names, COLUMN_NAMES);
    }

    #[test]
    fn cleans_textual_anomalies() {
        let raw = raw_batch(
            ["a", "b", "c", "d", "e"],
            &[
                ["China", "45.2%", "1,234,567", "3,649,063", "+3.5%"],
                ["Tuvalu", "0.0%", "11", "10", "no change"],
                ["Japan", "2.9%", "1,181,013", "1,263,222", "\u{2212}2.1%"],
            ],
        );

        let cleaned = clean_table(&raw).expect("transform should succeed");

        let share = float_column(&cleaned, 1);
        assert_eq!(share.value(0), 45.2);

        let em2023 = float_column(&cleaned, 2);
        assert_eq!(em2023.value(0), 1_234_567.0);

        let change = float_column(&cleaned, 4);
        assert_eq!(change.value(0), 3.5);
        assert_eq!(change.value(1), 0.0);
        assert_eq!(change.value(2), -2.1);
    }

    #[test]
    fn unparseable_2023_value_fails_the_run() {
        let raw = raw_batch(
            ["a", "b", "c", "d", "e"],
            &[["Somewhere", "1.0%", "N/A", "123", "5%"]],
        );
        let err = clean_table(&raw).expect_err("strict column must raise");
        assert!(err.to_string().contains("fossil_emissions_2023"));
    }

    #[test]
    fn unparseable_2000_value_becomes_null() {
        let raw = raw_batch(
            ["a", "b", "c", "d", "e"],
            &[["Somewhere", "1.0%", "123", "N/A", "5%"]],
        );
        let cleaned = clean_table(&raw).expect("coercing column must not raise");
        let em2000 = float_column(&cleaned, 3);
        assert!(em2000.is_null(0));
    }

    #[test]
    fn blank_cells_become_nulls_in_every_numeric_column() {
        let raw = raw_batch(["a", "b", "c", "d", "e"], &[["Somewhere", "", "", "", ""]]);
        let cleaned = clean_table(&raw).expect("blanks are nulls, not failures");
        for idx in 1..5 {
            assert!(float_column(&cleaned, idx).is_null(0), "column {idx}");
        }
    }

    #[test]
    fn garbage_percent_becomes_null() {
        let raw = raw_batch(
            ["a", "b", "c", "d", "e"],
            &[["Somewhere", "n/a", "123", "456", "also garbage"]],
        );
        let cleaned = clean_table(&raw).expect("coercing columns must not raise");
        assert!(float_column(&cleaned, 1).is_null(0));
        assert!(float_column(&cleaned, 4).is_null(0));
    }

    #[test]
    fn wrong_column_count_is_rejected() {
        let fields = vec![
            Field::new("a", DataType::Utf8, true),
            Field::new("b", DataType::Utf8, true),
        ];
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(vec!["x"])),
            Arc::new(StringArray::from(vec!["y"])),
        ];
        let batch =
            RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).expect("test batch");
        assert!(clean_table(&batch).is_err());
    }
}
