use anyhow::{Context, Result};
use maude_model::flatten::{column_union, flatten_record, FlatRow};
use maude_model::ExtractedRecord;
use std::fs;
use std::path::Path;

/// Write the extracted records as pretty-printed JSON, non-ASCII kept as-is.
pub fn write_json(records: &[ExtractedRecord], path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    fs::write(path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), records = records.len(), "Wrote JSON");
    Ok(())
}

/// Write the records as a flattened CSV, one row per record.
///
/// Columns are the sorted union of every record's flattened keys; cells a
/// record lacks are left empty. Returns `false` without creating the file
/// when there are no records.
pub fn write_csv(records: &[ExtractedRecord], path: &Path) -> Result<bool> {
    if records.is_empty() {
        tracing::info!("No data to save to CSV");
        return Ok(false);
    }

    let rows = records
        .iter()
        .map(|r| serde_json::to_value(r).map(|v| flatten_record(&v)))
        .collect::<Result<Vec<FlatRow>, _>>()?;
    let columns = column_union(&rows);

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(&columns)?;
    for row in &rows {
        writer.write_record(
            columns
                .iter()
                .map(|c| row.get(c).map(String::as_str).unwrap_or("")),
        )?;
    }
    writer.flush()?;

    tracing::info!(
        path = %path.display(),
        rows = rows.len(),
        columns = columns.len(),
        "Wrote CSV"
    );
    Ok(true)
}
