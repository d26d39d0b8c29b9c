//! CSV rendering of result rows

use csv::Writer;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{Row, Schema, MISSING_VALUE};

/// Write the header line in schema order, then one record per row
pub fn write_rows<W: Write>(writer: W, schema: &Schema, rows: &[Row]) -> Result<()> {
    let mut csv = Writer::from_writer(writer);

    csv.write_record(schema.headers())?;
    for row in rows {
        let record: Vec<&str> = schema
            .headers()
            .iter()
            .map(|header| row.get(header).unwrap_or(MISSING_VALUE))
            .collect();
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

/// Render rows to a CSV string
pub fn rows_to_csv(schema: &Schema, rows: &[Row]) -> Result<String> {
    let mut buffer = Vec::new();
    write_rows(&mut buffer, schema, rows)?;
    String::from_utf8(buffer).map_err(|e| Error::internal(format!("CSV output is not UTF-8: {}", e)))
}

/// Write rows to a CSV file
pub fn write_csv_file(path: &Path, schema: &Schema, rows: &[Row]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_rows(file, schema, rows)?;
    tracing::info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}
