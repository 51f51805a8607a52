//! Primitives for reading CSV files.

use crate::run::{CsvHeaderSnafu, CsvLineParseSnafu, CsvOpenSnafu, RunResult};
use gov_indicators::RawRecord;
use log::debug;
use snafu::prelude::*;

/// Reads a CSV file with a header row into a list of column -> cell maps.
///
/// Short rows simply miss the trailing columns, which the coercion stage
/// treats like empty cells.
pub fn read_csv_table(path: &str) -> RunResult<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path.to_string(),
        })?;
    let headers = rdr.headers().context(CsvHeaderSnafu {})?.clone();
    debug!("read_csv_table: headers: {:?}", headers);

    let mut res: Vec<RawRecord> = Vec::new();
    for (idx, line_r) in rdr.into_records().enumerate() {
        // The header occupies line 1.
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu { lineno })?;
        let mut row = RawRecord::new();
        for (header, cell) in headers.iter().zip(line.iter()) {
            row.insert(header.to_string(), cell.to_string());
        }
        res.push(row);
    }
    debug!("read_csv_table: {} rows read from {}", res.len(), path);
    Ok(res)
}
