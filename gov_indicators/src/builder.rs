pub use crate::config::*;
use crate::{process_records, Dataset};

/// A builder for assembling raw rows programmatically.
///
/// This is the in-memory counterpart of the CSV reader, mostly useful for
/// tests and embedders that already hold the table in another shape.
///
/// ```
/// pub use gov_indicators::builder::Builder;
/// pub use gov_indicators::PipelineOptions;
/// # use gov_indicators::PipelineError;
///
/// let mut builder = Builder::new(&PipelineOptions::default());
///
/// builder.add_row(&[
///     ("country", "Norway"), ("region", "Europe"), ("year", "2000"),
///     ("population", "4500000"), ("hdi", "0.90"), ("gdp_per_cap", "30000"),
/// ]);
/// builder.add_row(&[
///     ("country", "Norway"), ("region", "Europe"), ("year", "2001"),
///     ("population", "4500000"), ("hdi", "0.91"), ("gdp_per_cap", "31000"),
/// ]);
///
/// let dataset = builder.finish()?;
/// assert_eq!(dataset.groups.len(), 1);
///
/// # Ok::<(), PipelineError>(())
/// ```
pub struct Builder {
    pub(crate) _options: PipelineOptions,
    pub(crate) _rows: Vec<RawRecord>,
}

impl Builder {
    pub fn new(options: &PipelineOptions) -> Builder {
        Builder {
            _options: options.clone(),
            _rows: Vec::new(),
        }
    }

    /// Adds one row as (column, cell) pairs. Missing columns are treated
    /// like empty cells by the coercion stage.
    pub fn add_row(&mut self, cells: &[(&str, &str)]) {
        let row: RawRecord = cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self._rows.push(row);
    }

    pub fn add_raw(&mut self, row: &RawRecord) {
        self._rows.push(row.clone());
    }

    /// Runs the full pipeline over the accumulated rows.
    pub fn finish(&self) -> Result<Dataset, PipelineError> {
        process_records(&self._rows, &self._options)
    }
}
