mod config;
pub mod builder;

use log::{debug, info, warn};

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub use crate::config::*;

// **** Core data structures ****

/// One metric slot on a record: the raw display value plus its two
/// normalized companions.
///
/// `value` is `None` for the "NA" sentinel and `Some(NaN)` for a cell that
/// failed the loose numeric parse. The normalized fields start out as NaN
/// and are only meaningful after the normalization pass.
#[derive(PartialEq, Debug, Clone)]
pub struct MetricField {
    pub value: Option<f64>,
    pub norm: f64,
    pub norm_local: f64,
}

impl Default for MetricField {
    fn default() -> MetricField {
        MetricField {
            value: None,
            norm: f64::NAN,
            norm_local: f64::NAN,
        }
    }
}

/// One country-year observation after coercion.
#[derive(PartialEq, Debug, Clone)]
pub struct Record {
    pub country: String,
    pub iso3c: String,
    pub iso2c: String,
    pub region: Option<String>,
    pub sub_region: Option<String>,
    pub year: i32,
    /// Used only by the population filter. NaN when missing, which the
    /// strict greater-than comparison rejects.
    pub population: f64,
    pub hdi: MetricField,
    pub gdp_per_cap: MetricField,
    pub gni_per_cap: MetricField,
    pub efree: MetricField,
    pub gini: MetricField,
    /// Unique identifier, `"{country}:{year}"`. Computed once at coercion.
    pub key: String,
}

impl Record {
    pub fn metric(&self, metric: Metric) -> &MetricField {
        match metric {
            Metric::Hdi => &self.hdi,
            Metric::Gdp => &self.gdp_per_cap,
            Metric::Gni => &self.gni_per_cap,
            Metric::Efree => &self.efree,
            Metric::Gini => &self.gini,
        }
    }

    fn metric_mut(&mut self, metric: Metric) -> &mut MetricField {
        match metric {
            Metric::Hdi => &mut self.hdi,
            Metric::Gdp => &mut self.gdp_per_cap,
            Metric::Gni => &mut self.gni_per_cap,
            Metric::Efree => &mut self.efree,
            Metric::Gini => &mut self.gini,
        }
    }

    /// The raw value used in tooltips and aggregates. NaN when null.
    pub fn display_value(&self, metric: Metric) -> f64 {
        self.metric(metric).value.unwrap_or(f64::NAN)
    }

    /// The normalized value plotted for the given scale.
    pub fn plotted_value(&self, metric: Metric, scale: Scale) -> f64 {
        let field = self.metric(metric);
        match scale {
            Scale::Global => field.norm,
            Scale::Local => field.norm_local,
        }
    }
}

/// Per-group sortable aggregates: the best display value of each metric
/// across the group's records. For Gini, lower means more equal, so the
/// minimum is kept instead of the maximum.
#[derive(PartialEq, Debug, Clone)]
pub struct GroupAggregates {
    pub hdi_max: f64,
    pub gdp_max: f64,
    pub gni_max: f64,
    pub efree_max: f64,
    pub gini_min: f64,
}

impl GroupAggregates {
    const EMPTY: GroupAggregates = GroupAggregates {
        hdi_max: f64::NAN,
        gdp_max: f64::NAN,
        gni_max: f64::NAN,
        efree_max: f64::NAN,
        gini_min: f64::NAN,
    };

    pub fn sortable(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Hdi => self.hdi_max,
            Metric::Gdp => self.gdp_max,
            Metric::Gni => self.gni_max,
            Metric::Efree => self.efree_max,
            Metric::Gini => self.gini_min,
        }
    }
}

/// The year-series of one country.
#[derive(PartialEq, Debug, Clone)]
pub struct Group {
    /// The country name.
    pub key: String,
    /// First non-null region among the members, else "Other".
    pub region: String,
    /// All records of this country, in input (year-ascending) order.
    pub values: Vec<Record>,
    /// Subset of `values` where both active metrics are finite. Recomputed
    /// by `recompute_view` for the current metric pair and scale.
    pub values_filter: Vec<Record>,
    /// Mean of the plotted x/y values over `values_filter`, for the
    /// current view. NaN when the filtered set is empty.
    pub mean_x: f64,
    pub mean_y: f64,
    pub aggregates: GroupAggregates,
}

impl Group {
    fn new(key: String) -> Group {
        Group {
            key,
            region: REGION_FALLBACK.to_string(),
            values: Vec::new(),
            values_filter: Vec::new(),
            mean_x: f64::NAN,
            mean_y: f64::NAN,
            aggregates: GroupAggregates::EMPTY,
        }
    }
}

/// The canonical in-memory dataset: the flat record list and the per-country
/// groups derived from it. Rebuilt wholesale on every load.
#[derive(PartialEq, Debug, Clone)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub groups: Vec<Group>,
}

// **** Pipeline stages ****

/// Rounds a value to the given number of decimals.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

fn coerce_cell(raw: &RawRecord, column: &str) -> Option<f64> {
    let cell = match raw.get(column) {
        Some(c) => c.trim(),
        None => "",
    };
    if cell == NULL_STRING {
        return None;
    }
    // Loose coercion: anything that does not parse cleanly becomes NaN and
    // propagates through the later stages without raising.
    Some(cell.parse::<f64>().unwrap_or(f64::NAN))
}

fn string_cell(raw: &RawRecord, column: &str) -> String {
    raw.get(column).cloned().unwrap_or_default()
}

fn optional_string_cell(raw: &RawRecord, column: &str) -> Option<String> {
    match raw.get(column).map(|s| s.as_str()) {
        None | Some("") | Some(NULL_STRING) => None,
        Some(s) => Some(s.to_string()),
    }
}

fn rounded(value: Option<f64>, column: &str, rounding: &[(String, u32)]) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() => {
            let decimals = rounding
                .iter()
                .find(|(col, _)| col == column)
                .map(|(_, d)| *d);
            match decimals {
                Some(d) => Some(round_to(v, d)),
                None => Some(v),
            }
        }
        other => other,
    }
}

/// Turns raw string-keyed rows into typed records.
///
/// String columns pass through untouched, everything else is parsed as a
/// float with the "NA" sentinel mapped to null. The `key` field is attached
/// here and rows that would duplicate an existing key are dropped with a
/// warning. Rows without a usable year are dropped as well, since the year
/// is half of the natural key.
pub fn coerce_records(raw: &[RawRecord], rounding: &[(String, u32)]) -> Vec<Record> {
    let mut res: Vec<Record> = Vec::new();
    let mut seen_keys: HashSet<String> = HashSet::new();

    for row in raw.iter() {
        let country = string_cell(row, "country");
        let year = match coerce_cell(row, "year") {
            Some(y) if y.is_finite() => y as i32,
            _ => {
                warn!("coerce_records: dropping row without a year: {:?}", country);
                continue;
            }
        };
        let key = format!("{}:{}", country, year);
        if !seen_keys.insert(key.clone()) {
            warn!("coerce_records: duplicate key {:?}, keeping the first row", key);
            continue;
        }

        let mut record = Record {
            country,
            iso3c: string_cell(row, "iso3c"),
            iso2c: string_cell(row, "iso2c"),
            region: optional_string_cell(row, "region"),
            sub_region: optional_string_cell(row, "sub-region"),
            year,
            population: rounded(coerce_cell(row, "population"), "population", rounding)
                .unwrap_or(f64::NAN),
            hdi: MetricField::default(),
            gdp_per_cap: MetricField::default(),
            gni_per_cap: MetricField::default(),
            efree: MetricField::default(),
            gini: MetricField::default(),
            key,
        };
        for metric in Metric::ALL {
            let column = metric.column();
            record.metric_mut(metric).value = rounded(coerce_cell(row, column), column, rounding);
        }
        res.push(record);
    }
    debug!("coerce_records: {} rows in, {} records out", raw.len(), res.len());
    res
}

/// Keeps the records with `population > min_population` whose country is not
/// on the exclusion list. The comparison is strict, and NaN populations
/// never pass it.
pub fn filter_population(
    records: Vec<Record>,
    min_population: f64,
    excluded_countries: &[String],
) -> Vec<Record> {
    let excluded: HashSet<&str> = excluded_countries.iter().map(|s| s.as_str()).collect();
    let before = records.len();
    let res: Vec<Record> = records
        .into_iter()
        .filter(|r| r.population > min_population && !excluded.contains(r.country.as_str()))
        .collect();
    debug!("filter_population: {} -> {} records", before, res.len());
    res
}

fn metric_extent<'a>(records: impl Iterator<Item = &'a Record>, metric: Metric) -> (f64, f64) {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for r in records {
        if let Some(v) = r.metric(metric).value {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
            }
        }
    }
    (min, max)
}

fn scaled(field: &MetricField, min: f64, max: f64) -> f64 {
    match field.value {
        // Zero counts as missing, matching the display semantics of the
        // source data where a zero metric is never a real observation.
        Some(v) if v.is_finite() && v != 0.0 => (v - min) / (max - min),
        _ => f64::NAN,
    }
}

/// Min-max normalization of one metric over the given scope.
///
/// The extent is computed once over all the records in the slice, ignoring
/// null and non-finite values, and reused for every record. A degenerate
/// extent (`max == min`) makes every result NaN, which downstream stages
/// treat as "no data" rather than an error. The result lands in the global
/// or local normalized field depending on `scale`.
pub fn normalize_min_max(records: &mut [Record], metric: Metric, scale: Scale) {
    let (min, max) = metric_extent(records.iter(), metric);
    for r in records.iter_mut() {
        let field = r.metric_mut(metric);
        let t = scaled(field, min, max);
        match scale {
            Scale::Global => field.norm = t,
            Scale::Local => field.norm_local = t,
        }
    }
}

/// Local normalization: for every country, an independent min-max over that
/// country's own records only. Countries never interfere with each other.
pub fn normalize_local(records: &mut [Record]) {
    let mut by_country: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, r) in records.iter().enumerate() {
        by_country.entry(r.country.clone()).or_default().push(idx);
    }

    for ids in by_country.values() {
        for metric in Metric::ALL {
            let (min, max) = metric_extent(ids.iter().map(|&i| &records[i]), metric);
            for &i in ids.iter() {
                let field = records[i].metric_mut(metric);
                field.norm_local = scaled(field, min, max);
            }
        }
    }
}

/// Stable group-by on the country name. Records keep their relative order
/// inside each group and groups appear in first-seen order.
pub fn group_by_country(records: &[Record]) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for r in records.iter() {
        let gi = match index.get(&r.country) {
            Some(&gi) => gi,
            None => {
                groups.push(Group::new(r.country.clone()));
                index.insert(r.country.clone(), groups.len() - 1);
                groups.len() - 1
            }
        };
        groups[gi].values.push(r.clone());
    }
    debug!("group_by_country: {} records -> {} groups", records.len(), groups.len());
    groups
}

fn fold_best(values: impl Iterator<Item = f64>, lower_is_better: bool) -> f64 {
    let mut best = f64::NAN;
    for v in values {
        if !v.is_finite() {
            continue;
        }
        if best.is_nan() || (lower_is_better && v < best) || (!lower_is_better && v > best) {
            best = v;
        }
    }
    best
}

/// Attaches the region label and the per-metric sortable aggregates to each
/// group.
pub fn attach_aggregates(groups: &mut [Group]) {
    for g in groups.iter_mut() {
        g.region = g
            .values
            .iter()
            .find_map(|r| r.region.clone())
            .unwrap_or_else(|| REGION_FALLBACK.to_string());
        g.aggregates = GroupAggregates {
            hdi_max: fold_best(g.values.iter().map(|r| r.display_value(Metric::Hdi)), false),
            gdp_max: fold_best(g.values.iter().map(|r| r.display_value(Metric::Gdp)), false),
            gni_max: fold_best(g.values.iter().map(|r| r.display_value(Metric::Gni)), false),
            efree_max: fold_best(g.values.iter().map(|r| r.display_value(Metric::Efree)), false),
            gini_min: fold_best(g.values.iter().map(|r| r.display_value(Metric::Gini)), true),
        };
    }
}

// NaN aggregates sort after every real value, in both directions.
fn cmp_sortable(a: f64, b: f64, ascending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for v in values {
        if v.is_finite() {
            sum += v;
            n += 1;
        }
    }
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Re-derives the displayed group list for one view configuration.
///
/// This is a pure function of the canonical groups and the configuration:
/// it filters each group down to the finite (x, y) pairs, drops the groups
/// that are too sparse to draw, applies the search allow-list, sorts, and
/// finally applies the narrow-viewport caps. The input groups are left
/// untouched.
pub fn recompute_view(groups: &[Group], view: &ViewConfig) -> Vec<Group> {
    let mut res: Vec<Group> = Vec::new();
    for g in groups.iter() {
        let mut g2 = g.clone();
        g2.values_filter = g
            .values
            .iter()
            .filter(|r| {
                r.plotted_value(view.x_metric, view.scale).is_finite()
                    && r.plotted_value(view.y_metric, view.scale).is_finite()
            })
            .cloned()
            .collect();
        if g2.values_filter.len() <= view.min_points {
            debug!(
                "recompute_view: dropping {:?}, only {} valid points",
                g2.key,
                g2.values_filter.len()
            );
            continue;
        }
        g2.mean_x = mean(
            g2.values_filter
                .iter()
                .map(|r| r.plotted_value(view.x_metric, view.scale)),
        );
        g2.mean_y = mean(
            g2.values_filter
                .iter()
                .map(|r| r.plotted_value(view.y_metric, view.scale)),
        );
        res.push(g2);
    }

    if !view.search_keys.is_empty() {
        res.retain(|g| view.search_keys.iter().any(|k| *k == g.key));
    }

    match view.sort_order {
        SortOrder::By(metric) => {
            let ascending = metric.lower_is_better();
            res.sort_by(|a, b| {
                cmp_sortable(
                    a.aggregates.sortable(metric),
                    b.aggregates.sortable(metric),
                    ascending,
                )
            });
        }
        SortOrder::Region => res.sort_by(|a, b| a.region.cmp(&b.region)),
        SortOrder::Alphabetical => res.sort_by(|a, b| a.key.cmp(&b.key)),
    }

    if let Some(limits) = view.narrow {
        if view.sort_order == SortOrder::Region {
            // First N of every region bucket, in sorted order.
            let mut per_region: HashMap<String, usize> = HashMap::new();
            res.retain(|g| {
                let seen = per_region.entry(g.region.clone()).or_insert(0);
                *seen += 1;
                *seen <= limits.max_per_region
            });
        } else {
            res.truncate(limits.max_groups);
        }
    }

    debug!("recompute_view: {} groups displayed", res.len());
    res
}

/// Runs the full ingestion pipeline: coercion, population and exclusion
/// filtering, global and local normalization, grouping, aggregation.
///
/// This is the one-shot entry point behind every data load; there is no
/// incremental path. The only hard failure is a dataset with no surviving
/// records, which the caller is expected to surface as an explicit
/// empty-state rather than ignore.
pub fn process_records(
    raw: &[RawRecord],
    options: &PipelineOptions,
) -> Result<Dataset, PipelineError> {
    info!(
        "Processing {} raw rows, min population {}, {} excluded countries",
        raw.len(),
        options.min_population,
        options.excluded_countries.len()
    );
    let coerced = coerce_records(raw, &options.rounding);
    let mut records = filter_population(
        coerced,
        options.min_population,
        &options.excluded_countries,
    );
    if records.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    for metric in Metric::ALL {
        normalize_min_max(&mut records, metric, Scale::Global);
    }
    normalize_local(&mut records);

    let mut groups = group_by_country(&records);
    attach_aggregates(&mut groups);
    info!(
        "Processed dataset: {} records, {} countries",
        records.len(),
        groups.len()
    );
    Ok(Dataset { records, groups })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[(&str, &str)]) -> RawRecord {
        cells
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // A small synthetic table: three countries, three years each.
    fn sample_rows() -> Vec<RawRecord> {
        let mut rows = Vec::new();
        let specs: [(&str, &str, &str, [(&str, &str, &str); 3]); 3] = [
            (
                "Norway",
                "NOR",
                "Europe",
                [
                    ("2000", "0.90", "30000"),
                    ("2001", "0.91", "31000"),
                    ("2002", "0.92", "32000"),
                ],
            ),
            (
                "Chile",
                "CHL",
                "Americas",
                [
                    ("2000", "0.75", "9000"),
                    ("2001", "0.76", "9500"),
                    ("2002", "0.77", "9800"),
                ],
            ),
            (
                "Chad",
                "TCD",
                "Africa",
                [
                    ("2000", "0.30", "700"),
                    ("2001", "NA", "720"),
                    ("2002", "0.32", "NA"),
                ],
            ),
        ];
        for (country, iso3c, region, years) in specs.iter() {
            for (year, hdi, gdp) in years.iter() {
                rows.push(row(&[
                    ("country", country),
                    ("iso3c", iso3c),
                    ("iso2c", &iso3c[..2]),
                    ("region", region),
                    ("sub-region", region),
                    ("year", year),
                    ("population", "5000000"),
                    ("hdi", hdi),
                    ("gdp_per_cap", gdp),
                    ("gni_per_cap", "1000"),
                    ("efree", "6.0"),
                    ("gini", "0.40"),
                ]));
            }
        }
        rows
    }

    fn wide_view() -> ViewConfig {
        ViewConfig {
            min_points: 2,
            ..ViewConfig::default()
        }
    }

    #[test]
    fn keys_are_unique_after_coercion() {
        let mut rows = sample_rows();
        // A duplicated country-year row must not produce a second key.
        rows.push(rows[0].clone());
        let records = coerce_records(&rows, &[]);
        let keys: HashSet<&str> = records.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys.len(), records.len());
        assert_eq!(records[0].key, "Norway:2000");
    }

    #[test]
    fn na_sentinel_becomes_null_and_norm_nan() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let r = data
            .records
            .iter()
            .find(|r| r.key == "Chad:2001")
            .unwrap();
        assert_eq!(r.hdi.value, None);
        assert!(r.hdi.norm.is_nan());
        assert!(r.hdi.norm_local.is_nan());
    }

    #[test]
    fn parse_failure_degrades_to_nan() {
        let mut rows = sample_rows();
        rows[0].insert("hdi".to_string(), "not-a-number".to_string());
        let records = coerce_records(&rows, &[]);
        let v = records[0].hdi.value.unwrap();
        assert!(v.is_nan());
    }

    #[test]
    fn rows_without_a_year_are_dropped() {
        let mut rows = sample_rows();
        rows[0].insert("year".to_string(), "NA".to_string());
        let records = coerce_records(&rows, &[]);
        assert_eq!(records.len(), 8);
    }

    #[test]
    fn rounding_is_applied_per_column() {
        let mut rows = sample_rows();
        rows[0].insert("gdp_per_cap".to_string(), "30000.4567".to_string());
        let rounding = vec![("gdp_per_cap".to_string(), 2)];
        let records = coerce_records(&rows, &rounding);
        assert_eq!(records[0].gdp_per_cap.value, Some(30000.46));
        // Columns without a rounding entry are untouched.
        assert_eq!(records[0].hdi.value, Some(0.90));
    }

    #[test]
    fn population_filter_is_strictly_greater() {
        let rows = vec![
            row(&[
                ("country", "A"),
                ("year", "2000"),
                ("population", "2000000"),
            ]),
            row(&[
                ("country", "B"),
                ("year", "2000"),
                ("population", "3000000"),
            ]),
            row(&[
                ("country", "C"),
                ("year", "2000"),
                ("population", "5000000"),
            ]),
        ];
        let records = filter_population(coerce_records(&rows, &[]), 3_000_000.0, &[]);
        let countries: Vec<&str> = records.iter().map(|r| r.country.as_str()).collect();
        assert_eq!(countries, vec!["C"]);
    }

    #[test]
    fn excluded_countries_are_dropped() {
        let records = coerce_records(&sample_rows(), &[]);
        let filtered = filter_population(records, 0.0, &["Chile".to_string()]);
        assert!(filtered.iter().all(|r| r.country != "Chile"));
        assert_eq!(filtered.len(), 6);
    }

    #[test]
    fn normalization_bounds_on_non_degenerate_domain() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        // Global HDI extent is [0.30, 0.92].
        let max_r = data.records.iter().find(|r| r.key == "Norway:2002").unwrap();
        let min_r = data.records.iter().find(|r| r.key == "Chad:2000").unwrap();
        assert!((max_r.hdi.norm - 1.0).abs() < 1e-12);
        assert_eq!(min_r.hdi.norm, 0.0);
        for r in data.records.iter() {
            if let Some(v) = r.hdi.value {
                if v.is_finite() {
                    assert!(r.hdi.norm >= 0.0 && r.hdi.norm <= 1.0);
                }
            }
        }
    }

    #[test]
    fn degenerate_domain_yields_nan() {
        let mut records = coerce_records(&sample_rows(), &[]);
        // Every record shares the same gini value, so max == min.
        normalize_min_max(&mut records, Metric::Gini, Scale::Global);
        assert!(records.iter().all(|r| r.gini.norm.is_nan()));
    }

    #[test]
    fn local_normalization_is_independent_per_country() {
        let mut rows = sample_rows();
        let data1 = process_records(&rows, &PipelineOptions::default()).unwrap();

        // Perturbing Norway's HDI must not change Chile's local fields.
        rows[0].insert("hdi".to_string(), "0.10".to_string());
        let data2 = process_records(&rows, &PipelineOptions::default()).unwrap();

        let chile1: Vec<f64> = data1
            .records
            .iter()
            .filter(|r| r.country == "Chile")
            .map(|r| r.hdi.norm_local)
            .collect();
        let chile2: Vec<f64> = data2
            .records
            .iter()
            .filter(|r| r.country == "Chile")
            .map(|r| r.hdi.norm_local)
            .collect();
        assert_eq!(chile1, chile2);

        // The global fields do shift with the new extent.
        let chile_global1 = data1
            .records
            .iter()
            .find(|r| r.key == "Chile:2000")
            .unwrap()
            .hdi
            .norm;
        let chile_global2 = data2
            .records
            .iter()
            .find(|r| r.key == "Chile:2000")
            .unwrap()
            .hdi
            .norm;
        assert!(chile_global1 != chile_global2);
    }

    #[test]
    fn local_bounds_within_one_country() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let lo = data.records.iter().find(|r| r.key == "Norway:2000").unwrap();
        let hi = data.records.iter().find(|r| r.key == "Norway:2002").unwrap();
        assert_eq!(lo.hdi.norm_local, 0.0);
        assert!((hi.hdi.norm_local - 1.0).abs() < 1e-12);
    }

    #[test]
    fn grouping_is_stable() {
        let records = coerce_records(&sample_rows(), &[]);
        let g1 = group_by_country(&records);
        let g2 = group_by_country(&records);
        // Equality on the record keys: the norm fields are still NaN here.
        let membership = |gs: &[Group]| -> Vec<Vec<String>> {
            gs.iter()
                .map(|g| g.values.iter().map(|r| r.key.clone()).collect())
                .collect()
        };
        assert_eq!(membership(&g1), membership(&g2));
        let keys: Vec<&str> = g1.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Norway", "Chile", "Chad"]);
        assert!(g1.iter().all(|g| g.values.len() == 3));
        // Year order inside each group matches the input order.
        let years: Vec<i32> = g1[0].values.iter().map(|r| r.year).collect();
        assert_eq!(years, vec![2000, 2001, 2002]);
    }

    #[test]
    fn region_falls_back_to_other() {
        let rows = vec![
            row(&[("country", "X"), ("year", "2000"), ("population", "5000000")]),
            row(&[
                ("country", "X"),
                ("year", "2001"),
                ("population", "5000000"),
                ("region", "NA"),
            ]),
        ];
        let mut groups = group_by_country(&coerce_records(&rows, &[]));
        attach_aggregates(&mut groups);
        assert_eq!(groups[0].region, "Other");
    }

    #[test]
    fn aggregates_use_max_except_gini_min() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let norway = data.groups.iter().find(|g| g.key == "Norway").unwrap();
        assert!((norway.aggregates.hdi_max - 0.92).abs() < 1e-12);
        assert!((norway.aggregates.gini_min - 0.40).abs() < 1e-12);
        let chad = data.groups.iter().find(|g| g.key == "Chad").unwrap();
        // The NA year is skipped, not poisoning the max.
        assert!((chad.aggregates.hdi_max - 0.32).abs() < 1e-12);
    }

    // Groups built through the real pipeline, with the sortable aggregates
    // pinned to the given values afterwards.
    fn groups_with_aggregate(aggs: &[(&str, f64)]) -> Vec<Group> {
        let mut rows = Vec::new();
        for (key, _) in aggs.iter() {
            for (year, hdi, gdp) in [("2000", "0.2", "100"), ("2001", "0.4", "200")] {
                rows.push(row(&[
                    ("country", key),
                    ("year", year),
                    ("population", "5000000"),
                    ("hdi", hdi),
                    ("gdp_per_cap", gdp),
                ]));
            }
        }
        let mut data = process_records(&rows, &PipelineOptions::default()).unwrap();
        for (g, (_, v)) in data.groups.iter_mut().zip(aggs.iter()) {
            g.aggregates.hdi_max = *v;
            g.aggregates.gini_min = *v;
        }
        data.groups
    }

    #[test]
    fn sort_by_metric_descending() {
        let groups = groups_with_aggregate(&[("A", 0.9), ("B", 0.5), ("C", 0.7)]);
        let view = ViewConfig {
            sort_order: SortOrder::By(Metric::Hdi),
            min_points: 1,
            ..ViewConfig::default()
        };
        let shown = recompute_view(&groups, &view);
        let keys: Vec<&str> = shown.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "C", "B"]);
    }

    #[test]
    fn gini_sorts_ascending() {
        let groups = groups_with_aggregate(&[("A", 0.25), ("B", 0.6), ("C", 0.4)]);
        let view = ViewConfig {
            sort_order: SortOrder::By(Metric::Gini),
            min_points: 1,
            ..ViewConfig::default()
        };
        let shown = recompute_view(&groups, &view);
        let keys: Vec<&str> = shown.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["A", "C", "B"]);
    }

    #[test]
    fn sparse_groups_are_dropped() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        // Chad has one NA hdi and one NA gdp, leaving a single finite pair
        // out of three on the hdi/gdp local view.
        let view = ViewConfig {
            min_points: 3,
            ..ViewConfig::default()
        };
        let shown = recompute_view(&data.groups, &view);
        assert!(shown.is_empty());
        let view = ViewConfig {
            min_points: 2,
            ..ViewConfig::default()
        };
        let shown = recompute_view(&data.groups, &view);
        let keys: Vec<&str> = shown.iter().map(|g| g.key.as_str()).collect();
        assert!(keys.contains(&"Norway"));
        assert!(keys.contains(&"Chile"));
        assert!(!keys.contains(&"Chad"));
    }

    #[test]
    fn search_filter_keeps_selected_keys_only() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let view = ViewConfig {
            search_keys: vec!["Norway".to_string()],
            ..wide_view()
        };
        let shown = recompute_view(&data.groups, &view);
        let keys: Vec<&str> = shown.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Norway"]);

        // An empty selection passes everything through.
        let shown = recompute_view(&data.groups, &wide_view());
        assert_eq!(shown.len(), 2);
    }

    #[test]
    fn alphabetical_and_region_sort() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let view = ViewConfig {
            sort_order: SortOrder::Alphabetical,
            ..wide_view()
        };
        let shown = recompute_view(&data.groups, &view);
        let keys: Vec<&str> = shown.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["Chile", "Norway"]);

        let view = ViewConfig {
            sort_order: SortOrder::Region,
            ..wide_view()
        };
        let shown = recompute_view(&data.groups, &view);
        let regions: Vec<&str> = shown.iter().map(|g| g.region.as_str()).collect();
        assert_eq!(regions, vec!["Americas", "Europe"]);
    }

    #[test]
    fn narrow_limits_cap_total_groups() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let view = ViewConfig {
            narrow: Some(NarrowLimits {
                max_groups: 1,
                max_per_region: 1,
            }),
            ..wide_view()
        };
        let shown = recompute_view(&data.groups, &view);
        assert_eq!(shown.len(), 1);
        // Sorted by HDI descending, Norway leads.
        assert_eq!(shown[0].key, "Norway");
    }

    #[test]
    fn narrow_limits_cap_per_region_bucket() {
        let mut rows = sample_rows();
        // A second European country to exercise the per-region cap.
        for (year, hdi) in [("2000", "0.85"), ("2001", "0.86"), ("2002", "0.87")] {
            rows.push(row(&[
                ("country", "Sweden"),
                ("iso3c", "SWE"),
                ("iso2c", "SE"),
                ("region", "Europe"),
                ("year", year),
                ("population", "9000000"),
                ("hdi", hdi),
                ("gdp_per_cap", "28000"),
                ("gni_per_cap", "1000"),
                ("efree", "6.0"),
                ("gini", "0.30"),
            ]));
        }
        let data = process_records(&rows, &PipelineOptions::default()).unwrap();
        let view = ViewConfig {
            sort_order: SortOrder::Region,
            narrow: Some(NarrowLimits {
                max_groups: 20,
                max_per_region: 1,
            }),
            ..wide_view()
        };
        let shown = recompute_view(&data.groups, &view);
        let regions: Vec<&str> = shown.iter().map(|g| g.region.as_str()).collect();
        assert_eq!(regions, vec!["Americas", "Europe"]);
    }

    #[test]
    fn view_recomputation_is_pure() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let _ = recompute_view(&data.groups, &wide_view());
        // The canonical groups never receive the view-derived fields.
        assert!(data.groups.iter().all(|g| g.values_filter.is_empty()));
        assert!(data.groups.iter().all(|g| g.mean_x.is_nan() && g.mean_y.is_nan()));
    }

    #[test]
    fn means_cover_the_filtered_points() {
        let data = process_records(&sample_rows(), &PipelineOptions::default()).unwrap();
        let shown = recompute_view(&data.groups, &wide_view());
        let norway = shown.iter().find(|g| g.key == "Norway").unwrap();
        // Local normalization of a 3-year monotone series: 0, 0.5, 1.
        assert!((norway.mean_y - 0.5).abs() < 1e-9);
        assert!(norway.mean_x.is_finite());
    }

    #[test]
    fn empty_dataset_is_a_hard_error() {
        let res = process_records(&[], &PipelineOptions::default());
        assert_eq!(res, Err(PipelineError::EmptyDataset));
    }
}
