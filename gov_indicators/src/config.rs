// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

/// One raw CSV row: header name mapped to the cell text, before any coercion.
pub type RawRecord = HashMap<String, String>;

/// The literal cell content that marks a missing value in the source table.
pub const NULL_STRING: &str = "NA";

/// Columns that are carried through as text and never parsed as numbers.
pub const STRING_COLUMNS: [&str; 5] = ["country", "iso3c", "iso2c", "region", "sub-region"];

/// Region label attached to a group when none of its records carries one.
pub const REGION_FALLBACK: &str = "Other";

/// The tracked development indicators.
///
/// Every metric carries a raw display value plus two normalized companions
/// (global and country-local min-max scaling).
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Metric {
    Hdi,
    Gdp,
    Gni,
    Efree,
    Gini,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::Hdi,
        Metric::Gdp,
        Metric::Gni,
        Metric::Efree,
        Metric::Gini,
    ];

    /// The short identifier used in view configurations and sort tokens.
    pub fn id(&self) -> &'static str {
        match self {
            Metric::Hdi => "hdi",
            Metric::Gdp => "gdp",
            Metric::Gni => "gni",
            Metric::Efree => "efree",
            Metric::Gini => "gini",
        }
    }

    /// The CSV column holding the display value.
    pub fn column(&self) -> &'static str {
        match self {
            Metric::Hdi => "hdi",
            Metric::Gdp => "gdp_per_cap",
            Metric::Gni => "gni_per_cap",
            Metric::Efree => "efree",
            Metric::Gini => "gini",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Metric::Hdi => "Human Development Index",
            Metric::Gdp => "GDP per Capita",
            Metric::Gni => "GNI per Capita",
            Metric::Efree => "Economic Freedom",
            Metric::Gini => "Gini Index",
        }
    }

    /// The Gini index measures inequality: a lower value ranks first.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Metric::Gini)
    }

    pub fn parse(s: &str) -> Result<Metric, PipelineError> {
        Metric::ALL
            .iter()
            .find(|m| m.id() == s)
            .copied()
            .ok_or_else(|| PipelineError::UnknownMetric(s.to_string()))
    }
}

/// The normalization scope used when plotting.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Scale {
    /// Min-max over the entire filtered dataset.
    Global,
    /// Min-max over one country's own year-series.
    Local,
}

impl Scale {
    pub fn parse(s: &str) -> Result<Scale, PipelineError> {
        match s {
            "global" => Ok(Scale::Global),
            "local" => Ok(Scale::Local),
            _ => Err(PipelineError::UnknownScale(s.to_string())),
        }
    }
}

/// How the displayed groups are ordered.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SortOrder {
    /// By a metric's group aggregate, best first (descending, except Gini
    /// which sorts ascending).
    By(Metric),
    /// By region name, ascending.
    Region,
    /// By country name, ascending.
    Alphabetical,
}

impl SortOrder {
    pub fn parse(s: &str) -> Result<SortOrder, PipelineError> {
        match s {
            "region" => Ok(SortOrder::Region),
            "alpha" => Ok(SortOrder::Alphabetical),
            m => Metric::parse(m)
                .map(SortOrder::By)
                .map_err(|_| PipelineError::UnknownSortOrder(s.to_string())),
        }
    }
}

/// Group caps applied on constrained display surfaces.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct NarrowLimits {
    /// Total group cap when not sorting by region.
    pub max_groups: usize,
    /// Per-region group cap when sorting by region.
    pub max_per_region: usize,
}

impl NarrowLimits {
    pub const DEFAULT: NarrowLimits = NarrowLimits {
        max_groups: 20,
        max_per_region: 6,
    };
}

/// The configuration of one rendered view. Any change to it triggers a full
/// re-derivation of the displayed groups; there is no incremental update path.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ViewConfig {
    pub x_metric: Metric,
    pub y_metric: Metric,
    pub scale: Scale,
    pub sort_order: SortOrder,
    /// Country allow-list from the search box. Empty means no filtering.
    pub search_keys: Vec<String>,
    /// Groups with this many valid points or fewer are not drawn.
    pub min_points: usize,
    /// Narrow-viewport policy, when active.
    pub narrow: Option<NarrowLimits>,
}

impl Default for ViewConfig {
    fn default() -> ViewConfig {
        ViewConfig {
            x_metric: Metric::Gdp,
            y_metric: Metric::Hdi,
            scale: Scale::Local,
            sort_order: SortOrder::By(Metric::Hdi),
            search_keys: Vec::new(),
            min_points: 3,
            narrow: None,
        }
    }
}

/// Options for the ingestion half of the pipeline (coercion and filtering).
#[derive(PartialEq, Debug, Clone)]
pub struct PipelineOptions {
    /// Records at or below this population are dropped (strictly greater
    /// than passes).
    pub min_population: f64,
    /// Countries removed from the dataset regardless of population.
    pub excluded_countries: Vec<String>,
    /// Column name mapped to a decimal count, applied after parsing.
    pub rounding: Vec<(String, u32)>,
}

impl Default for PipelineOptions {
    fn default() -> PipelineOptions {
        PipelineOptions {
            min_population: 3_000_000.0,
            excluded_countries: Vec::new(),
            rounding: Vec::new(),
        }
    }
}

/// Errors that prevent the pipeline from producing a dataset.
///
/// Malformed cells are not errors: they degrade to null or NaN and are
/// excluded by the finiteness checks downstream.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum PipelineError {
    /// No record survived coercion and filtering.
    EmptyDataset,
    UnknownMetric(String),
    UnknownScale(String),
    UnknownSortOrder(String),
}

impl Error for PipelineError {}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::EmptyDataset => write!(f, "no records left after filtering"),
            PipelineError::UnknownMetric(s) => write!(f, "unknown metric: {}", s),
            PipelineError::UnknownScale(s) => write!(f, "unknown scale: {}", s),
            PipelineError::UnknownSortOrder(s) => write!(f, "unknown sort order: {}", s),
        }
    }
}
