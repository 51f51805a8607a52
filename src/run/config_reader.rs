//! Mappings to read the JSON configuration of a pipeline run.
//!
//! The configuration file mirrors the panel settings of the charting
//! frontend: a `viewSettings` object for what to display and how to sort
//! it, and a `dataSettings` object for the filtering applied before any
//! view is computed. Every field is optional.

use crate::run::{OpeningJsonSnafu, ParsingJsonSnafu, RunResult};
use gov_indicators::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;
use snafu::prelude::*;
use std::collections::HashMap;
use std::fs;

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct ViewSettings {
    /// The metric pair to plot, as a "{y}_{x}" token such as "hdi_gdp".
    #[serde(rename = "dataDisplay", default)]
    pub data_display: Option<String>,
    /// "global" or "local".
    #[serde(default)]
    pub scale: Option<String>,
    /// A metric id, "region" or "alpha".
    #[serde(rename = "sortOrder", default)]
    pub sort_order: Option<String>,
    /// Country names selected through the search box. Empty means all.
    #[serde(rename = "searchKeys", default)]
    pub search_keys: Option<Vec<String>>,
    /// Groups with at most this many plottable points are hidden.
    #[serde(rename = "minPoints", default)]
    pub min_points: Option<usize>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSettings {
    /// Countries at or below this population are dropped.
    #[serde(rename = "minPopulation", default)]
    pub min_population: Option<f64>,
    #[serde(rename = "excludedCountries", default)]
    pub excluded_countries: Option<Vec<String>>,
    /// Decimal places applied per column right after coercion.
    #[serde(default)]
    pub rounding: Option<HashMap<String, u32>>,
}

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(rename = "dataSettings", default)]
    pub data_settings: Option<DataSettings>,
    #[serde(rename = "viewSettings", default)]
    pub view_settings: Option<ViewSettings>,
}

/// The view settings echoed into the output summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputView {
    #[serde(rename = "xMetric")]
    pub x_metric: String,
    #[serde(rename = "yMetric")]
    pub y_metric: String,
    pub scale: String,
    #[serde(rename = "sortOrder")]
    pub sort_order: String,
    #[serde(rename = "minPoints")]
    pub min_points: usize,
}

pub fn read_config(path: &str) -> RunResult<PipelineConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
    let config: PipelineConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(config)
}

pub fn read_summary(path: String) -> RunResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu {})?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

/// Checks the configuration tokens and maps them to the typed pipeline
/// settings, starting from the defaults for every omitted field.
pub fn validate_config(config: &PipelineConfig) -> RunResult<(PipelineOptions, ViewConfig)> {
    let mut options = PipelineOptions::default();
    let mut view = ViewConfig::default();

    if let Some(data) = &config.data_settings {
        if let Some(min_population) = data.min_population {
            options.min_population = min_population;
        }
        if let Some(excluded) = &data.excluded_countries {
            options.excluded_countries = excluded.clone();
        }
        if let Some(rounding) = &data.rounding {
            let mut pairs: Vec<(String, u32)> = rounding
                .iter()
                .map(|(col, decimals)| (col.clone(), *decimals))
                .collect();
            pairs.sort();
            options.rounding = pairs;
        }
    }

    if let Some(settings) = &config.view_settings {
        if let Some(display) = &settings.data_display {
            let (y_token, x_token) = match display.split_once('_') {
                Some(pair) => pair,
                None => whatever!("Cannot use dataDisplay {:?}: expected a '{{y}}_{{x}}' pair", display),
            };
            view.y_metric = match Metric::parse(y_token) {
                Ok(m) => m,
                Err(e) => whatever!("Cannot use dataDisplay {:?}: {}", display, e),
            };
            view.x_metric = match Metric::parse(x_token) {
                Ok(m) => m,
                Err(e) => whatever!("Cannot use dataDisplay {:?}: {}", display, e),
            };
        }
        if let Some(scale) = &settings.scale {
            view.scale = match Scale::parse(scale) {
                Ok(s) => s,
                Err(e) => whatever!("Cannot use scale {:?}: {}", scale, e),
            };
        }
        if let Some(sort_order) = &settings.sort_order {
            view.sort_order = match SortOrder::parse(sort_order) {
                Ok(s) => s,
                Err(e) => whatever!("Cannot use sortOrder {:?}: {}", sort_order, e),
            };
        }
        if let Some(search_keys) = &settings.search_keys {
            view.search_keys = search_keys.clone();
        }
        if let Some(min_points) = settings.min_points {
            view.min_points = min_points;
        }
    }

    Ok((options, view))
}
