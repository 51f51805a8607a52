use log::{info, warn};

use gov_indicators::*;
use snafu::{prelude::*, Snafu};

use std::fs;

use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod config_reader;
pub mod format;
pub mod io_csv;

use crate::args::Args;
use crate::run::config_reader::*;
use crate::run::format::format_number;

#[derive(Debug, Snafu)]
pub enum RunError {
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading the CSV header row"))]
    CsvHeader { source: csv::Error },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display(""))]
    OpeningJson { source: std::io::Error },
    #[snafu(display(""))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error writing the summary file"))]
    WritingSummary { source: std::io::Error },
    #[snafu(display("Pipeline failure: {source}"))]
    Pipeline { source: PipelineError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type RunResult<T> = Result<T, RunError>;

fn sort_token(sort_order: SortOrder) -> String {
    match sort_order {
        SortOrder::By(m) => m.id().to_string(),
        SortOrder::Region => "region".to_string(),
        SortOrder::Alphabetical => "alpha".to_string(),
    }
}

fn scale_token(scale: Scale) -> &'static str {
    match scale {
        Scale::Global => "global",
        Scale::Local => "local",
    }
}

fn groups_to_json(shown: &[Group]) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for g in shown.iter() {
        // Non-finite aggregates serialize as null, the JSON spelling of
        // "no data" for that dimension.
        let mut aggregates = serde_json::Map::new();
        for m in Metric::ALL {
            aggregates.insert(m.id().to_string(), json!(g.aggregates.sortable(m)));
        }
        l.push(json!({
            "country": g.key,
            "region": g.region,
            "points": g.values_filter.len(),
            "meanX": g.mean_x,
            "meanY": g.mean_y,
            "aggregates": aggregates,
        }));
    }
    l
}

fn build_summary_js(dataset: &Dataset, shown: &[Group], view: &ViewConfig) -> JSValue {
    let c = OutputView {
        x_metric: view.x_metric.id().to_string(),
        y_metric: view.y_metric.id().to_string(),
        scale: scale_token(view.scale).to_string(),
        sort_order: sort_token(view.sort_order),
        min_points: view.min_points,
    };
    json!({
        "config": c,
        "records": dataset.records.len(),
        "countries": dataset.groups.len(),
        "groups": groups_to_json(shown),
    })
}

fn print_leading_groups(shown: &[Group], view: &ViewConfig) {
    info!(
        "Displaying {} groups, {} vs {} ({} scale)",
        shown.len(),
        view.y_metric.label(),
        view.x_metric.label(),
        scale_token(view.scale)
    );
    for (idx, g) in shown.iter().take(10).enumerate() {
        info!(
            "{:>3} {} ({}): {} points, GDP per capita up to {}",
            idx + 1,
            g.key,
            g.region,
            g.values_filter.len(),
            format_number(g.aggregates.gdp_max, false)
        );
    }
}

pub fn run_pipeline(args: &Args) -> RunResult<()> {
    let file_config = match &args.config {
        Some(path) => read_config(path)?,
        None => PipelineConfig::default(),
    };
    info!("config: {:?}", file_config);
    let (options, mut view) = validate_config(&file_config)?;
    if args.narrow {
        view.narrow = Some(NarrowLimits::DEFAULT);
    }

    let raw = io_csv::read_csv_table(&args.input)?;
    let dataset = process_records(&raw, &options).context(PipelineSnafu {})?;
    let shown = recompute_view(&dataset.groups, &view);

    print_leading_groups(&shown, &view);

    // Assemble the final json
    let summary_js = build_summary_js(&dataset, &shown, &view);
    let pretty_js_summary = serde_json::to_string_pretty(&summary_js).context(ParsingJsonSnafu {})?;
    match args.out.as_deref() {
        None | Some("stdout") => println!("{}", pretty_js_summary),
        Some(path) => fs::write(path, &pretty_js_summary).context(WritingSummarySnafu {})?,
    }

    // The reference summary, if provided for comparison
    if let Some(reference_path) = &args.reference {
        let summary_ref = read_summary(reference_path.clone())?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_summary {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_summary.as_ref(),
                "\n",
            );
            whatever!("Difference detected between computed summary and reference summary")
        }
    }

    Ok(())
}
