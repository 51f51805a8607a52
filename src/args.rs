use clap::Parser;

/// Tabulation program for the Good Government country indicator dataset.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The CSV file with the country-year indicator table. The header row must
    /// contain at least: country, iso3c, iso2c, region, sub-region, year, population,
    /// hdi, gdp_per_cap, gni_per_cap, efree, gini. Missing values are spelled NA.
    #[clap(short, long, value_parser)]
    pub input: String,

    /// (file path, optional) A JSON file with the pipeline and view configuration
    /// (metric pair, scale, sort order, search selection, population cutoff, ...).
    /// Every field is optional; see the documentation for the accepted tokens.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, goodgov will
    /// check that the computed summary matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the processed
    /// dataset will be written in JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// If passed as an argument, applies the narrow-viewport policy: the displayed
    /// groups are capped in total, or per region when sorting by region.
    #[clap(long, takes_value = false)]
    pub narrow: bool,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
