//! `income-map` command line.
//!
//! ```bash
//! income-map [--config FILE] [--offline-boundaries FILE --offline-statistics FILE] <COMMAND>
//! ```
//!
//! Commands: `load` (run the pipeline, print the join summary), `series`
//! (print the time series of selected regions), `export` (write the table
//! as CSV and the geometries as GeoJSON) and `verify` (check both sources).

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use income_map_service::config::ENV_CONFIG_PATH;
use income_map_service::ingest::{BoundarySource, StatisticsSource};
use income_map_service::logging::init_logging;
use income_map_service::verify::{print_summary, run_verification};
use income_map_service::{IncomeDataset, IncomePipeline, PipelineConfig};

/// Median household income map data pipeline
#[derive(Parser, Debug)]
#[clap(name = "income-map")]
#[clap(about = "Fetch, optimize and join sub-region boundaries with median income statistics")]
struct Args {
    /// TOML configuration file (built-in defaults when absent)
    #[clap(long, value_name = "FILE", env = ENV_CONFIG_PATH)]
    config: Option<PathBuf>,

    /// Read boundaries from a saved GetFeature response instead of the WFS
    #[clap(long, value_name = "FILE", requires = "offline_statistics")]
    offline_boundaries: Option<PathBuf>,

    /// Read statistics from a saved CSV export instead of PX-Web
    #[clap(long, value_name = "FILE", requires = "offline_boundaries")]
    offline_statistics: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline and print the join summary
    Load {
        /// Number of table rows to preview
        #[clap(long, default_value = "20")]
        preview: usize,
    },
    /// Print the income series of one or more regions
    Series {
        /// Region name (repeatable)
        #[clap(long = "region", value_name = "NAME", required = true)]
        regions: Vec<String>,
    },
    /// Write income_table.csv and income_regions.geojson
    Export {
        #[clap(long, value_name = "DIR", default_value = "export")]
        out_dir: PathBuf,
    },
    /// Check both sources and report reachability and name matching
    Verify {
        /// Also write the report as JSON
        #[clap(long, value_name = "FILE")]
        json: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = PipelineConfig::load(args.config.as_deref()).context("loading configuration")?;
    init_logging(&config.logging).context("initializing logging")?;

    match (&args.offline_boundaries, &args.offline_statistics) {
        (Some(boundaries), Some(statistics)) => {
            info!(stage = "SYS", "offline mode");
            let pipeline = IncomePipeline::offline(config, boundaries, statistics);
            run(&args.command, &pipeline)
        }
        _ => {
            let pipeline = IncomePipeline::live(config).context("building HTTP client")?;
            run(&args.command, &pipeline)
        }
    }
}

fn run<B: BoundarySource, S: StatisticsSource>(command: &Command, pipeline: &IncomePipeline<B, S>) -> Result<()> {
    match command {
        Command::Load { preview } => {
            let dataset = pipeline.load().context("income dataset unavailable")?;
            print_dataset(dataset, *preview);
        }
        Command::Series { regions } => {
            let dataset = pipeline.load().context("income dataset unavailable")?;
            let selected: BTreeSet<String> = regions.iter().cloned().collect();
            let points = dataset.series_for(&selected);
            if points.is_empty() {
                bail!("none of {:?} is a known region", regions);
            }
            for point in points {
                match point.value {
                    Some(v) => println!("{}\t{}\t{:.0}", point.region_name, point.year, v),
                    None => println!("{}\t{}\t-", point.region_name, point.year),
                }
            }
        }
        Command::Export { out_dir } => {
            let dataset = pipeline.load().context("income dataset unavailable")?;
            export(dataset, out_dir)?;
        }
        Command::Verify { json } => {
            let report = run_verification(
                pipeline.boundary_source(),
                pipeline.statistics_source(),
                pipeline.config(),
            );
            print_summary(&report);
            if let Some(path) = json {
                let text = serde_json::to_string_pretty(&report)?;
                fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }
    Ok(())
}

fn print_dataset(dataset: &IncomeDataset, preview: usize) {
    let report = &dataset.report;
    println!(
        "{} regions joined ({} boundaries, {} statistics rows)",
        report.result_rows, report.boundaries_total, report.statistics_total
    );
    println!(
        "unmatched: {} boundaries, {} statistics rows",
        report.unmatched_boundaries, report.unmatched_statistics
    );
    println!("loaded at {}", dataset.loaded_at.to_rfc3339());
    if let Some((lo, hi)) = dataset.value_range() {
        println!("income range: {:.0} to {:.0} EUR", lo, hi);
    }
    println!();

    let Some(&latest) = dataset.years.last() else {
        return;
    };
    println!("{:<32} {:>8}", "region", latest);
    for region in dataset.preview(preview) {
        let value = region
            .value(latest)
            .map(|v| format!("{:.0}", v))
            .unwrap_or_else(|| "-".to_string());
        println!("{:<32} {:>8}", region.region_name, value);
    }
}

fn export(dataset: &IncomeDataset, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let table_path = out_dir.join("income_table.csv");
    let file = File::create(&table_path).with_context(|| format!("creating {}", table_path.display()))?;
    dataset
        .write_table_csv(BufWriter::new(file))
        .with_context(|| format!("writing {}", table_path.display()))?;

    let geo_path = out_dir.join("income_regions.geojson");
    fs::write(&geo_path, dataset.geometry_collection().to_string())
        .with_context(|| format!("writing {}", geo_path.display()))?;

    println!(
        "exported {} regions to {} and {}",
        dataset.len(),
        table_path.display(),
        geo_path.display()
    );
    Ok(())
}
