// Entry point and interactive menu.
//
// - Option [1] loads the dataset and prints load diagnostics.
// - Option [2] writes the zone, region, model and planning-impact reports
//   plus summary.json.
// - Option [3] writes forecast series, per-zone and per-metric chart rows.
// - Option [4] re-reads the source into a fresh snapshot.
use clap::Parser;
use log::{error, info};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use zone_forecast::config::load_registry;
use zone_forecast::forecast::{chart_by_metric, chart_by_zone, ForecastSeries, FORECAST_METRICS};
use zone_forecast::{output, reports, util};
use zone_forecast::{Dataset, ForecastOptions, SelectionOptions, ZoneRegistry};

#[derive(Parser, Debug)]
#[command(name = "zone_forecast", about = "Zone infrastructure summaries and forecasts")]
struct Cli {
    /// CSV or JSON source file
    #[arg(short, long, default_value = "delhi_housing_density_and_road_network_extended.csv")]
    input: PathBuf,

    /// Year to summarize (defaults to each zone's latest year)
    #[arg(short, long)]
    year: Option<i32>,

    /// Treat a missing requested year as no data instead of using the zone's latest year
    #[arg(long)]
    no_latest_fallback: bool,

    /// Limit the number of zones in reports
    #[arg(long)]
    max_zones: Option<usize>,

    /// First forecast year
    #[arg(long, default_value_t = 2025)]
    from: i32,

    /// Last forecast year
    #[arg(long, default_value_t = 2035)]
    to: i32,

    /// JSON registry: an array of `{"zone": .., "region": ..}` objects
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Directory for generated files
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,
}

impl Cli {
    fn selection(&self) -> SelectionOptions {
        SelectionOptions {
            year: self.year,
            use_latest_available: !self.no_latest_fallback,
            max_zones: self.max_zones,
        }
    }
}

// The current snapshot. Reload swaps the whole Arc so readers never see a
// half-built dataset.
static APP_STATE: Lazy<Mutex<Option<Arc<Dataset>>>> = Lazy::new(|| Mutex::new(None));

fn current_dataset() -> Option<Arc<Dataset>> {
    APP_STATE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn store_dataset(dataset: Dataset) {
    *APP_STATE.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(dataset));
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Menu (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        io::stdin().read_line(&mut buf).ok();
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_load_report(dataset: &Dataset) {
    let report = &dataset.report;
    println!(
        "Processing dataset... ({} rows read, {} accepted)",
        util::format_int(report.total_rows),
        util::format_int(report.accepted)
    );
    if report.rejected_total() > 0 {
        println!(
            "Note: {} rows skipped due to parse/validation errors.",
            util::format_int(report.rejected_total())
        );
        for (reason, count) in &report.rejected {
            println!("  - {}: {}", reason, util::format_int(*count));
        }
    }
    if report.derived_coverage > 0 {
        println!(
            "Info: {} coverage scores computed from school/hospital figures.",
            util::format_int(report.derived_coverage)
        );
    }
    if report.imputed_fields > 0 {
        println!(
            "Info: {} missing values filled ({} from regional averages).",
            util::format_int(report.imputed_fields),
            util::format_int(report.regionally_imputed)
        );
    }
    println!();
}

/// Handle option [1]: load the source file and keep the snapshot.
fn handle_load(cli: &Cli, registry: &Arc<ZoneRegistry>) {
    match Dataset::load(&cli.input, Arc::clone(registry)) {
        Ok(dataset) => {
            print_load_report(&dataset);
            store_dataset(dataset);
        }
        Err(e) => eprintln!("Failed to load file: {}\n", e),
    }
}

/// Handle option [4]: rebuild the snapshot from the same source.
fn handle_reload() {
    let Some(current) = current_dataset() else {
        println!("Error: No data loaded. Please load the file first (option 1).\n");
        return;
    };
    match current.reload() {
        Ok(fresh) => {
            info!("reloaded {}", fresh.source.display());
            print_load_report(&fresh);
            store_dataset(fresh);
        }
        Err(e) => eprintln!("Reload failed, keeping the previous snapshot: {}\n", e),
    }
}

fn write_or_report<F>(path: &Path, write: F)
where
    F: FnOnce(&Path) -> zone_forecast::Result<()>,
{
    if let Err(e) = write(path) {
        error!("write to {} failed: {}", path.display(), e);
        eprintln!("Write error: {}", e);
    }
}

/// Handle option [2]: write the report tables and summary.json.
fn handle_generate_reports(cli: &Cli) {
    let Some(dataset) = current_dataset() else {
        println!("Error: No data loaded. Please load the file first (option 1).\n");
        return;
    };
    let summaries = dataset.summaries(&cli.selection());

    println!("Generating reports...\n");

    let zones = reports::zone_rows(&summaries);
    let file1 = cli.out_dir.join("report1_zone_summary.csv");
    write_or_report(&file1, |p| output::write_csv(p, &zones));
    println!("Report 1: Zone Infrastructure Summary\n");
    output::preview_table_rows(&zones, 3);
    println!("(Full table exported to {})\n", file1.display());

    let regions = reports::region_rows(&summaries);
    let file2 = cli.out_dir.join("report2_region_summary.csv");
    write_or_report(&file2, |p| output::write_csv(p, &regions));
    println!("Report 2: Regional Infrastructure Summary\n");
    output::preview_table_rows(&regions, 3);
    println!("(Full table exported to {})\n", file2.display());

    let models = reports::model_rows(&dataset.models);
    let file3 = cli.out_dir.join("report3_model_accuracy.csv");
    write_or_report(&file3, |p| output::write_csv(p, &models));
    println!("Report 3: Trend Model Accuracy\n");
    output::preview_table_rows(&models, models.len());
    println!("(Full table exported to {})\n", file3.display());

    let impact = reports::impact_rows(&summaries);
    let file4 = cli.out_dir.join("report4_planning_impact.csv");
    write_or_report(&file4, |p| output::write_csv(p, &impact));
    println!("Report 4: Planning Impact (Before / After)\n");
    output::preview_table_rows(&impact, 3);
    println!("(Full table exported to {})\n", file4.display());

    let summary = reports::generate_summary(&dataset, &summaries);
    let file5 = cli.out_dir.join("summary.json");
    write_or_report(&file5, |p| output::write_json(p, &summary));
    println!("Summary Stats ({}):", file5.display());
    println!(
        "{{\"zones\": {}, \"estimated_zones\": {}, \"urban_green_balance_index\": {}}}\n",
        summary.zones,
        summary.estimated_zones,
        util::format_number(summary.urban_green_balance_index, 1)
    );
}

/// Handle option [3]: forecast every modelled metric for every zone.
fn handle_generate_forecasts(cli: &Cli) {
    let Some(dataset) = current_dataset() else {
        println!("Error: No data loaded. Please load the file first (option 1).\n");
        return;
    };
    let selection = cli.selection();
    let options = ForecastOptions::new(cli.from, cli.to);
    let summaries = dataset.summaries(&selection);

    println!("Generating forecasts {}-{}...\n", cli.from, cli.to);

    let mut all_series: Vec<ForecastSeries> = Vec::new();
    let mut charts = serde_json::Map::new();
    for summary in &summaries {
        let series: Vec<ForecastSeries> = FORECAST_METRICS
            .iter()
            .filter_map(|m| dataset.forecast(&summary.zone, *m, &selection, &options))
            .collect();
        charts.insert(
            summary.zone.clone(),
            serde_json::Value::Array(chart_by_metric(&series)),
        );
        all_series.extend(series);
    }

    let rows = reports::forecast_rows(&all_series);
    let file1 = cli.out_dir.join("forecast_series.csv");
    write_or_report(&file1, |p| output::write_csv(p, &rows));
    println!("Forecast Series\n");
    output::preview_table_rows(&rows, 5);
    println!("(Full table exported to {})\n", file1.display());

    let file2 = cli.out_dir.join("forecast_charts.json");
    write_or_report(&file2, |p| output::write_json(p, &charts));
    println!(
        "Chart rows for {} zones exported to {}",
        util::format_int(charts.len()),
        file2.display()
    );

    let mut by_metric = serde_json::Map::new();
    for metric in FORECAST_METRICS {
        let series: Vec<ForecastSeries> = all_series
            .iter()
            .filter(|s| s.metric == metric)
            .cloned()
            .collect();
        by_metric.insert(
            metric.key().to_string(),
            serde_json::Value::Array(chart_by_zone(&series)),
        );
    }
    let file3 = cli.out_dir.join("forecast_metric_charts.json");
    write_or_report(&file3, |p| output::write_json(p, &by_metric));
    println!(
        "Cross-zone chart rows for {} metrics exported to {}\n",
        util::format_int(by_metric.len()),
        file3.display()
    );
}

fn main() {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let registry = match load_registry(cli.registry.as_deref()) {
        Ok(r) => Arc::new(r),
        Err(e) => {
            eprintln!("Failed to load registry: {}", e);
            std::process::exit(1);
        }
    };

    loop {
        println!("Select Action:");
        println!("[1] Load the file");
        println!("[2] Generate Reports");
        println!("[3] Generate Forecasts");
        println!("[4] Reload Data\n");
        match read_choice().as_str() {
            "1" => handle_load(&cli, &registry),
            choice @ ("2" | "3") => {
                println!();
                if choice == "2" {
                    handle_generate_reports(&cli);
                } else {
                    handle_generate_forecasts(&cli);
                }
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "4" => handle_reload(),
            _ => println!("Invalid choice. Please enter 1, 2, 3 or 4.\n"),
        }
    }
}
