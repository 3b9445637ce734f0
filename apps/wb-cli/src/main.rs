use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wb_app::{
    get_balance_service, install_balance_service, project_service, query, AppError, AppResult,
    BalanceService,
};
use wb_calc::BalanceResult;
use wb_core::timing;
use wb_results::{InMemoryHistory, JsonHistoryStore, StorageHistoryStore};

#[derive(Parser)]
#[command(name = "wb-cli")]
#[command(about = "WaterBalance CLI - monthly mine-site water balance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a site file and report house-rule violations
    Validate {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
    },
    /// List areas of a site
    Areas {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
    },
    /// Calculate the balance for one month
    Balance {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Bypass the cache and recompute
        #[arg(long)]
        force: bool,
        /// Storage history file (defaults to the site's own history)
        #[arg(long)]
        history: Option<PathBuf>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show KPIs for one month
    Kpi {
        /// Path to the site YAML or JSON file
        site_path: PathBuf,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        month: u32,
        /// Storage history file (defaults to the site's own history)
        #[arg(long)]
        history: Option<PathBuf>,
    },
    /// Print a storage history file
    History {
        /// Path to the history JSON file
        history_path: PathBuf,
    },
    /// Merge monthly measurements from a CSV sheet into a site file
    Import {
        /// Path to the site YAML file
        site_path: PathBuf,
        /// CSV sheet to import
        csv_path: PathBuf,
        /// Write the merged site here instead of over the input
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> AppResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Validate { site_path } => cmd_validate(&site_path),
        Commands::Areas { site_path } => cmd_areas(&site_path),
        Commands::Balance {
            site_path,
            year,
            month,
            force,
            history,
            json,
        } => cmd_balance(&site_path, year, month, force, history, json),
        Commands::Kpi {
            site_path,
            year,
            month,
            history,
        } => cmd_kpi(&site_path, year, month, history),
        Commands::History { history_path } => cmd_history(&history_path),
        Commands::Import {
            site_path,
            csv_path,
            output,
        } => cmd_import(&site_path, &csv_path, output.as_deref()),
    };

    if timing::is_enabled() {
        if let Some(line) = timing::PERIOD_CALCULATIONS.summary("period calculations") {
            eprintln!("[timing] {}", line);
        }
    }
    outcome
}

fn cmd_validate(site_path: &Path) -> AppResult<()> {
    println!("Validating site: {}", site_path.display());
    let project = project_service::load_site(site_path)?;
    let report = project_service::validate_site(&project)?;
    println!(
        "  {} areas, {} structures, {} connections ({} inter-area), {} facilities",
        report.area_count,
        report.structure_count,
        report.connection_count,
        report.transfer_count,
        report.facility_count
    );
    if report.issues.is_empty() {
        println!("✓ Site is valid");
    } else {
        println!("⚠ {} house-rule violation(s):", report.issues.len());
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
    Ok(())
}

fn cmd_areas(site_path: &Path) -> AppResult<()> {
    let project = project_service::load_site(site_path)?;
    let areas = project_service::list_areas(&project)?;

    if areas.is_empty() {
        println!("No areas found in site");
    } else {
        println!("Areas in site:");
        for area in areas {
            println!(
                "  {} - {} ({} structures, {} facilities, {:.0} m³ capacity, {} in / {} out transfers)",
                area.code,
                area.name,
                area.structure_count,
                area.facility_count,
                area.capacity_m3,
                area.transfers_in,
                area.transfers_out
            );
        }
    }
    Ok(())
}

/// Install the shared service for `site_path` and hand it back.
fn open_service(site_path: &Path, history: Option<PathBuf>) -> AppResult<std::sync::Arc<BalanceService>> {
    let site_path = site_path.to_path_buf();
    install_balance_service(move || {
        let project = project_service::load_site(&site_path)?;
        let store: Box<dyn StorageHistoryStore> = match &history {
            Some(path) => Box::new(JsonHistoryStore::open(path.clone())?),
            None if project.options.persist_history => Box::new(JsonHistoryStore::for_site(&site_path)?),
            None => Box::new(InMemoryHistory::new()),
        };
        BalanceService::from_project(&project, store)
    });
    get_balance_service()
}

fn cmd_balance(
    site_path: &Path,
    year: i32,
    month: u32,
    force: bool,
    history: Option<PathBuf>,
    json: bool,
) -> AppResult<()> {
    let service = open_service(site_path, history)?;
    let result = service.calculate_for_date(month, year, force)?;

    if json {
        let text = serde_json::to_string_pretty(&result)
            .map_err(|e| AppError::InvalidInput(format!("Failed to serialize result: {}", e)))?;
        println!("{}", text);
        return Ok(());
    }

    print_balance(&result);
    Ok(())
}

fn print_balance(result: &BalanceResult) {
    let summary = query::summarize(result);
    println!("Water balance - {}", summary.label);
    println!("  Inflows:        {:>14.1} m³", summary.inflow_m3);
    for (name, v) in query::category_rows(&result.inflows) {
        println!("    {:<22} {:>12.1}", name, v);
    }
    println!("  Outflows:       {:>14.1} m³", summary.outflow_m3);
    for (name, v) in query::category_rows(&result.outflows) {
        println!("    {:<22} {:>12.1}", name, v);
    }
    println!(
        "  Storage change: {:>14.1} m³ ({:.1} -> {:.1})",
        summary.storage_delta_m3, result.storage.opening_m3, result.storage.closing_m3
    );
    println!(
        "  Balance error:  {:>14.1} m³ ({:.2}%) [{}]",
        summary.balance_error_m3,
        summary.error_pct,
        summary.status.as_str()
    );

    if !result.areas.is_empty() {
        println!("  Areas:");
        for area in &result.areas {
            println!(
                "    {:<10} in {:>10.1}  out {:>10.1}  Δs {:>10.1}  err {:>8.1} ({:.2}%)",
                area.area_code,
                area.inflow_m3,
                area.outflow_m3,
                area.storage_delta_m3,
                area.balance_error_m3,
                area.error_pct
            );
        }
    }

    if summary.flag_count > 0 {
        println!("  Data quality ({} flag(s)):", summary.flag_count);
        for line in query::flag_lines(result) {
            println!("    {}", line);
        }
    }
    if summary.integrity_issue_count > 0 {
        println!("  House-rule violations:");
        for issue in &result.integrity {
            println!("    - {}", issue);
        }
    }
}

fn cmd_kpi(site_path: &Path, year: i32, month: u32, history: Option<PathBuf>) -> AppResult<()> {
    let service = open_service(site_path, history)?;
    let kpis = service.kpis_for_date(month, year)?;
    let period = wb_core::CalculationPeriod::new(year, month)?;

    println!("KPIs - {}", period.label());
    println!("  Recycled water:      {:>8.2} %", kpis.recycled_pct);
    println!("  Water intensity:     {:>8.4} m³/t", kpis.intensity_m3_per_t);
    println!("  Storage change:      {:>8.2} %", kpis.storage_change_pct);
    match kpis.storage_utilisation_pct {
        Some(pct) => println!("  Storage utilisation: {:>8.2} %", pct),
        None => println!("  Storage utilisation:      n/a"),
    }
    Ok(())
}

fn cmd_history(history_path: &Path) -> AppResult<()> {
    let store = JsonHistoryStore::open(history_path)?;
    let records = store.records()?;

    if records.is_empty() {
        println!("No storage history in {}", history_path.display());
        return Ok(());
    }
    println!(
        "{:<12} {:>7} {:>12} {:>12} {:>12}  source",
        "facility", "period", "opening", "closing", "delta"
    );
    for r in records {
        println!(
            "{:<12} {:>4}-{:02} {:>12.1} {:>12.1} {:>12.1}  {}",
            r.facility_code,
            r.year,
            r.month,
            r.opening_m3,
            r.closing_m3,
            r.delta_m3(),
            r.source.as_str()
        );
    }
    Ok(())
}

fn cmd_import(site_path: &Path, csv_path: &Path, output: Option<&Path>) -> AppResult<()> {
    let mut project = project_service::load_site(site_path)?;
    let months = project_service::import_measurements(&mut project, csv_path)?;
    let target = output.unwrap_or(site_path);
    project_service::save_site(target, &project)?;
    println!("✓ Imported {} month(s) into {}", months, target.display());
    Ok(())
}
