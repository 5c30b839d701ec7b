//! Subcommand implementations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use snafu::ResultExt;
use tapeindex_core::error::{IoResultExt, ReportSerializeSnafu};
use tapeindex_core::render::{self, RenderContext};
use tapeindex_core::{
    CommandRunner, CorrelationReport, Correlator, Dialect, DiscoveryConfig, Inventory, Result,
    Settle, ShellExecutor, ThreadSleep, inventory, platform,
};
use tracing::{error, info, warn};

const PROGRAM: &str = "tapeindex";
const VERSION: &str = env!("CARGO_PKG_VERSION");
const LOG_FILE_NAME: &str = "tapeindex.log";
const RULE_WIDTH: usize = 80;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Directory for this run's output, `<tmp>/tapeindex_<stamp>` unless
/// configured.
fn work_dir(config: &DiscoveryConfig, stamp: &str) -> PathBuf {
    config
        .work_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join(format!("{PROGRAM}_{stamp}")))
}

fn resolve_dialect(config: &DiscoveryConfig, shell: &mut ShellExecutor) -> Result<Dialect> {
    match config.dialect {
        Some(dialect) => {
            info!("- Using configured drive status dialect '{}'", dialect);
            Ok(dialect)
        }
        None => {
            let dialect = platform::detect_dialect(shell, &config.mt)?;
            info!("- Detected drive status dialect '{}'", dialect);
            Ok(dialect)
        }
    }
}

/// Runs the full discovery and writes the resource files.
pub fn discover(config: &DiscoveryConfig) -> Result<()> {
    let stamp = Local::now().format("%Y%m%d%H%M%S").to_string();
    let work_dir = work_dir(config, &stamp);
    fs::create_dir_all(&work_dir).work_dir_context(&work_dir)?;

    let log_file = work_dir.join(LOG_FILE_NAME);
    crate::logging::init(config.debug, Some(&log_file))?;

    info!("{}", rule());
    info!("[ Starting {} v{} ]", PROGRAM, VERSION);
    info!("- Work directory: {}", work_dir.display());
    info!("- Logging to file: {}", log_file.display());
    info!("{}", rule());

    run_discovery(config, &stamp, &work_dir).inspect_err(|e| error!("{}", e))
}

fn run_discovery(config: &DiscoveryConfig, stamp: &str, work_dir: &Path) -> Result<()> {
    let mut shell = ShellExecutor::with_escalation(config.escalation);
    let dialect = resolve_dialect(config, &mut shell)?;

    let found = inventory::scan(&mut shell, &config.lsscsi, &config.by_id_dir)?;

    let mut settle = ThreadSleep;
    correlate_and_write(&mut shell, &mut settle, config, dialect, &found, stamp, work_dir)?;
    Ok(())
}

/// Correlates the inventory, then writes the resources and the JSON report.
///
/// Runs even without libraries, so every drive still ends up listed as
/// standalone.
fn correlate_and_write<R: CommandRunner, S: Settle>(
    runner: &mut R,
    settle: &mut S,
    config: &DiscoveryConfig,
    dialect: Dialect,
    found: &Inventory,
    stamp: &str,
    work_dir: &Path,
) -> Result<CorrelationReport> {
    let libraries = found.library_ids();
    if libraries.is_empty() {
        warn!("No tape library with a persistent identifier was found, every drive is standalone");
    }
    if !config.skip_libraries.is_empty() {
        info!("- Libraries to skip: {}", config.skip_libraries.join(", "));
    }

    let report = Correlator::new(runner, settle, config, dialect)
        .run(&libraries, &found.drive_ids())?
        .with_unresolved(found.unresolved());

    info!("{}", rule());
    for line in render::render_summary(&report, &config.by_id_dir).lines() {
        info!("{}", line);
    }
    info!("{}", rule());

    info!("Generating Bacula resource configuration files for each library found with drives");
    let context = RenderContext::from_config(config, render::created_by(PROGRAM, VERSION, stamp));
    let rendered = render::render_report(&report, &context);
    for resources in &rendered {
        info!("- Library resources: {}", resources.autochanger_name);
        resources.write_to(work_dir)?;
    }

    let report_path = render::write_report(work_dir, &report)?;
    info!("- Wrote correlation report {}", report_path.display());

    info!("{}", rule());
    for line in render::render_reminder(work_dir, &rendered).lines() {
        info!("{}", line);
    }
    info!("{}", rule());

    Ok(report)
}

/// Lists libraries and drives without moving any media.
pub fn inventory(config: &DiscoveryConfig, json: bool) -> Result<()> {
    crate::logging::init(config.debug, None)?;

    let mut shell = ShellExecutor::with_escalation(config.escalation);
    let found = inventory::scan(&mut shell, &config.lsscsi, &config.by_id_dir)?;

    if json {
        let text = serde_json::to_string_pretty(&found).context(ReportSerializeSnafu)?;
        println!("{text}");
    } else {
        print_inventory(&found, config);
    }
    Ok(())
}

fn print_inventory(found: &Inventory, config: &DiscoveryConfig) {
    println!("Libraries:");
    for lib in &found.libraries {
        let id = lib.stable_id.as_deref().unwrap_or("(no by-id node)");
        let note = if config.is_skipped(id) { "  [skipped]" } else { "" };
        println!("  {:<6} {}{}", lib.node, id, note);
    }
    println!("Drives:");
    for drive in &found.drives {
        println!(
            "  {:<6} {}",
            drive.node,
            drive.stable_id.as_deref().unwrap_or("(no by-id node)")
        );
    }
}
