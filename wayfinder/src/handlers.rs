use anyhow::{Context, Result, bail};
use clap::ArgMatches;
use clap::parser::ValueSource;
use colored::Colorize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;
use tracing::warn;
use url::Url;
use wayfinder_core::config::{ConfigLoader, DEFAULT_CONFIG, ExploreConfig};
use wayfinder_core::crawl::{ExploreOptions, execute_exploration, generate_run_summary};
use wayfinder_core::data::Database;
use wayfinder_core::report::{
    ReportData, ReportFormat, gather_report_data, generate_report, save_report,
};
use wayfinder_scanner::ScanError;

pub const DEFAULT_CONFIG_DIR: &str = "~/.config/wayfinder/";
pub const DEFAULT_DB_PATH: &str = "~/.config/wayfinder/wayfinder.db";

// Helper functions for the explore handler

/// Load entry points from either a file or a single URL argument
pub fn load_urls_from_source(
    url: Option<&Url>,
    hosts_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if let Some(url) = url {
        Ok(vec![url.as_str().to_string()])
    } else {
        Err("Either --url, --hosts-file or entry_points in --config must be provided".to_string())
    }
}

/// Load and parse entry points from a file. Lines starting with `#` are skipped.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.host_str().is_some_and(|h| !h.contains(' '))
    {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Values given on the command line that replace those from the config file.
#[derive(Debug, Default, Clone)]
pub struct ExploreOverrides {
    pub entry_points: Option<Vec<String>>,
    pub max_depth: Option<usize>,
    pub max_breadth: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub vocabulary: Option<Vec<String>>,
    pub max_errors: Option<usize>,
    pub time_budget_secs: Option<u64>,
    pub cross_origin: bool,
}

impl ExploreOverrides {
    pub fn from_matches(args: &ArgMatches) -> Result<Self, String> {
        let url = args.get_one::<Url>("url");
        let hosts_file = args.get_one::<PathBuf>("hosts-file");
        let entry_points = if url.is_some() || hosts_file.is_some() {
            Some(load_urls_from_source(url, hosts_file)?)
        } else {
            None
        };

        Ok(Self {
            entry_points,
            max_depth: args.get_one::<usize>("max-depth").copied(),
            max_breadth: args.get_one::<usize>("max-breadth").copied(),
            timeout_ms: args.get_one::<u64>("timeout-ms").copied(),
            vocabulary: args
                .get_many::<String>("vocabulary")
                .map(|terms| terms.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()),
            max_errors: args.get_one::<usize>("max-errors").copied(),
            time_budget_secs: args.get_one::<u64>("time-budget").copied(),
            cross_origin: args.get_flag("cross-origin"),
        })
    }

    pub fn apply(self, config: &mut ExploreConfig) {
        if let Some(entry_points) = self.entry_points {
            config.entry_points = entry_points;
        }
        if let Some(max_depth) = self.max_depth {
            config.max_depth = max_depth;
        }
        if let Some(max_breadth) = self.max_breadth {
            config.max_breadth = max_breadth;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(vocabulary) = self.vocabulary {
            config.vocabulary = vocabulary;
        }
        if self.max_errors.is_some() {
            config.max_errors = self.max_errors;
        }
        if self.time_budget_secs.is_some() {
            config.time_budget_secs = self.time_budget_secs;
        }
        if self.cross_origin {
            config.same_origin_only = false;
        }
    }
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

/// What `init` left on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitSummary {
    pub config_path: PathBuf,
    pub db_path: PathBuf,
    pub config_written: bool,
    pub db_replaced: bool,
}

/// Creates the config directory, `config.toml` and the run database. Existing
/// files are kept unless `overwrite` is set.
pub fn create_configuration_assets(config_dir: &Path, overwrite: bool) -> Result<InitSummary> {
    fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create config directory {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    let config_written = overwrite || !config_path.exists();
    if config_written {
        fs::write(&config_path, DEFAULT_CONFIG)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let db_path = config_dir.join("wayfinder.db");
    let db_replaced = overwrite && Database::exists(&db_path);
    if db_replaced {
        Database::remove(&db_path)
            .with_context(|| format!("Failed to remove existing database {}", db_path.display()))?;
    }
    Database::new(&db_path)
        .with_context(|| format!("Failed to create database {}", db_path.display()))?;

    Ok(InitSummary {
        config_path,
        db_path,
        config_written,
        db_replaced,
    })
}

pub fn handle_init(args: &ArgMatches) -> Result<ExitCode> {
    print_divider();
    println!("{}", "  WAYFINDER INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let dir = args
        .get_one::<String>("PATH")
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_DIR);
    let force = args.get_flag("force");
    let config_dir = ConfigLoader::expand_path(dir);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    let config_exists = config_dir.join("config.toml").exists();
    let db_exists = Database::exists(&config_dir.join("wayfinder.db"));

    let mut overwrite = force;
    if (config_exists || db_exists) && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("Existing wayfinder files found in {}", config_dir.display());
        let response = print_prompt("Overwrite config.toml and the database? [y/N]:")?;
        println!();
        overwrite = response == "y" || response == "yes";
        if !overwrite {
            println!("{} Keeping existing files", "→".blue());
        }
    }

    let summary = create_configuration_assets(&config_dir, overwrite)?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config: {}{}",
        "✓".green().bold(),
        summary.config_path.display().to_string().bright_white(),
        if summary.config_written { "" } else { " (kept)" }
    );
    println!(
        "{} Database: {}{}",
        "✓".green().bold(),
        summary.db_path.display().to_string().bright_white(),
        if summary.db_replaced { " (recreated)" } else { "" }
    );
    println!();
    println!(
        "{} Add entry points to the config, then run {}",
        "ℹ".blue(),
        format!("wayfinder explore -c {}", summary.config_path.display()).cyan()
    );
    println!();

    Ok(ExitCode::SUCCESS)
}

/// Loads the config file when one is given, then applies command-line overrides.
pub fn resolve_config(
    config_path: Option<&str>,
    overrides: ExploreOverrides,
) -> Result<ExploreConfig, ScanError> {
    let mut config = match config_path {
        Some(path) => ConfigLoader::load(&ConfigLoader::expand_path(path))?,
        None => ExploreConfig::default(),
    };
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn print_or_save(content: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            save_report(content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!(
                "{} Report saved to {}",
                "✓".green().bold(),
                path.display().to_string().bright_white()
            );
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn report_format(args: &ArgMatches) -> Result<ReportFormat> {
    let name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    ReportFormat::from_str(name).map_err(anyhow::Error::msg)
}

pub async fn handle_explore(args: &ArgMatches) -> Result<ExitCode> {
    let overrides = match ExploreOverrides::from_matches(args) {
        Ok(overrides) => overrides,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            return Ok(ExitCode::FAILURE);
        }
    };
    let config_path = args.get_one::<String>("config").map(String::as_str);

    let config = match resolve_config(config_path, overrides) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let db_path = args
        .get_one::<String>("db")
        .map(|p| ConfigLoader::expand_path(p));
    let ledger_path = args.get_one::<PathBuf>("ledger").cloned();
    let format = report_format(args)?;
    let output = args.get_one::<PathBuf>("output");
    let quiet = args.get_flag("quiet");

    if !quiet {
        println!("\n🧭 Exploring {} entry point(s)", config.entry_points.len());
        println!("Max depth: {}", config.max_depth);
        println!("Max breadth: {}", config.max_breadth);
        println!("Action timeout: {}ms", config.timeout_ms);
        println!(
            "Origin: {}",
            if config.same_origin_only {
                "same origin only"
            } else {
                "cross-origin allowed"
            }
        );
        if let Some(path) = &db_path {
            println!("Database: {}", path.display());
        }
        println!();
    }

    let options = ExploreOptions {
        config,
        db_path,
        ledger_path,
        show_progress_bar: !quiet,
    };

    let report = match execute_exploration(options, None).await {
        Ok(report) => report,
        Err(e @ (ScanError::Configuration(_) | ScanError::InvalidUrl(_))) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => return Err(e).context("Exploration failed"),
    };

    print!("{}", generate_run_summary(&report));

    let explicit_format = args.value_source("format") == Some(ValueSource::CommandLine);
    if output.is_some() || explicit_format {
        let data = ReportData::from_run(&report);
        let content = generate_report(&data, format).context("Failed to render report")?;
        print_or_save(&content, output)?;
    }

    if report.is_failure() {
        eprintln!(
            "{} Run ended with status {}",
            "✗".red().bold(),
            report.status.to_string().red()
        );
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn handle_report(args: &ArgMatches) -> Result<ExitCode> {
    let db_path = args
        .get_one::<String>("db")
        .map(|p| ConfigLoader::expand_path(p))
        .unwrap_or_else(|| ConfigLoader::expand_path(DEFAULT_DB_PATH));
    if !Database::exists(&db_path) {
        bail!(
            "No database at {}; run `wayfinder init` or `wayfinder explore` first",
            db_path.display()
        );
    }
    let db = Database::new(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let Some(run_id) = args.get_one::<String>("run") else {
        let runs = db.list_runs().context("Failed to list runs")?;
        if runs.is_empty() {
            println!("No runs recorded in {}", db_path.display());
        }
        for run in runs {
            println!(
                "{}  {:<16} {}",
                run.id.bright_white(),
                run.status.to_string(),
                run.entry_points.join(", ").dimmed()
            );
        }
        return Ok(ExitCode::SUCCESS);
    };

    let data = gather_report_data(&db, run_id)
        .with_context(|| format!("Run {} not found in {}", run_id, db_path.display()))?;
    let content = generate_report(&data, report_format(args)?).context("Failed to render report")?;
    print_or_save(&content, args.get_one::<PathBuf>("output"))?;

    Ok(ExitCode::SUCCESS)
}
