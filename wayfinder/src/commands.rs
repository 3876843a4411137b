use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;
use wayfinder::handlers::{DEFAULT_CONFIG_DIR, DEFAULT_DB_PATH};

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("wayfinder")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("wayfinder")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log debug output to stderr (RUST_LOG is used otherwise)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Creates the wayfinder config directory, a default config.toml and the run database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the wayfinder config directory")
                        .default_value(DEFAULT_CONFIG_DIR),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite an existing config.toml and database without asking")
                        .required(false),
                ),
        )
        .subcommand(
            command!("explore")
                .about(
                    "Discover the sections and pages reachable from one or more entry points, \
                recording every action in the ledger.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(false)
                        .help("Entry point to start from")
                        .value_parser(clap::value_parser!(Url))
                        .conflicts_with("hosts-file"),
                )
                .arg(
                    arg!(-H --"hosts-file" <PATH>)
                        .required(false)
                        .help("Path to a newline-delimited file of entry points, tried in order")
                        .value_parser(clap::value_parser!(std::path::PathBuf))
                        .conflicts_with("url"),
                )
                .arg(
                    arg!(-c --"config" <PATH>)
                        .required(false)
                        .help("TOML configuration file; flags below override its values"),
                )
                .arg(
                    arg!(--"max-depth" <N>)
                        .required(false)
                        .help("Maximum expansion depth below an entry point")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"max-breadth" <N>)
                        .required(false)
                        .help("Maximum candidates taken from any one resource")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"timeout-ms" <MS>)
                        .required(false)
                        .help("Per-action timeout in milliseconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"vocabulary" <TERMS>)
                        .required(false)
                        .help("Comma-separated section terms, e.g. client,task,invoice")
                        .value_delimiter(','),
                )
                .arg(
                    arg!(--"max-errors" <N>)
                        .required(false)
                        .help("Stop the run after this many ERROR ledger entries")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"time-budget" <SECONDS>)
                        .required(false)
                        .help("Stop the run after this many seconds")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(--"cross-origin")
                        .required(false)
                        .help("Follow links to other hosts (default: same origin only)")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"ledger" <PATH>)
                        .required(false)
                        .help("Also append every ledger entry to this JSONL file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Run database")
                        .default_value(DEFAULT_DB_PATH),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown, csv")
                        .value_parser(["text", "json", "markdown", "csv"])
                        .default_value("text"),
                ),
        )
        .subcommand(
            command!("report")
                .about("Render a report for a stored run, or list stored runs")
                .arg(
                    arg!(-r --"run" <ID>)
                        .required(false)
                        .help("Run ID to report on (omit to list runs)"),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Run database")
                        .default_value(DEFAULT_DB_PATH),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, markdown, csv")
                        .value_parser(["text", "json", "markdown", "csv"])
                        .default_value("text"),
                ),
        )
}
