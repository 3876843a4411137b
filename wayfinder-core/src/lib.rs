use colored::Colorize;

pub mod audit;
pub mod config;
pub mod crawl;
pub mod data;
pub mod map;
pub mod report;

pub use config::{ConfigLoader, ExploreConfig};
pub use crawl::{ExplorationReport, ExploreOptions, execute_exploration, explore_document};
pub use data::{Database, RunStatus};

const BANNER: &str = r#"
 __        __          __ _           _
 \ \      / /_ _ _   _/ _(_)_ __   __| | ___ _ __
  \ \ /\ / / _` | | | | |_| | '_ \ / _` |/ _ \ '__|
   \ V  V / (_| | |_| |  _| | | | | (_| |  __/ |
    \_/\_/ \__,_|\__, |_| |_|_| |_|\__,_|\___|_|
                 |___/
"#;

pub fn print_banner() {
    println!("{}", BANNER.cyan());
    println!(
        "  {} {}\n",
        "adaptive navigation discovery".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
