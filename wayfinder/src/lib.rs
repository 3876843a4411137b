// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    ExploreOverrides, InitSummary, create_configuration_assets, load_urls_from_file,
    load_urls_from_source, parse_url_line, resolve_config,
};

pub use wayfinder_core::crawl::{ExploreOptions, execute_exploration, extract_url_path};
