use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use url::Url;
use wayfinder::handlers::*;
use wayfinder_core::config::ConfigLoader;
use wayfinder_core::data::Database;
use wayfinder_scanner::ScanError;

// ============================================================================
// Entry Point Loading
// ============================================================================

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://app.example.com/dashboard");
    assert_eq!(result, Some("https://app.example.com/dashboard".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    assert_eq!(
        parse_url_line("app.example.com"),
        Some("https://app.example.com".to_string())
    );
    assert_eq!(
        parse_url_line("localhost:3000"),
        Some("https://localhost:3000".to_string())
    );
}

#[test]
fn test_parse_url_line_invalid() {
    let result = parse_url_line("not a valid url!!!");
    assert_eq!(result, None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://app.example.com/dashboard")?;
    writeln!(temp_file, "# fallback when the dashboard is down")?;
    writeln!(temp_file, "app.example.com/home")?;
    writeln!(temp_file)?; // Empty line

    let path = PathBuf::from(temp_file.path());
    let urls = load_urls_from_file(&path)?;

    assert_eq!(
        urls,
        vec![
            "https://app.example.com/dashboard".to_string(),
            "https://app.example.com/home".to_string(),
        ]
    );
    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let path = PathBuf::from(temp_file.path());
    let result = load_urls_from_file(&path);

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_source_single_url() {
    let url = Url::parse("https://app.example.com").unwrap();
    let result = load_urls_from_source(Some(&url), None).unwrap();

    assert_eq!(result, vec!["https://app.example.com/".to_string()]);
}

#[test]
fn test_load_urls_from_source_no_input() {
    let result = load_urls_from_source(None, None);
    assert!(result.is_err());
}

// ============================================================================
// Configuration Resolution
// ============================================================================

#[test]
fn test_overrides_replace_file_values() {
    let mut config_file = NamedTempFile::new().unwrap();
    writeln!(config_file, "entry_points = [\"https://app.example.com/\"]").unwrap();
    writeln!(config_file, "max_depth = 4").unwrap();
    writeln!(config_file, "max_breadth = 9").unwrap();

    let overrides = ExploreOverrides {
        max_depth: Some(1),
        vocabulary: Some(vec!["client".to_string()]),
        max_errors: Some(3),
        cross_origin: true,
        ..ExploreOverrides::default()
    };
    let path = config_file.path().to_string_lossy().to_string();
    let config = resolve_config(Some(&path), overrides).unwrap();

    assert_eq!(config.max_depth, 1);
    assert_eq!(config.max_breadth, 9);
    assert_eq!(config.vocabulary, vec!["client"]);
    assert_eq!(config.max_errors, Some(3));
    assert!(!config.same_origin_only);
}

#[test]
fn test_entry_points_from_command_line() {
    let overrides = ExploreOverrides {
        entry_points: Some(vec!["https://app.example.com/".to_string()]),
        ..ExploreOverrides::default()
    };
    let config = resolve_config(None, overrides).unwrap();
    assert_eq!(config.entry_points, vec!["https://app.example.com/"]);
}

#[test]
fn test_missing_entry_points_is_configuration_error() {
    let result = resolve_config(None, ExploreOverrides::default());
    assert!(matches!(result, Err(ScanError::Configuration(_))));
}

#[test]
fn test_zero_timeout_override_is_rejected() {
    let overrides = ExploreOverrides {
        entry_points: Some(vec!["https://app.example.com/".to_string()]),
        timeout_ms: Some(0),
        ..ExploreOverrides::default()
    };
    assert!(matches!(
        resolve_config(None, overrides),
        Err(ScanError::Configuration(_))
    ));
}

// ============================================================================
// Initialization
// ============================================================================

#[test]
fn test_create_configuration_assets() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join("wayfinder");

    let summary = create_configuration_assets(&config_dir, false).unwrap();

    assert!(summary.config_written);
    assert!(!summary.db_replaced);
    assert!(Database::exists(&summary.db_path));
    let config = ConfigLoader::load(&summary.config_path).unwrap();
    assert_eq!(config.max_errors, Some(50));
}

#[test]
fn test_existing_config_is_kept_without_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().to_path_buf();
    std::fs::write(config_dir.join("config.toml"), "max_depth = 7\n").unwrap();

    let summary = create_configuration_assets(&config_dir, false).unwrap();

    assert!(!summary.config_written);
    assert_eq!(
        std::fs::read_to_string(&summary.config_path).unwrap(),
        "max_depth = 7\n"
    );
}

#[test]
fn test_overwrite_recreates_database() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().to_path_buf();

    let first = create_configuration_assets(&config_dir, false).unwrap();
    let db = Database::new(&first.db_path).unwrap();
    db.create_run(&["https://app.example.com/".to_string()], None)
        .unwrap();
    drop(db);

    let second = create_configuration_assets(&config_dir, true).unwrap();
    assert!(second.config_written);
    assert!(second.db_replaced);
    let db = Database::new(&second.db_path).unwrap();
    assert!(db.list_runs().unwrap().is_empty());
}
