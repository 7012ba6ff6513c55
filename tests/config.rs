//! Configuration Integration Tests
//!
//! Discovery through the environment and validation of YAML files.

use std::time::Duration;

use evidence_lens::adapters::RemotePhase;
use evidence_lens::config::{self, AnalyzerConfig, CONFIG_PATH_ENV};
use evidence_lens::domain::Credibility;
use tempfile::TempDir;

#[test]
fn test_explicit_config_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("analyzer.yaml");
    std::fs::write(
        &path,
        r#"
limits:
  max_total_bytes: 104857600
remote:
  timeout_seconds: 30
credibility:
  default: low
"#,
    )
    .unwrap();

    std::env::set_var(CONFIG_PATH_ENV, &path);
    let resolved = config::reload_config().unwrap();
    std::env::remove_var(CONFIG_PATH_ENV);

    assert_eq!(resolved.config_file.as_deref(), Some(path.as_path()));
    let settings = resolved.settings;
    assert_eq!(settings.limits.max_total_bytes, 100 * 1024 * 1024);
    assert_eq!(settings.limits.max_file_bytes, 20 * 1024 * 1024);
    assert_eq!(settings.remote.timeout(), Duration::from_secs(30));
    // Default rules kept, default rank overridden
    assert_eq!(settings.credibility.rank("unlabelled.bin"), Credibility::Low);
    assert_eq!(settings.credibility.rank("badge_access_log.csv"), Credibility::VeryHigh);
}

#[test]
fn test_invalid_values_rejected() {
    for yaml in [
        "limits:\n  min_files: 1\n",
        "limits:\n  max_file_bytes: 0\n",
        "remote:\n  timeout_seconds: 0\n",
        "remote:\n  retry:\n    max_attempts: 0\n",
        "limits: [not, a, map]\n",
    ] {
        assert!(AnalyzerConfig::from_yaml(yaml).is_err(), "accepted: {yaml}");
    }
}

#[test]
fn test_missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = config::load_config_file(&temp.path().join("absent.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("absent.yaml"));
}

#[test]
fn test_models_per_phase() {
    let config = AnalyzerConfig::from_yaml("remote:\n  extraction_model: flash-test\n").unwrap();
    assert!(config
        .remote
        .endpoint_for(RemotePhase::Extraction)
        .ends_with("/flash-test:generateContent"));
    assert_eq!(config.remote.model_for(RemotePhase::Reasoning), "gemini-3-pro-preview");
}
