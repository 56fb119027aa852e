// tests/config_files.rs
//
// The shipped mode files parse, and env overrides apply on top of them.

use std::env;
use std::path::Path;

use serial_test::serial;
use urban_watch::config::{Mode, MonitorConfig, ENV_CONFIG_PATH, ENV_LLM_PROVIDER, ENV_MODE};
use urban_watch::sources::SourceManager;
use urban_watch::Source;

#[test]
fn public_safety_file_parses() {
    let cfg = MonitorConfig::load_from(Path::new("config/public_safety.toml")).unwrap();
    assert_eq!(cfg.mode, Mode::PublicSafety);
    assert_eq!(cfg.anomaly_rules.social_media_spike, 10);
    assert_eq!(cfg.anomaly_rules.threshold("noise_level"), Some(80.0));
    assert_eq!(cfg.anomaly_rules.threshold("crowd_density"), Some(0.8));
    assert_eq!(
        SourceManager::from_config(&cfg).sources(),
        vec![Source::SocialMedia, Source::PublicSafety, Source::IotSensors]
    );
}

#[test]
fn urban_planning_file_parses() {
    let cfg = MonitorConfig::load_from(Path::new("config/urban_planning.toml")).unwrap();
    assert_eq!(cfg.mode, Mode::UrbanPlanning);
    assert_eq!(cfg.dashboard.refresh_secs, 5);
    assert_eq!(cfg.data_sources.transit.anomaly_probability, Some(0.2));
    assert_eq!(
        SourceManager::from_config(&cfg).sources(),
        vec![Source::Transit, Source::Traffic, Source::Environment]
    );
}

#[test]
#[serial]
fn env_path_and_provider_override() {
    let tmp = tempfile::tempdir().unwrap();
    let p = tmp.path().join("custom.toml");
    std::fs::write(&p, "mode = \"urban_planning\"\n[llm]\nprovider = \"mock\"\n").unwrap();

    env::set_var(ENV_CONFIG_PATH, p.display().to_string());
    env::remove_var(ENV_MODE);
    env::set_var(ENV_LLM_PROVIDER, "disabled");
    env::remove_var("AI_TEST_MODE");

    let cfg = MonitorConfig::load_default().unwrap();
    assert_eq!(cfg.mode, Mode::UrbanPlanning);
    assert_eq!(cfg.llm.provider, "disabled");

    // AI_TEST_MODE=mock wins over everything.
    env::set_var("AI_TEST_MODE", "mock");
    let cfg = MonitorConfig::load_default().unwrap();
    assert_eq!(cfg.llm.provider, "mock");

    env::remove_var("AI_TEST_MODE");
    env::remove_var(ENV_LLM_PROVIDER);
    env::remove_var(ENV_CONFIG_PATH);
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    env::set_var(ENV_CONFIG_PATH, "/definitely/not/here.toml");
    assert!(MonitorConfig::load_default().is_err());
    env::remove_var(ENV_CONFIG_PATH);
}
