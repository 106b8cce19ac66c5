use printlink_settings::{Config, SettingsError};
use tempfile::tempdir;

#[test]
fn toml_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::new();
    config.connection.port = "printer.local:8080".to_string();
    config.streaming.tcp_streaming = true;
    config.pause.on_pause_script = vec!["G91".into(), "G1 Z5".into(), "G90".into()];
    config.pause.xy_feed = Some(6000.0);
    config.machine.layer_height = Some(0.2);

    config.save_to_file(&path).unwrap();
    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn json_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::new();
    config.connection.baud_rate = 250000;
    config.streaming.greetings.push("Marlin".into());

    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn load_or_default_without_file() {
    let dir = tempdir().unwrap();
    let config = Config::load_or_default(&dir.path().join("missing.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn invalid_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[machine]\nacceleration = 0.0\n").unwrap();

    let err = Config::load_or_default(&path).unwrap_err();
    assert!(matches!(err, SettingsError::InvalidSetting { .. }));
}

#[test]
fn malformed_json_is_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::JsonError(_))
    ));
}
