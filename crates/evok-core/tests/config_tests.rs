//! Configuration file tests

use evok_core::{Config, Error};
use std::io::Write;
use std::time::Duration;

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    write!(file, "{}", contents).unwrap();
    file
}

#[test]
fn test_load_yaml_file() {
    let file = config_file(
        ".yaml",
        r#"
interval: 10
mappings:
  - device: temp
    circuit: "28FF1234"
    topic: sensors/outdoor
    offset: -2.5
  - device: relay
    circuit: "1"
    topic: heating/pump
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.poll_interval(), Duration::from_secs(10));
    assert_eq!(config.mappings.len(), 2);
    assert_eq!(config.mappings[0].topic, "sensors/outdoor");
    assert_eq!(config.mappings[0].offset, -2.5);
    assert_eq!(config.mappings[1].offset, 0.0);
}

#[test]
fn test_load_without_extension_is_yaml() {
    let file = config_file("", "interval: 7\n");
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.interval, 7);
}

#[test]
fn test_load_toml_file() {
    let file = config_file(
        ".toml",
        r#"
interval = 10

[[mappings]]
device = "relay"
circuit = "1"
topic = "heating/pump"
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.interval, 10);
    assert_eq!(config.mappings[0].topic, "heating/pump");
}

#[test]
fn test_unquoted_circuit() {
    let config = Config::from_yaml_str(
        r#"
interval: 5
mappings:
  - device: relay
    circuit: 2
    topic: garage/door
"#,
    )
    .unwrap();
    assert_eq!(config.mappings[0].circuit, "2");
}

#[test]
fn test_mappings_optional() {
    let config = Config::from_yaml_str("interval: 3").unwrap();
    assert!(config.mappings.is_empty());
    assert!(config.mapping_table().unwrap().is_empty());
}

#[test]
fn test_unknown_top_level_key_rejected() {
    let result = Config::from_yaml_str("interval: 3\nbroker: tcp://localhost");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_unknown_mapping_key_rejected() {
    let result = Config::from_yaml_str(
        r#"
interval: 3
mappings:
  - device: relay
    circuit: "1"
    topic: a
    scale: 2.0
"#,
    );
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_unknown_key_rejected_in_toml() {
    let result = Config::from_toml_str("interval = 3\nbroker = \"tcp://localhost\"");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_interval_required() {
    assert!(Config::from_yaml_str("mappings: []").is_err());
    assert!(Config::from_yaml_str("interval: 0").is_err());
    assert!(Config::from_yaml_str("interval: ten").is_err());
}

#[test]
fn test_duplicate_mapping_fails_table_build() {
    let config = Config::from_yaml_str(
        r#"
interval: 3
mappings:
  - device: relay
    circuit: "1"
    topic: a
  - device: relay
    circuit: "1"
    topic: b
"#,
    )
    .unwrap();

    assert!(matches!(
        config.mapping_table(),
        Err(Error::DuplicateMapping { .. })
    ));
}

#[test]
fn test_missing_file() {
    let result = Config::load("/nonexistent/config.yaml");
    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("/nonexistent")));
}
