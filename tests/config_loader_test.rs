use std::io::Write;

use tempfile::NamedTempFile;
use worldstate::domain::models::CapacityPolicy;
use worldstate::infrastructure::config::ConfigLoader;

fn yaml_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_from_file() {
    let file = yaml_file(
        r#"
scheduling:
  capacity_policy: hard
  default_timezone: America/New_York
  default_work_start: "07:30"
  default_work_end: "16:00"
  default_capacity:
    max_hours_per_day: 5
    max_items_per_day: 4
database:
  path: /tmp/worldstate-test.db
"#,
    );

    let config = temp_env::with_vars_unset(
        ["WORLDSTATE_SCHEDULING__CAPACITY_POLICY", "WORLDSTATE_LOGGING__LEVEL"],
        || ConfigLoader::load_from_file(file.path()),
    )
    .unwrap();

    assert_eq!(config.scheduling.capacity_policy, CapacityPolicy::Hard);
    assert_eq!(config.scheduling.default_timezone, "America/New_York");
    assert_eq!(config.scheduling.default_work_start, "07:30");
    assert!((config.scheduling.default_capacity.max_hours_per_day - 5.0).abs() < f64::EPSILON);
    assert_eq!(config.scheduling.default_capacity.max_items_per_day, 4);
    assert_eq!(config.database.path, "/tmp/worldstate-test.db");
    assert_eq!(config.scheduling.max_suggestions, 5);
}

#[test]
fn test_env_overrides_file() {
    let file = yaml_file("scheduling:\n  capacity_policy: soft\nlogging:\n  level: info\n");

    let config = temp_env::with_vars(
        [
            ("WORLDSTATE_SCHEDULING__CAPACITY_POLICY", Some("hard")),
            ("WORLDSTATE_LOGGING__LEVEL", Some("debug")),
        ],
        || ConfigLoader::load_from_file(file.path()),
    )
    .unwrap();

    assert_eq!(config.scheduling.capacity_policy, CapacityPolicy::Hard);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_invalid_file_values_are_rejected() {
    let file = yaml_file("scheduling:\n  undo_history_limit: 50\n");
    let err = temp_env::with_vars_unset(["WORLDSTATE_SCHEDULING__UNDO_HISTORY_LIMIT"], || {
        ConfigLoader::load_from_file(file.path())
    })
    .unwrap_err();
    assert!(err.to_string().contains("undo_history_limit"));

    let file = yaml_file("scheduling:\n  default_timezone: Nowhere/Special\n");
    assert!(ConfigLoader::load_from_file(file.path()).is_err());
}

#[test]
fn test_malformed_yaml_fails() {
    let file = yaml_file("scheduling: [not, a, map\n");
    assert!(ConfigLoader::load_from_file(file.path()).is_err());
}
