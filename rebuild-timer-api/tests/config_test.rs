// Integration tests for configuration sources

use std::io::Write;

use rebuild_timer_api::config::int_parameter;
use rebuild_timer_api::{
    ConfigSource, EnvConfig, JsonFileConfig, MapConfig, TimerConfig, TimerError, POOL_SIZE_KEY,
};

#[test]
fn test_json_file_config_load() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, r#"{{ "dgcThreadPoolSize": "6" }}"#).unwrap();

    let config = JsonFileConfig::load(file.path()).unwrap();
    assert_eq!(TimerConfig::default().resolve_capacity(&config).unwrap(), 6);
}

#[test]
fn test_json_file_config_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = JsonFileConfig::load(dir.path().join("absent.json")).unwrap_err();

    assert!(matches!(err, TimerError::ConfigLoad(_)));
    assert!(err.to_string().contains("absent.json"));
}

#[test]
fn test_env_config_reads_prefixed_variable() {
    let env = EnvConfig::with_prefix("REBUILD_TIMER_CONFIG_TEST_");
    std::env::set_var(env.var_name(POOL_SIZE_KEY), "3");

    assert_eq!(env.get(POOL_SIZE_KEY).as_deref(), Some("3"));
    assert_eq!(int_parameter(&env, POOL_SIZE_KEY, 10), 3);

    std::env::remove_var(env.var_name(POOL_SIZE_KEY));
    assert_eq!(int_parameter(&env, POOL_SIZE_KEY, 10), 10);
}

#[test]
fn test_invalid_capacity_is_configuration_error() {
    let config = MapConfig::new().with(POOL_SIZE_KEY, -1);
    let err = TimerConfig::default().resolve_capacity(&config).unwrap_err();

    match err {
        TimerError::Configuration { key, value, .. } => {
            assert_eq!(key, POOL_SIZE_KEY);
            assert_eq!(value, "-1");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_map_config_changes_are_visible() {
    let config = MapConfig::new().with(POOL_SIZE_KEY, 2);
    assert_eq!(config.get(POOL_SIZE_KEY).as_deref(), Some("2"));

    config.set(POOL_SIZE_KEY, 5);
    assert_eq!(config.get(POOL_SIZE_KEY).as_deref(), Some("5"));

    assert_eq!(config.remove(POOL_SIZE_KEY).as_deref(), Some("5"));
    assert!(config.get(POOL_SIZE_KEY).is_none());
}
