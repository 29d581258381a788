use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use tempfile::tempdir;

use yamas::config::{Config, ConfigLoader};
use yamas::error::YamasError;

#[test]
fn explicit_config_file_is_loaded() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("yamas.json");
    fs::write(
        &path,
        r#"{"specific_location": "/data/yamas", "threads": 4, "keep_raw": true, "profiler_database": "/db/mpa"}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.base_dir, Utf8PathBuf::from("/data/yamas"));
    assert_eq!(resolved.threads, 4);
    assert!(resolved.keep_raw);
    assert_eq!(resolved.profiler_database, Some(Utf8PathBuf::from("/db/mpa")));
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
}

#[test]
fn missing_explicit_config_is_a_read_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(YamasError::ConfigRead(_))
    );
}

#[test]
fn malformed_config_is_a_parse_error() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("yamas.json");
    fs::write(&path, r#"{"threads": "many"}"#).unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(YamasError::ConfigParse(_))
    );
}

#[test]
fn zero_threads_are_rejected() {
    let config = Config {
        threads: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(YamasError::ConfigParse(_))
    );
}
