use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use detection_etl::{EtlConfig, PublishKind, PublishTarget};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ETL_CONFIG",
        "ETL_STAGING_DIR",
        "ETL_PROCESSED_DIR",
        "ETL_CHECKPOINT_PATH",
        "ETL_PUBLISH_KIND",
        "HDFS_BASE_DIR",
        "ETL_HDFS_COMMAND",
        "ETL_WINDOW_SECS",
        "ETL_CHECKPOINT_EMPTY",
        "ETL_ABORT_ON_ERROR",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "staging_dir": "/srv/etl/staging",
        "processed_dir": "/srv/etl/processed",
        "window_secs": 20,
        "checkpoint_empty_files": false,
        "publish": {
            "kind": "directory",
            "dir": "/srv/warehouse/detections"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ETL_CONFIG", file.path());
    std::env::set_var("HDFS_BASE_DIR", "/mnt/hive/csv");
    std::env::set_var("ETL_ABORT_ON_ERROR", "true");

    let cfg = EtlConfig::load().expect("load config");

    assert_eq!(cfg.staging_dir, PathBuf::from("/srv/etl/staging"));
    assert_eq!(cfg.processed_dir, PathBuf::from("/srv/etl/processed"));
    assert_eq!(
        cfg.checkpoint_path,
        PathBuf::from("/srv/etl/staging/etl_checkpoints/processed_files.txt")
    );
    assert_eq!(cfg.window_secs, 20);
    assert!(!cfg.checkpoint_empty_files);
    assert!(cfg.abort_on_file_error);
    assert_eq!(cfg.publish.kind, PublishKind::Directory);
    assert_eq!(
        cfg.publish.target(),
        PublishTarget::Directory(PathBuf::from("/mnt/hive/csv"))
    );

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = EtlConfig::load().expect("load defaults");
    assert_eq!(cfg.staging_dir, PathBuf::from("data/staging/detecciones"));
    assert_eq!(cfg.processed_dir, PathBuf::from("data/processed"));
    assert_eq!(cfg.window_secs, 10);
    assert_eq!(
        cfg.publish.target(),
        PublishTarget::Hdfs {
            command: "hdfs".to_string(),
            dir: "/projects/yolo_objects/hive/csv".to_string(),
        }
    );
}

#[test]
fn explicit_path_wins_over_env_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let temp_dir = tempfile::tempdir().expect("temp dir");
    let env_cfg = temp_dir.path().join("env.json");
    std::fs::write(&env_cfg, r#"{ "window_secs": 5 }"#).expect("write env config");
    let explicit = temp_dir.path().join("etl.toml");
    std::fs::write(&explicit, "window_secs = 60\n").expect("write explicit config");

    std::env::set_var("ETL_CONFIG", &env_cfg);
    let cfg = EtlConfig::load_from(Some(&explicit)).expect("load config");
    assert_eq!(cfg.window_secs, 60);

    clear_env();
}

#[test]
fn invalid_env_values_are_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ETL_WINDOW_SECS", "ten");
    assert!(EtlConfig::load().is_err());
    clear_env();

    std::env::set_var("ETL_WINDOW_SECS", "0");
    assert!(EtlConfig::load().is_err());
    clear_env();

    std::env::set_var("ETL_PUBLISH_KIND", "s3");
    assert!(EtlConfig::load().is_err());
    clear_env();

    std::env::set_var("ETL_CONFIG", "/nonexistent/etl.json");
    assert!(EtlConfig::load().is_err());
    clear_env();
}
