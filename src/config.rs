use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::DEFAULT_WINDOW_SECS;
use crate::loader::PublishTarget;

const DEFAULT_STAGING_DIR: &str = "data/staging/detecciones";
const DEFAULT_PROCESSED_DIR: &str = "data/processed";
const DEFAULT_CHECKPOINT_FILE: &str = "etl_checkpoints/processed_files.txt";
const DEFAULT_PUBLISH_DIR: &str = "/projects/yolo_objects/hive/csv";
const DEFAULT_HDFS_COMMAND: &str = "hdfs";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EtlConfigFile {
    staging_dir: Option<PathBuf>,
    processed_dir: Option<PathBuf>,
    checkpoint_path: Option<PathBuf>,
    window_secs: Option<u32>,
    checkpoint_empty_files: Option<bool>,
    abort_on_file_error: Option<bool>,
    publish: Option<PublishConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PublishConfigFile {
    kind: Option<PublishKind>,
    dir: Option<String>,
    command: Option<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishKind {
    Directory,
    Hdfs,
}

impl PublishKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "directory" | "dir" => Ok(PublishKind::Directory),
            "hdfs" => Ok(PublishKind::Hdfs),
            other => Err(anyhow!(
                "unknown publish kind {:?} (expected directory or hdfs)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EtlConfig {
    pub staging_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    pub window_secs: u32,
    /// Record files that clean to zero rows as processed.
    pub checkpoint_empty_files: bool,
    /// Stop the run at the first per-file failure instead of moving on.
    pub abort_on_file_error: bool,
    pub publish: PublishSettings,
}

#[derive(Debug, Clone)]
pub struct PublishSettings {
    pub kind: PublishKind,
    pub dir: String,
    pub command: String,
}

impl PublishSettings {
    pub fn target(&self) -> PublishTarget {
        match self.kind {
            PublishKind::Directory => PublishTarget::Directory(PathBuf::from(&self.dir)),
            PublishKind::Hdfs => PublishTarget::Hdfs {
                command: self.command.clone(),
                dir: self.dir.clone(),
            },
        }
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self::from_file(EtlConfigFile::default())
    }
}

impl EtlConfig {
    /// Defaults, then the file named by `ETL_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`EtlConfig::load`] with an explicit file taking precedence over `ETL_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => match std::env::var("ETL_CONFIG") {
                Ok(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(&path))?),
                _ => None,
            },
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EtlConfigFile) -> Self {
        let staging_dir = file
            .staging_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STAGING_DIR));
        let checkpoint_path = file
            .checkpoint_path
            .unwrap_or_else(|| staging_dir.join(DEFAULT_CHECKPOINT_FILE));
        let publish = PublishSettings {
            kind: file
                .publish
                .as_ref()
                .and_then(|publish| publish.kind)
                .unwrap_or(PublishKind::Hdfs),
            dir: file
                .publish
                .as_ref()
                .and_then(|publish| publish.dir.clone())
                .unwrap_or_else(|| DEFAULT_PUBLISH_DIR.to_string()),
            command: file
                .publish
                .and_then(|publish| publish.command)
                .unwrap_or_else(|| DEFAULT_HDFS_COMMAND.to_string()),
        };
        Self {
            staging_dir,
            processed_dir: file
                .processed_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROCESSED_DIR)),
            checkpoint_path,
            window_secs: file.window_secs.unwrap_or(DEFAULT_WINDOW_SECS),
            checkpoint_empty_files: file.checkpoint_empty_files.unwrap_or(true),
            abort_on_file_error: file.abort_on_file_error.unwrap_or(false),
            publish,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = non_empty_env("ETL_STAGING_DIR") {
            self.staging_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty_env("ETL_PROCESSED_DIR") {
            self.processed_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty_env("ETL_CHECKPOINT_PATH") {
            self.checkpoint_path = PathBuf::from(path);
        }
        if let Some(kind) = non_empty_env("ETL_PUBLISH_KIND") {
            self.publish.kind = PublishKind::parse(&kind)?;
        }
        if let Some(dir) = non_empty_env("HDFS_BASE_DIR") {
            self.publish.dir = dir;
        }
        if let Some(command) = non_empty_env("ETL_HDFS_COMMAND") {
            self.publish.command = command;
        }
        if let Some(secs) = non_empty_env("ETL_WINDOW_SECS") {
            self.window_secs = secs
                .trim()
                .parse()
                .map_err(|_| anyhow!("ETL_WINDOW_SECS must be an integer number of seconds"))?;
        }
        if let Some(flag) = non_empty_env("ETL_CHECKPOINT_EMPTY") {
            self.checkpoint_empty_files = parse_flag("ETL_CHECKPOINT_EMPTY", &flag)?;
        }
        if let Some(flag) = non_empty_env("ETL_ABORT_ON_ERROR") {
            self.abort_on_file_error = parse_flag("ETL_ABORT_ON_ERROR", &flag)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.window_secs == 0 {
            return Err(anyhow!("window_secs must be greater than zero"));
        }
        if self.staging_dir.as_os_str().is_empty() {
            return Err(anyhow!("staging_dir must not be empty"));
        }
        if self.publish.dir.trim().is_empty() {
            return Err(anyhow!("publish dir must not be empty"));
        }
        if self.publish.kind == PublishKind::Hdfs && self.publish.command.trim().is_empty() {
            return Err(anyhow!("hdfs publish requires a client command"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<EtlConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean (true/false)", key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_nest_checkpoint_under_staging() {
        let cfg = EtlConfig::default();
        assert_eq!(cfg.staging_dir, PathBuf::from(DEFAULT_STAGING_DIR));
        assert_eq!(
            cfg.checkpoint_path,
            PathBuf::from(DEFAULT_STAGING_DIR).join(DEFAULT_CHECKPOINT_FILE)
        );
        assert_eq!(cfg.window_secs, 10);
        assert!(cfg.checkpoint_empty_files);
        assert!(!cfg.abort_on_file_error);
        assert_eq!(
            cfg.publish.target(),
            PublishTarget::Hdfs {
                command: "hdfs".to_string(),
                dir: DEFAULT_PUBLISH_DIR.to_string()
            }
        );
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut cfg = EtlConfig::default();
        cfg.window_secs = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn publish_kind_parsing() {
        assert_eq!(PublishKind::parse("Directory").unwrap(), PublishKind::Directory);
        assert_eq!(PublishKind::parse("dir").unwrap(), PublishKind::Directory);
        assert_eq!(PublishKind::parse(" hdfs ").unwrap(), PublishKind::Hdfs);
        assert!(PublishKind::parse("s3").is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(parse_flag("X", "yes").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn toml_file_is_parsed_by_extension() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("etl.toml");
        std::fs::write(
            &path,
            "staging_dir = \"/srv/staging\"\nwindow_secs = 30\n[publish]\nkind = \"directory\"\ndir = \"/srv/warehouse\"\n",
        )?;
        let cfg = EtlConfig::from_file(read_config_file(&path)?);
        assert_eq!(cfg.staging_dir, PathBuf::from("/srv/staging"));
        assert_eq!(
            cfg.checkpoint_path,
            PathBuf::from("/srv/staging").join(DEFAULT_CHECKPOINT_FILE)
        );
        assert_eq!(cfg.window_secs, 30);
        assert_eq!(
            cfg.publish.target(),
            PublishTarget::Directory(PathBuf::from("/srv/warehouse"))
        );
        Ok(())
    }

    #[test]
    fn unknown_keys_are_rejected() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("etl.json");
        std::fs::write(&path, r#"{ "staging": "/typo" }"#)?;
        assert!(read_config_file(&path).is_err());
        Ok(())
    }
}
