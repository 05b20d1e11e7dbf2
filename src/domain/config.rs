//! Configuration document handling
//!
//! The primary document lives at a path supplied by the environment. A copy
//! dropped into the recording area is promoted on the next recording start;
//! the previous contents are kept aside as `config.old.yaml` and a backup of
//! the promoted document as `config.bkp.yaml`. When the primary document
//! fails to parse, the backup is restored and a host reboot is requested.

use crate::constants::COMPACT_TIME_FORMAT;
use crate::domain::camera::Camera;
use crate::domain::host;
use crate::domain::task::Task;
use chrono::Local;
use lazy_static::lazy_static;
use log::{error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Name of a pending configuration inside the recording area
pub const PENDING_CONFIG: &str = "config.yaml";
/// Previous configuration, kept aside when a pending one is promoted
pub const OLD_CONFIG: &str = "config.old.yaml";
/// Backup of the most recently promoted configuration
pub const BACKUP_CONFIG: &str = "config.bkp.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read configuration: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("unable to parse configuration: {0}")]
    Invalid(#[from] serde_yaml::Error),
    #[error("camera name declared more than once: {0}")]
    DuplicateCamera(String),
    #[error("no backup configuration available")]
    NoBackup,
}

/// The aggregate configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ffmpeg: String,
    #[serde(default)]
    pub mount_dir: String,
    #[serde(default)]
    pub mount_dev: String,
    #[serde(default)]
    pub mount_label: String,
    #[serde(default)]
    pub prevent_hdd_spindown: bool,
    #[serde(default, with = "humantime_serde")]
    pub termination_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_url: Option<String>,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub videos_dir: String,
    #[serde(default, with = "humantime_serde")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub cameras: Vec<Camera>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_after_days: Option<i64>,
    #[serde(default)]
    pub raspberry_pi: RaspberryPiConfig,
    #[serde(default)]
    pub wifi_ssid: String,
    #[serde(default)]
    pub wifi_pass: String,
    #[serde(default)]
    pub cron: Vec<CronEntry>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub telegram_bot: TelegramBotConfig,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default)]
    pub addr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RaspberryPiConfig {
    #[serde(default)]
    pub led_pin: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelegramBotConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub users: Vec<String>,
    #[serde(default)]
    pub allow_snapshots: bool,
    #[serde(default)]
    pub allow_upload: bool,
}

/// A periodic set of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronEntry {
    #[serde(with = "humantime_serde")]
    pub every: Duration,
    #[serde(default)]
    pub tasks: Vec<String>,
}

impl Config {
    /// Loads and validates the document at the given path
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parses and validates a document
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.name.as_str()) {
                return Err(ConfigError::DuplicateCamera(camera.name.clone()));
            }
        }
        Ok(())
    }

    /// Serializes the document back to YAML
    pub fn serialize(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Restores the backup document next to the primary path.
///
/// Called when the primary document fails to load; the caller is expected to
/// request a host reboot on success so the process starts over cleanly.
pub fn try_rollback(config_path: &Path) -> Result<(), ConfigError> {
    let backup_path = config_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(BACKUP_CONFIG);

    let raw = match std::fs::read_to_string(&backup_path) {
        Ok(raw) => raw,
        Err(_) => return Err(ConfigError::NoBackup),
    };

    info!("{} found, trying to restore...", BACKUP_CONFIG);

    let restored = Config::parse(&raw)?;
    std::fs::write(config_path, restored.serialize()?)?;

    Ok(())
}

/// What the lifecycle controller should do after a promoted update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Plain configuration change, restart the process
    Restart,
    /// WiFi credentials were applied, reboot the host
    Reboot,
}

/// Promotes a pending document found in the recording area.
///
/// Returns `None` when there is nothing to promote or the pending document is
/// invalid; the running configuration stays untouched in that case.
pub async fn apply_pending_update(
    current: &Config,
    config_path: &Path,
    videos_dir: &Path,
) -> Option<UpdateOutcome> {
    let pending_path = videos_dir.join(PENDING_CONFIG);
    let old_path = videos_dir.join(OLD_CONFIG);
    let backup_path = videos_dir.join(BACKUP_CONFIG);

    let raw = match tokio::fs::read_to_string(&pending_path).await {
        Ok(raw) => raw,
        Err(_) => return None,
    };

    let mut promoted = match Config::parse(&raw) {
        Ok(config) => config,
        Err(e) => {
            warn!("pending configuration is invalid, won't update: {}", e);
            return None;
        }
    };

    match current.serialize() {
        Ok(serialized) => {
            if let Err(e) = tokio::fs::write(&old_path, serialized).await {
                error!("error writing {}: {}", OLD_CONFIG, e);
            }
        }
        Err(e) => error!("error serializing running configuration: {}", e),
    }

    if let Err(e) = tokio::fs::rename(&pending_path, &backup_path).await {
        error!(
            "error renaming {} to {} in the recording area: {}",
            PENDING_CONFIG, BACKUP_CONFIG, e
        );
    }

    let ssid = std::mem::take(&mut promoted.wifi_ssid);
    let pass = std::mem::take(&mut promoted.wifi_pass);

    let serialized = match promoted.serialize() {
        Ok(serialized) => serialized,
        Err(e) => {
            error!("error serializing promoted configuration: {}", e);
            return None;
        }
    };

    if let Err(e) = tokio::fs::write(config_path, serialized).await {
        error!("error updating {}: {}", config_path.display(), e);
        return None;
    }

    info!("configuration updated");

    if !ssid.is_empty() {
        host::set_wifi(&ssid, &pass).await;
        return Some(UpdateOutcome::Reboot);
    }

    Some(UpdateOutcome::Restart)
}

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\$\{\{ *([^}]+?) *\}\}").unwrap();
}

/// Read-only `${{ key }}` substitution over configuration derived values
///
/// Known keys are camera attributes (`cameras.<name>.url.hostname` and
/// friends) plus the `now`/`_now` timestamps. Unknown keys are logged and
/// passed through unchanged.
pub struct TokenExpander {
    values: HashMap<String, String>,
}

impl TokenExpander {
    pub fn from_config(config: &Config) -> Self {
        let mut values = HashMap::new();

        for camera in &config.cameras {
            let key = |suffix: &str| format!("cameras.{}.{}", camera.name, suffix);

            values.insert(key("name"), camera.name.clone());
            values.insert(key("url.raw"), camera.url.clone());

            let url = match Url::parse(&camera.url) {
                Ok(url) => url,
                Err(_) => continue,
            };

            values.insert(key("url"), url.to_string());
            values.insert(key("url.scheme"), url.scheme().to_owned());
            values.insert(key("url.host"), {
                let mut host = url.host_str().unwrap_or_default().to_owned();
                if let Some(port) = url.port() {
                    host = format!("{}:{}", host, port);
                }
                host
            });
            values.insert(key("url.query"), url.query().unwrap_or_default().to_owned());
            values.insert(
                key("url.hostname"),
                url.host_str().unwrap_or_default().to_owned(),
            );
            values.insert(key("url.request_uri"), {
                match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_owned(),
                }
            });
            values.insert(key("url.username"), url.username().to_owned());
            values.insert(
                key("url.password"),
                url.password().unwrap_or_default().to_owned(),
            );
        }

        Self { values }
    }

    /// Expands every `${{ key }}` token in the input
    pub fn expand(&self, input: &str) -> String {
        let now = Local::now();

        TOKEN_PATTERN
            .replace_all(input, |captures: &regex::Captures| {
                let key = captures[1].trim();

                match key {
                    "now" => now.format("%Y-%m-%d %H:%M:%S").to_string(),
                    "_now" => now.format(COMPACT_TIME_FORMAT).to_string(),
                    _ => match self.values.get(key) {
                        Some(value) => value.clone(),
                        None => {
                            warn!("bad substitution. key {} doesn't exist", key);
                            captures[0].to_owned()
                        }
                    },
                }
            })
            .into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
ffmpeg: /usr/bin/ffmpeg
videos_dir: /mnt/storage/cameras
duration: 10s
termination_timeout: 2s
mount_dir: /mnt/storage
mount_dev: /dev/sda1
delete_after_days: 20
admin:
  user: admin
  pass: secret
  addr: ":8080"
cameras:
  - name: porch
    url: rtsp://user:pw@10.0.0.2:554/h264?channel=1
    audio: true
    audio_codec: aac
    rtsp_transport: tcp
    pre_rec: [lights-on]
    after_rec: [lights-off]
  - name: garden
    url: rtsp://10.0.0.3/stream
    disable_parallel_transition: true
    motion_detection:
      snapshot_interval: 2m
      min_distance: 4
      max_distance: 30
      alg: perception
      time_range:
        start: 8h
        end: 20h
tasks:
  - name: lights-on
    request:
      url: http://10.0.0.9/on
      method: post
      expect: OK
  - name: lights-off
    command: 'curl http://10.0.0.9/off?camera=${{ cameras.porch.name }}'
cron:
  - every: 1h
    tasks: [lights-on]
telegram_bot:
  token: 12345:token
  users: [alice]
"#;

    #[test]
    fn parses_a_representative_document() {
        let config = Config::parse(SAMPLE).unwrap();

        assert_eq!(config.cameras.len(), 2);
        assert_eq!(config.duration, Some(Duration::from_secs(10)));
        assert_eq!(config.termination_timeout, Some(Duration::from_secs(2)));
        assert_eq!(config.cameras[0].rtsp_transport, "tcp");
        assert!(config.cameras[1].disable_parallel_transition);

        let md = config.cameras[1].motion_detection.as_ref().unwrap();
        assert_eq!(md.snapshot_interval, Duration::from_secs(120));
        assert_eq!(md.alg, "perception");
        assert_eq!(config.cron[0].every, Duration::from_secs(3600));
    }

    #[test]
    fn roundtrips_through_serialization() {
        let config = Config::parse(SAMPLE).unwrap();
        let reparsed = Config::parse(&config.serialize().unwrap()).unwrap();
        assert_eq!(config, reparsed);
    }

    #[test]
    fn rejects_duplicate_camera_names() {
        let raw = r#"
cameras:
  - name: porch
    url: rtsp://10.0.0.2/a
  - name: porch
    url: rtsp://10.0.0.3/b
"#;
        assert!(matches!(
            Config::parse(raw),
            Err(ConfigError::DuplicateCamera(_))
        ));
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = Config::parse("{}").unwrap();
        assert!(config.cameras.is_empty());
        assert_eq!(config.duration, None);
        assert!(!config.debug);
    }

    #[test]
    fn expands_every_documented_camera_key() {
        let config = Config::parse(SAMPLE).unwrap();
        let expander = TokenExpander::from_config(&config);

        let cases = [
            ("${{ cameras.porch.name }}", "porch"),
            (
                "${{ cameras.porch.url.raw }}",
                "rtsp://user:pw@10.0.0.2:554/h264?channel=1",
            ),
            ("${{ cameras.porch.url.scheme }}", "rtsp"),
            ("${{ cameras.porch.url.host }}", "10.0.0.2:554"),
            ("${{ cameras.porch.url.hostname }}", "10.0.0.2"),
            ("${{ cameras.porch.url.query }}", "channel=1"),
            ("${{ cameras.porch.url.request_uri }}", "/h264?channel=1"),
            ("${{ cameras.porch.url.username }}", "user"),
            ("${{ cameras.porch.url.password }}", "pw"),
        ];

        for (input, expected) in cases {
            assert_eq!(expander.expand(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn unknown_keys_are_preserved_verbatim() {
        let expander = TokenExpander::from_config(&Config::default());
        assert_eq!(
            expander.expand("x ${{ cameras.ghost.name }} y"),
            "x ${{ cameras.ghost.name }} y"
        );
    }

    #[test]
    fn timestamps_match_the_documented_layouts() {
        let expander = TokenExpander::from_config(&Config::default());

        let now = expander.expand("${{ now }}");
        assert!(Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$")
            .unwrap()
            .is_match(&now));

        let compact = expander.expand("${{ _now }}");
        assert!(Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{2}_\d{2}_\d{2}$")
            .unwrap()
            .is_match(&compact));
    }

    #[test]
    fn rollback_restores_the_backup_document() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let backup_path = dir.path().join(BACKUP_CONFIG);

        std::fs::write(&config_path, "this is { not yaml").unwrap();
        std::fs::write(&backup_path, "videos_dir: /mnt/storage/cameras\n").unwrap();

        assert!(Config::load(&config_path).is_err());
        try_rollback(&config_path).unwrap();

        let restored = Config::load(&config_path).unwrap();
        assert_eq!(restored.videos_dir, "/mnt/storage/cameras");
    }

    #[test]
    fn rollback_without_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        assert!(matches!(
            try_rollback(&config_path),
            Err(ConfigError::NoBackup)
        ));
    }

    #[tokio::test]
    async fn pending_update_is_promoted_with_backups() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let videos_dir = dir.path().join("cameras");
        tokio::fs::create_dir_all(&videos_dir).await.unwrap();

        let current = Config::parse("videos_dir: /old\n").unwrap();
        std::fs::write(&config_path, current.serialize().unwrap()).unwrap();
        std::fs::write(videos_dir.join(PENDING_CONFIG), "videos_dir: /new\n").unwrap();

        let outcome = apply_pending_update(&current, &config_path, &videos_dir).await;
        assert_eq!(outcome, Some(UpdateOutcome::Restart));

        let promoted = Config::load(&config_path).unwrap();
        assert_eq!(promoted.videos_dir, "/new");

        // prior contents are kept aside verbatim
        let old = Config::load(&videos_dir.join(OLD_CONFIG)).unwrap();
        assert_eq!(old, current);

        // the pending document became the new backup
        assert!(videos_dir.join(BACKUP_CONFIG).exists());
        assert!(!videos_dir.join(PENDING_CONFIG).exists());
    }

    #[tokio::test]
    async fn invalid_pending_update_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let videos_dir = dir.path().join("cameras");
        tokio::fs::create_dir_all(&videos_dir).await.unwrap();

        let current = Config::default();
        std::fs::write(&config_path, current.serialize().unwrap()).unwrap();
        std::fs::write(videos_dir.join(PENDING_CONFIG), "cameras: [broken").unwrap();

        assert_eq!(
            apply_pending_update(&current, &config_path, &videos_dir).await,
            None
        );
        assert!(videos_dir.join(PENDING_CONFIG).exists());
    }

    #[tokio::test]
    async fn missing_pending_update_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        assert_eq!(
            apply_pending_update(&Config::default(), &config_path, dir.path()).await,
            None
        );
    }
}
