//! Recording volume watchdog
//!
//! Detects whether the recording volume is mounted by inspecting the host's
//! block-device tree and attempts to mount it by device path or label.
//! Failures are reported but never fatal; callers retry with backoff.

use crate::library::helpers::safe_shell;
use log::{info, warn};
use serde::Deserialize;
use tokio::process::Command;

/// Mount configuration of the recording volume
#[derive(Debug, Clone)]
pub struct StorageMount {
    mount_dir: String,
    mount_dev: String,
    mount_label: String,
    prevent_hdd_spindown: bool,
}

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Deserialize)]
struct BlockDevice {
    #[serde(default)]
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<BlockDevice>,
}

impl BlockDevice {
    fn is_mounted_at(&self, dir: &str) -> bool {
        self.mountpoint.as_deref() == Some(dir)
            || self.children.iter().any(|child| child.is_mounted_at(dir))
    }
}

/// Whether any block device (or child device) is mounted at `dir`
fn mountpoint_present(lsblk_json: &str, dir: &str) -> Result<bool, serde_json::Error> {
    let output: LsblkOutput = serde_json::from_str(lsblk_json)?;
    Ok(output
        .blockdevices
        .iter()
        .any(|device| device.is_mounted_at(dir)))
}

impl StorageMount {
    pub fn new(
        mount_dir: &str,
        mount_dev: &str,
        mount_label: &str,
        prevent_hdd_spindown: bool,
    ) -> Self {
        Self {
            mount_dir: safe_shell(mount_dir),
            mount_dev: safe_shell(mount_dev),
            mount_label: safe_shell(mount_label),
            prevent_hdd_spindown,
        }
    }

    /// True iff the recording volume is mounted.
    ///
    /// An empty `mount_dir` disables the check entirely, for deployments
    /// recording straight to the root file system.
    pub async fn is_mounted(&self) -> bool {
        if self.mount_dir.is_empty() {
            return true;
        }

        let output = match Command::new("lsblk")
            .args(["-o", "NAME,MOUNTPOINT", "--json"])
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!("error running lsblk: {}", e);
                return false;
            }
        };

        match mountpoint_present(&String::from_utf8_lossy(&output.stdout), &self.mount_dir) {
            Ok(mounted) => mounted,
            Err(e) => {
                warn!("can't parse lsblk output: {}", e);
                false
            }
        }
    }

    /// Attempts to mount the recording volume by device path or label
    pub async fn try_mount(&self) {
        if self.mount_dev.is_empty() && self.mount_label.is_empty() {
            return;
        }
        if self.mount_dir.is_empty() {
            warn!("no mount directory specified");
            return;
        }

        info!("trying to mount...");

        let mut args = vec!["-t", "vfat", "-o", "umask=0022,gid=1000,uid=1000"];

        if !self.mount_dev.is_empty() {
            args.push(&self.mount_dev);
        } else {
            args.push("-L");
            args.push(&self.mount_label);
        }

        args.push(&self.mount_dir);

        match Command::new("mount").args(&args).output().await {
            Ok(output) if !output.status.success() => {
                warn!(
                    "error when trying to mount: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return;
            }
            Err(e) => {
                warn!("error when trying to mount: {}", e);
                return;
            }
            Ok(_) => {}
        }

        if self.prevent_hdd_spindown {
            self.disable_spindown().await;
        }
    }

    async fn disable_spindown(&self) {
        if self.mount_dev.is_empty() {
            warn!("can't prevent hdd from spinning down, mount_dev must be set");
            return;
        }

        info!("preventing hdd from spinning down (hdparm)");

        if let Err(e) = Command::new("hdparm")
            .args(["-B", "255", &self.mount_dev])
            .output()
            .await
        {
            warn!("error disabling hdd power management: {}", e);
            return;
        }

        if let Err(e) = Command::new("hdparm")
            .args(["-S", "0", &self.mount_dev])
            .output()
            .await
        {
            warn!("error disabling hdd spindown timeout: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LSBLK: &str = r#"{
        "blockdevices": [
            {"name": "mmcblk0", "mountpoint": null, "children": [
                {"name": "mmcblk0p1", "mountpoint": "/boot"},
                {"name": "mmcblk0p2", "mountpoint": "/"}
            ]},
            {"name": "sda", "mountpoint": null, "children": [
                {"name": "sda1", "mountpoint": "/mnt/storage"}
            ]}
        ]
    }"#;

    #[test]
    fn finds_mountpoints_on_child_devices() {
        assert!(mountpoint_present(LSBLK, "/mnt/storage").unwrap());
        assert!(mountpoint_present(LSBLK, "/boot").unwrap());
        assert!(!mountpoint_present(LSBLK, "/mnt/other").unwrap());
    }

    #[test]
    fn top_level_mountpoints_match() {
        let raw = r#"{"blockdevices": [{"name": "sda", "mountpoint": "/mnt/storage"}]}"#;
        assert!(mountpoint_present(raw, "/mnt/storage").unwrap());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(mountpoint_present("not json", "/mnt/storage").is_err());
    }

    #[tokio::test]
    async fn empty_mount_dir_is_always_mounted() {
        let mount = StorageMount::new("", "", "", false);
        assert!(mount.is_mounted().await);
    }
}
