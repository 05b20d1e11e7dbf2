//! Host integration: WiFi credentials, reboot, diagnostic command output

use crate::library::helpers::exec_string;
use log::{error, info};
use tokio::process::Command;

/// Writes WiFi credentials for the host's supplicant
pub async fn set_wifi(ssid: &str, pass: &str) {
    info!("setting wifi to {}", ssid);

    let command = format!(
        "wpa_passphrase '{}' '{}' > /etc/wpa_supplicant/wpa_supplicant-wlan0.conf",
        ssid, pass
    );

    match Command::new("sh").arg("-c").arg(command).output().await {
        Ok(_) => info!("wifi updated"),
        Err(e) => error!("error running wpa_passphrase: {}", e),
    }
}

/// Asks the host to reboot
pub async fn reboot_host() {
    info!("executing reboot command...");
    match Command::new("shutdown").args(["-r", "now"]).output().await {
        Ok(_) => info!("reboot command executed"),
        Err(e) => error!("error rebooting: {}", e),
    }
}

/// Current date and time as reported by the host
pub async fn server_date() -> String {
    exec_string("date", &[]).await
}

/// Disk usage as reported by the host
pub async fn disk_free() -> String {
    exec_string("df", &["-H"]).await
}

/// Addresses on which the host is reachable
pub async fn local_ips() -> String {
    exec_string("hostname", &["-I"]).await.trim().to_owned()
}
