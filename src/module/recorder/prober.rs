//! Camera reachability probing
//!
//! While a recording session is live its camera host is pinged every few
//! minutes. Probe results only drive the status indicator; ICMP may fail
//! while RTSP works, so reachability never gates recording. The prober stops
//! deterministically when its guard is dropped at session exit.

use crate::constants::{PROBE_COUNT, PROBE_INTERVAL, PROBE_REPLY_TIMEOUT};
use crate::domain::camera::Camera;
use crate::library::indicator::Indicator;
use log::{debug, warn};
use std::net::IpAddr;
use std::sync::Arc;
use surge_ping::{Client, Config, PingIdentifier, PingSequence};
use tokio::net::lookup_host;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Guard around the probing task of one recording session
pub struct Prober {
    handle: JoinHandle<()>,
}

impl Prober {
    pub fn start(camera: Arc<Camera>, indicator: Indicator) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                sleep(PROBE_INTERVAL).await;
                probe(&camera, &indicator).await;
            }
        });

        Self { handle }
    }
}

impl Drop for Prober {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn probe(camera: &Camera, indicator: &Indicator) {
    let host = match camera.hostname() {
        Some(host) => host,
        None => {
            warn!("error parsing camera ({}) url", camera.name);
            indicator.bad_camera();
            return;
        }
    };

    let addr = match resolve(&host).await {
        Some(addr) => addr,
        None => {
            warn!("can't resolve camera {} host {}", camera.name, host);
            indicator.bad_camera();
            return;
        }
    };

    let received = ping(addr).await;

    if received == 0 {
        warn!(
            "camera {} is not responding. ping stats - sent: {}, recv: 0",
            camera.name, PROBE_COUNT
        );
        indicator.bad_camera();
        return;
    }

    debug!(
        "camera {} responded to {}/{} probes",
        camera.name, received, PROBE_COUNT
    );
    indicator.on();
}

async fn resolve(host: &str) -> Option<IpAddr> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return Some(addr);
    }

    lookup_host((host, 0))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .map(|sock| sock.ip())
}

async fn ping(addr: IpAddr) -> u16 {
    let client = match Client::new(&Config::default()) {
        Ok(client) => client,
        Err(e) => {
            warn!("error creating pinger (raw sockets need privileges): {}", e);
            return 0;
        }
    };

    let payload = [0u8; 56];
    let mut pinger = client.pinger(addr, PingIdentifier(rand::random())).await;
    pinger.timeout(PROBE_REPLY_TIMEOUT);

    let mut received = 0;
    for sequence in 0..PROBE_COUNT {
        if pinger.ping(PingSequence(sequence), &payload).await.is_ok() {
            received += 1;
        }
    }

    received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn literal_addresses_resolve_without_dns() {
        assert_eq!(
            resolve("10.0.0.2").await,
            Some("10.0.0.2".parse::<IpAddr>().unwrap())
        );
    }

    #[tokio::test]
    async fn dropping_the_guard_stops_the_task() {
        let camera = Arc::new(Camera::new("porch", "rtsp://10.0.0.2/stream"));
        let prober = Prober::start(camera, Indicator::disconnected());
        drop(prober);
    }
}
