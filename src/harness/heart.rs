//! Structures to keep the process alive until some event occurs

use futures::{
    channel::mpsc::{channel, Receiver, Sender},
    pin_mut,
    prelude::*,
    select,
};
use log::{debug, error};
use std::fmt;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};

/// Reason why the heart stopped beating
#[derive(Debug, Clone)]
pub enum DeathReason {
    /// A subsystem asked for a process restart
    Restart(String),
    /// A subsystem asked for a host reboot
    Reboot(String),
    /// SIGINT, SIGTERM or other process-external cause
    Terminated,
}

impl DeathReason {
    /// Whether the host should be rebooted on the way out
    pub fn wants_reboot(&self) -> bool {
        matches!(self, DeathReason::Reboot(_))
    }
}

impl fmt::Display for DeathReason {
    fn fmt(&self, w: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathReason::Restart(reason) => write!(w, "Restart requested ({})", reason),
            DeathReason::Reboot(reason) => write!(w, "Reboot requested ({})", reason),
            DeathReason::Terminated => write!(w, "Terminated due to external signal"),
        }
    }
}

#[derive(Debug)]
enum HeartInteraction {
    Restart(String),
    Reboot(String),
}

/// Lifecycle management struct that keeps the application alive
pub struct Heart {
    rx: Receiver<HeartInteraction>,
}

impl Heart {
    /// Creates a new heart and linked stone
    pub fn new() -> (Self, HeartStone) {
        let (tx, rx) = channel(2);
        (Self { rx }, HeartStone::new(tx))
    }

    /// Future that waits until the heart dies for the returned reason
    pub async fn death(&mut self) -> DeathReason {
        debug!("Heart starts beating");

        loop {
            select! {
                interaction = self.rx.next() => {
                    if let Some(interaction) = interaction {
                        match interaction {
                            HeartInteraction::Restart(reason) => return DeathReason::Restart(reason),
                            HeartInteraction::Reboot(reason) => return DeathReason::Reboot(reason),
                        }
                    }
                },
                () = Heart::termination_signal().fuse() => return DeathReason::Terminated,
            };
        }
    }

    async fn termination_signal() {
        let mut sigterm_stream = signal(SignalKind::terminate()).unwrap();
        let sigterm = sigterm_stream.recv().fuse();
        let ctrl_c = ctrl_c().fuse();

        pin_mut!(sigterm, ctrl_c);

        select! {
            _ = sigterm => {},
            _ = ctrl_c => {},
        };
    }
}

/// Remote controller for the heart
#[derive(Clone)]
pub struct HeartStone {
    remote: Sender<HeartInteraction>,
}

impl HeartStone {
    fn new(remote: Sender<HeartInteraction>) -> Self {
        Self { remote }
    }

    /// Stop the process so an external supervisor relaunches it
    pub async fn request_restart(&mut self, reason: &str) {
        self.send(HeartInteraction::Restart(reason.to_owned())).await;
    }

    /// Stop the process and reboot the host on the way out
    pub async fn request_reboot(&mut self, reason: &str) {
        self.send(HeartInteraction::Reboot(reason.to_owned())).await;
    }

    async fn send(&mut self, interaction: HeartInteraction) {
        if let Err(e) = self.remote.send(interaction).await {
            error!("Failed to interact with Heart: {}", e);
        }
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use futures::poll;
    use std::time::Duration;
    use tokio::task::{spawn, yield_now};
    use tokio::time::sleep;

    #[tokio::test]
    async fn live_without_interaction() {
        let (mut heart, _stone) = Heart::new();

        let handle = spawn(async move { heart.death().await });
        sleep(Duration::from_millis(100)).await;
        yield_now().await;

        assert!(!poll!(handle).is_ready());
    }

    #[tokio::test]
    async fn die_on_restart_request() {
        let (mut heart, mut stone) = Heart::new();

        let handle = spawn(async move { heart.death().await });
        stone.request_restart("testing").await;

        let reason = handle.await.unwrap();
        assert!(matches!(reason, DeathReason::Restart(_)));
        assert!(!reason.wants_reboot());
    }

    #[tokio::test]
    async fn die_on_reboot_request() {
        let (mut heart, mut stone) = Heart::new();

        let handle = spawn(async move { heart.death().await });
        stone.request_reboot("testing").await;

        let reason = handle.await.unwrap();
        assert!(reason.wants_reboot());
    }
}
