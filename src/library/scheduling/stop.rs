use tokio::sync::watch;

/// Cooperative stop flag handed to everything that has to wind down on shutdown
///
/// Cheap to clone and safe to await from any number of places concurrently.
#[derive(Clone)]
pub struct StopSignal {
    rx: watch::Receiver<Option<()>>,
}

impl StopSignal {
    /// Creates a flag together with the sender that trips it
    pub fn pair() -> (watch::Sender<Option<()>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }

    /// Whether the stop has already been requested
    pub fn triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Future that completes once the stop is requested
    ///
    /// Also completes when the other end goes away, so a consumer can never
    /// outlive its scheduler.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        while rx.borrow().is_none() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}
