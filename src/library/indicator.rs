//! Operational status indication through a single LED
//!
//! Fault classes map to blink patterns so an operator standing next to the
//! device can tell storage, network and camera problems apart without a
//! terminal. The indicator is purely observational and never feeds back into
//! recording decisions.

use log::debug;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

const BLINK_INTERVAL: Duration = Duration::from_secs(1);
const CONFIRM_TOGGLES: u32 = 10;
const CONFIRM_STEP: Duration = Duration::from_millis(200);

/// Externally requestable indicator states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Off,
    On,
    /// Storage fault, one blink per interval
    BadHd,
    /// Camera fault, two blinks per interval
    BadCamera,
    /// Network fault, three blinks per interval
    BadNetwork,
    /// Short acknowledgement burst, then off
    Confirm,
}

impl IndicatorState {
    /// Blinks per interval for the fault states
    pub(crate) fn blinks(&self) -> Option<u32> {
        match self {
            IndicatorState::BadHd => Some(1),
            IndicatorState::BadCamera => Some(2),
            IndicatorState::BadNetwork => Some(3),
            _ => None,
        }
    }
}

/// Physical output behind the indicator
pub trait BlinkSink: Send + 'static {
    fn set_level(&mut self, high: bool);
}

/// Sink that records level changes in the debug log
pub struct LogSink;

impl BlinkSink for LogSink {
    fn set_level(&mut self, high: bool) {
        debug!("indicator level: {}", if high { "high" } else { "low" });
    }
}

/// Sink driving a GPIO pin on the host
#[cfg(feature = "gpio")]
pub struct GpioSink {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "gpio")]
impl GpioSink {
    pub fn new(pin: u8) -> Result<Self, rppal::gpio::Error> {
        let pin = rppal::gpio::Gpio::new()?.get(pin)?.into_output();
        Ok(Self { pin })
    }
}

#[cfg(feature = "gpio")]
impl BlinkSink for GpioSink {
    fn set_level(&mut self, high: bool) {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

/// Handle used by all subsystems to signal operational status
#[derive(Clone)]
pub struct Indicator {
    tx: Option<mpsc::UnboundedSender<IndicatorState>>,
}

impl Indicator {
    /// Starts a driver task feeding the given sink and returns its handle
    pub fn spawn(sink: Box<dyn BlinkSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drive(sink, rx));
        Self { tx: Some(tx) }
    }

    /// Handle without a driver, state changes are discarded
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    fn request(&self, state: IndicatorState) {
        if let Some(tx) = &self.tx {
            tx.send(state).ok();
        }
    }

    pub fn on(&self) {
        self.request(IndicatorState::On);
    }

    pub fn off(&self) {
        self.request(IndicatorState::Off);
    }

    pub fn bad_hd(&self) {
        self.request(IndicatorState::BadHd);
    }

    pub fn bad_camera(&self) {
        self.request(IndicatorState::BadCamera);
    }

    pub fn bad_network(&self) {
        self.request(IndicatorState::BadNetwork);
    }

    pub fn confirm(&self) {
        self.request(IndicatorState::Confirm);
    }
}

async fn drive(mut sink: Box<dyn BlinkSink>, mut rx: mpsc::UnboundedReceiver<IndicatorState>) {
    let mut state = IndicatorState::Off;

    loop {
        match state {
            IndicatorState::On | IndicatorState::Off => {
                sink.set_level(state == IndicatorState::On);
                match rx.recv().await {
                    Some(next) => state = next,
                    None => return,
                }
            }
            IndicatorState::Confirm => {
                for _ in 0..CONFIRM_TOGGLES {
                    sink.set_level(true);
                    sleep(CONFIRM_STEP / 2).await;
                    sink.set_level(false);
                    sleep(CONFIRM_STEP / 2).await;
                }
                state = IndicatorState::Off;
            }
            fault => {
                let blinks = fault.blinks().unwrap_or(1);
                let step = BLINK_INTERVAL / (blinks * 2);

                for _ in 0..blinks {
                    sink.set_level(true);
                    sleep(step).await;
                    sink.set_level(false);
                    sleep(step).await;
                }

                // pause one interval between bursts, reacting to new states immediately
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(next) => state = next,
                        None => return,
                    },
                    _ = sleep(BLINK_INTERVAL) => {}
                }
            }
        }

        // pick up the most recent request without blocking
        while let Ok(next) = rx.try_recv() {
            state = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_states_map_to_distinct_patterns() {
        assert_eq!(IndicatorState::BadHd.blinks(), Some(1));
        assert_eq!(IndicatorState::BadCamera.blinks(), Some(2));
        assert_eq!(IndicatorState::BadNetwork.blinks(), Some(3));
        assert_eq!(IndicatorState::On.blinks(), None);
        assert_eq!(IndicatorState::Off.blinks(), None);
    }

    #[tokio::test]
    async fn disconnected_handle_discards_requests() {
        let indicator = Indicator::disconnected();
        indicator.on();
        indicator.bad_hd();
        indicator.confirm();
    }
}
