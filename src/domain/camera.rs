//! Configured video sources and their runtime health

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

const DEFAULT_CODEC: &str = "copy";
const DEFAULT_EXTENSION: &str = "mp4";
const DEFAULT_RATE: f64 = 10.0;

/// A configured video source
///
/// The `healthy` flag is runtime-only state, written exclusively by the
/// camera's recording worker. Reads from other subsystems are racy but
/// non-load-bearing.
#[derive(Debug, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub audio: bool,
    #[serde(default)]
    pub video_codec: String,
    #[serde(default)]
    pub audio_codec: String,
    #[serde(default)]
    pub extension: String,
    #[serde(default)]
    pub rtsp_transport: String,
    #[serde(default)]
    pub in_rate: f64,
    #[serde(default)]
    pub out_rate: f64,
    #[serde(default)]
    pub pre_rec: Vec<String>,
    #[serde(default)]
    pub after_rec: Vec<String>,
    #[serde(default)]
    pub disable_parallel_transition: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motion_detection: Option<MotionConfig>,
    #[serde(skip, default = "healthy_default")]
    healthy: AtomicBool,
}

fn healthy_default() -> AtomicBool {
    AtomicBool::new(true)
}

impl Camera {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_owned(),
            url: url.to_owned(),
            audio: false,
            video_codec: String::new(),
            audio_codec: String::new(),
            extension: String::new(),
            rtsp_transport: String::new(),
            in_rate: 0.0,
            out_rate: 0.0,
            pre_rec: Vec::new(),
            after_rec: Vec::new(),
            disable_parallel_transition: false,
            motion_detection: None,
            healthy: healthy_default(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self) {
        self.healthy.store(true, Ordering::Relaxed);
    }

    pub fn set_unhealthy(&self) {
        self.healthy.store(false, Ordering::Relaxed);
    }

    pub fn video_codec(&self) -> &str {
        non_empty_or(&self.video_codec, DEFAULT_CODEC)
    }

    pub fn audio_codec(&self) -> &str {
        non_empty_or(&self.audio_codec, DEFAULT_CODEC)
    }

    pub fn extension(&self) -> &str {
        non_empty_or(&self.extension, DEFAULT_EXTENSION)
    }

    pub fn in_rate(&self) -> f64 {
        positive_or(self.in_rate, DEFAULT_RATE)
    }

    pub fn out_rate(&self) -> f64 {
        positive_or(self.out_rate, DEFAULT_RATE)
    }

    /// Host component of the source URL, used by the reachability prober
    pub fn hostname(&self) -> Option<String> {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
    }
}

fn non_empty_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn positive_or(value: f64, fallback: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        fallback
    }
}

impl Clone for Camera {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            url: self.url.clone(),
            audio: self.audio,
            video_codec: self.video_codec.clone(),
            audio_codec: self.audio_codec.clone(),
            extension: self.extension.clone(),
            rtsp_transport: self.rtsp_transport.clone(),
            in_rate: self.in_rate,
            out_rate: self.out_rate,
            pre_rec: self.pre_rec.clone(),
            after_rec: self.after_rec.clone(),
            disable_parallel_transition: self.disable_parallel_transition,
            motion_detection: self.motion_detection.clone(),
            healthy: AtomicBool::new(self.is_healthy()),
        }
    }
}

impl PartialEq for Camera {
    fn eq(&self, other: &Self) -> bool {
        // runtime health is deliberately excluded
        self.name == other.name
            && self.url == other.url
            && self.audio == other.audio
            && self.video_codec == other.video_codec
            && self.audio_codec == other.audio_codec
            && self.extension == other.extension
            && self.rtsp_transport == other.rtsp_transport
            && self.in_rate == other.in_rate
            && self.out_rate == other.out_rate
            && self.pre_rec == other.pre_rec
            && self.after_rec == other.after_rec
            && self.disable_parallel_transition == other.disable_parallel_transition
            && self.motion_detection == other.motion_detection
    }
}

/// Motion detection settings of a single camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionConfig {
    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,
    pub min_distance: u32,
    pub max_distance: u32,
    #[serde(default)]
    pub alg: String,
    #[serde(default)]
    pub time_range: TimeRange,
}

/// Time-of-day window expressed as offsets from midnight
///
/// The window only takes effect when both bounds are present and non-zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, with = "humantime_serde")]
    pub start: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub end: Option<Duration>,
}

impl TimeRange {
    /// Whether the given time of day falls inside the window
    pub fn contains(&self, at: NaiveTime) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) if !start.is_zero() && !end.is_zero() => {
                let since_midnight = at.signed_duration_since(NaiveTime::MIN);
                let seconds = since_midnight.num_seconds() as u64;
                seconds >= start.as_secs() && seconds <= end.as_secs()
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_on_access() {
        let camera = Camera::new("porch", "rtsp://10.0.0.2/stream");

        assert_eq!(camera.video_codec(), "copy");
        assert_eq!(camera.audio_codec(), "copy");
        assert_eq!(camera.extension(), "mp4");
        assert_eq!(camera.in_rate(), 10.0);
        assert_eq!(camera.out_rate(), 10.0);
        assert!(camera.is_healthy());
    }

    #[test]
    fn hostname_is_extracted_from_the_source_url() {
        let camera = Camera::new("porch", "rtsp://admin:pw@10.0.0.2:554/h264");
        assert_eq!(camera.hostname().as_deref(), Some("10.0.0.2"));

        let broken = Camera::new("broken", "not a url");
        assert_eq!(broken.hostname(), None);
    }

    #[test]
    fn health_transitions_are_visible() {
        let camera = Camera::new("porch", "rtsp://10.0.0.2/stream");
        camera.set_unhealthy();
        assert!(!camera.is_healthy());
        camera.set_healthy();
        assert!(camera.is_healthy());
    }

    #[test]
    fn unset_time_range_always_matches() {
        let range = TimeRange::default();
        assert!(range.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
    }

    #[test]
    fn time_range_bounds_are_inclusive() {
        let range = TimeRange {
            start: Some(Duration::from_secs(8 * 3600)),
            end: Some(Duration::from_secs(20 * 3600)),
        };

        assert!(range.contains(NaiveTime::from_hms_opt(8, 0, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(13, 30, 0).unwrap()));
        assert!(range.contains(NaiveTime::from_hms_opt(20, 0, 0).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(7, 59, 59).unwrap()));
        assert!(!range.contains(NaiveTime::from_hms_opt(21, 0, 0).unwrap()));
    }
}
