//! Perceptual-hash motion detection
//!
//! Cameras with a `motion_detection` block get a watcher that periodically
//! snapshots the source, hashes the image and compares it against the
//! previous snapshot. A Hamming distance inside the configured band raises a
//! notification carrying both images; distances above the band are treated
//! as noise (lighting changes, camera glitches) and only logged.

use crate::constants::MIN_SNAPSHOT_INTERVAL;
use crate::domain::camera::{Camera, MotionConfig};
use crate::domain::encoder;
use crate::library::scheduling::{Job, StopSignal};
use crate::module::context::Runtime;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::sleep;

/// What a hash distance means for the configured band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionVerdict {
    /// Inside the band, report it
    Motion,
    /// Above the band, too much changed at once to be motion
    Noise,
    /// Below the band, nothing happened
    Still,
}

/// Classifies a Hamming distance against the configured band
pub fn motion_verdict(distance: u32, min_distance: u32, max_distance: u32) -> MotionVerdict {
    if distance > max_distance {
        MotionVerdict::Noise
    } else if distance < min_distance {
        MotionVerdict::Still
    } else {
        MotionVerdict::Motion
    }
}

/// Hasher for the configured algorithm, falling back to `difference`
fn hasher_for(alg: &str) -> Hasher {
    let mut config = HasherConfig::new();

    config = match alg {
        "perception" => config.preproc_dct().hash_alg(HashAlg::Mean),
        "average" => config.hash_alg(HashAlg::Mean),
        "difference" => config.hash_alg(HashAlg::Gradient),
        unknown => {
            if !unknown.is_empty() {
                warn!("unknown hash algorithm '{}', using difference", unknown);
            }
            config.hash_alg(HashAlg::Gradient)
        }
    };

    config.to_hasher()
}

fn hash_distance(hasher: &Hasher, previous: &Path, current: &Path) -> Result<u32> {
    let previous = image::open(previous)?;
    let current = image::open(current)?;

    Ok(hasher.hash_image(&previous).dist(&hasher.hash_image(&current)))
}

/// Job owning one watcher task per motion-enabled camera
pub struct MotionJob;

#[async_trait]
impl Job for MotionJob {
    type Context = Runtime;

    const NAME: &'static str = module_path!();

    async fn run(&self, runtime: Runtime, stop: StopSignal) -> Result<()> {
        let mut watchers = Vec::new();
        for camera in runtime.cameras.iter() {
            if camera.motion_detection.is_some() {
                watchers.push(tokio::spawn(watch(
                    runtime.clone(),
                    camera.clone(),
                    stop.clone(),
                )));
            }
        }

        stop.wait().await;

        for watcher in watchers {
            watcher.await.ok();
        }

        Ok(())
    }
}

async fn watch(runtime: Runtime, camera: Arc<Camera>, stop: StopSignal) {
    let md = match &camera.motion_detection {
        Some(md) => md.clone(),
        None => return,
    };

    let interval = md.snapshot_interval.max(MIN_SNAPSHOT_INTERVAL);
    let hasher = hasher_for(&md.alg);

    info!(
        "motion detection armed for {} every {:?} (band {}..={})",
        camera.name, interval, md.min_distance, md.max_distance
    );

    let mut baseline: Option<PathBuf> = None;

    loop {
        tokio::select! {
            _ = sleep(interval) => {}
            () = stop.wait() => return,
        }

        if !md.time_range.contains(Local::now().time()) {
            continue;
        }

        let snapshot = match encoder::take_snapshot(
            &runtime.settings.ffmpeg,
            &camera.url,
            &runtime.settings.videos_dir,
            &camera.name,
        )
        .await
        {
            Ok(path) => path,
            Err(e) => {
                error!("error taking snapshot on {}: {}", camera.name, e);
                continue;
            }
        };

        if let Some(previous) = baseline.take() {
            evaluate(&runtime, &camera, &md, &hasher, &previous, &snapshot).await;
        }

        baseline = Some(snapshot);
    }
}

async fn evaluate(
    runtime: &Runtime,
    camera: &Camera,
    md: &MotionConfig,
    hasher: &Hasher,
    previous: &Path,
    current: &Path,
) {
    let distance = match hash_distance(hasher, previous, current) {
        Ok(distance) => distance,
        Err(e) => {
            error!("error comparing snapshots of {}: {}", camera.name, e);
            remove_snapshot(previous).await;
            return;
        }
    };

    match motion_verdict(distance, md.min_distance, md.max_distance) {
        MotionVerdict::Motion => {
            info!(
                "motion detected on {} (distance: {}) - last: {}, current: {}",
                camera.name,
                distance,
                previous.display(),
                current.display()
            );

            // both images are evidence, keep them on disk
            runtime.notifier.notify_with_images(
                format!(
                    "Motion detection on camera {}. (distance: {})",
                    camera.name, distance
                ),
                vec![previous.to_path_buf(), current.to_path_buf()],
            );
        }
        MotionVerdict::Noise => {
            info!(
                "ignored! distance: {} on camera {}",
                distance, camera.name
            );
            remove_snapshot(previous).await;
        }
        MotionVerdict::Still => {
            remove_snapshot(previous).await;
        }
    }
}

async fn remove_snapshot(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        error!("error removing snapshot {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_band_is_inclusive() {
        assert_eq!(motion_verdict(4, 4, 30), MotionVerdict::Motion);
        assert_eq!(motion_verdict(30, 4, 30), MotionVerdict::Motion);
        assert_eq!(motion_verdict(17, 4, 30), MotionVerdict::Motion);
        assert_eq!(motion_verdict(3, 4, 30), MotionVerdict::Still);
        assert_eq!(motion_verdict(31, 4, 30), MotionVerdict::Noise);
        assert_eq!(motion_verdict(0, 0, 0), MotionVerdict::Motion);
    }

    #[test]
    fn unknown_algorithms_fall_back_to_difference() {
        // identical images hash to distance zero regardless of algorithm
        let hasher = hasher_for("definitely-not-an-algorithm");
        let img = image::DynamicImage::new_rgb8(32, 32);
        let a = hasher.hash_image(&img);
        let b = hasher.hash_image(&img);
        assert_eq!(a.dist(&b), 0);
    }

    #[test]
    fn differing_images_produce_positive_distances() {
        let hasher = hasher_for("difference");

        let dark = image::DynamicImage::new_rgb8(32, 32);
        let mut bright = image::RgbImage::new(32, 32);
        for (x, _y, pixel) in bright.enumerate_pixels_mut() {
            let level = ((x * 8) % 255) as u8;
            *pixel = image::Rgb([level, level, level]);
        }
        let bright = image::DynamicImage::ImageRgb8(bright);

        assert!(hasher.hash_image(&dark).dist(&hasher.hash_image(&bright)) > 0);
    }
}
