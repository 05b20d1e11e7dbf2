//! One recording segment, start to finish
//!
//! Verifies storage, prepares the day directory, runs the pre-hooks, spawns
//! the encoder and supervises it through the three-level stop. Health is
//! judged by how long the session lasted: anything shorter than the minimum
//! video duration marks the camera unhealthy, with notifications emitted only
//! on health edges.

use super::prober::Prober;
use crate::constants::{MIN_VIDEO_DURATION, MOUNT_RETRY_INTERVAL};
use crate::domain::camera::Camera;
use crate::domain::encoder::{self, EncoderProcess};
use crate::domain::layout;
use crate::domain::notification::Notifier;
use crate::library::scheduling::StopSignal;
use crate::module::context::Runtime;
use async_trait::async_trait;
use chrono::Local;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};

/// [`super::SegmentRunner`] backed by the external encoder
pub struct FfmpegSegmentRunner {
    runtime: Runtime,
}

impl FfmpegSegmentRunner {
    pub fn new(runtime: Runtime) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl super::SegmentRunner for FfmpegSegmentRunner {
    async fn run_segment(&self, camera: Arc<Camera>, stop: StopSignal) {
        record(&self.runtime, &camera, stop).await;
    }
}

enum Ending {
    Finished,
    Cancelled,
    Interrupted,
}

async fn record(runtime: &Runtime, camera: &Arc<Camera>, stop: StopSignal) {
    let start = Local::now();
    let started_at = Instant::now();

    if !runtime.storage.is_mounted().await {
        error!("can't record: storage is not mounted");
        runtime.notifier.notify("error: HD is not working");
        runtime.indicator.bad_hd();
        runtime.storage.try_mount().await;

        // pace the retry loop; the dispatcher re-enqueues as soon as we return
        tokio::select! {
            _ = sleep(MOUNT_RETRY_INTERVAL) => {}
            () = stop.wait() => {}
        }
        return;
    }

    let day_dir = runtime.settings.videos_dir.join(layout::day_dir_name(&start));
    if let Err(e) = tokio::fs::create_dir_all(&day_dir).await {
        error!(
            "error creating recording directory {}: {}",
            day_dir.display(),
            e
        );
        runtime.indicator.bad_hd();
        return;
    }

    // reachability probing runs beside the recording and stops with it
    let _prober = Prober::start(camera.clone(), runtime.indicator.clone());

    runtime.run_tasks(&camera.pre_rec, "pre_rec");

    if camera.is_healthy() {
        info!("recording {}...", camera.name);
    }

    let output = day_dir.join(layout::segment_file_name(
        &start,
        &camera.name,
        camera.extension(),
    ));
    let args = encoder::record_args(camera, runtime.settings.duration, &output);

    let mut encoder = match EncoderProcess::spawn(&runtime.settings.ffmpeg, &args, runtime.settings.debug)
    {
        Ok(encoder) => encoder,
        Err(e) => {
            error!("error running encoder for {}: {}", camera.name, e);
            runtime.indicator.bad_camera();
            return;
        }
    };

    let signals = encoder.signals();
    let exited = encoder.wait();
    tokio::pin!(exited);

    let ending = tokio::select! {
        _ = &mut exited => Ending::Finished,
        () = stop.wait() => Ending::Cancelled,
        // the encoder stops writing at the configured duration on its own;
        // the interrupt merely asks it to flush and make room for a successor
        _ = sleep(runtime.settings.duration), if !camera.disable_parallel_transition => {
            signals.interrupt();
            info!("SIGINT sent to {}", camera.name);
            Ending::Interrupted
        }
    };

    let ending = match ending {
        Ending::Interrupted => tokio::select! {
            _ = &mut exited => Ending::Finished,
            () = stop.wait() => Ending::Cancelled,
        },
        other => other,
    };

    if let Ending::Cancelled = ending {
        signals.terminate();
        info!("SIGTERM sent to {}", camera.name);

        if timeout(runtime.settings.termination_timeout, &mut exited)
            .await
            .is_err()
        {
            signals.kill();
            info!("SIGKILL sent to {}", camera.name);
            exited.await;
        }
    } else {
        info!("recording {} finished", camera.name);
    }

    let took = started_at.elapsed();

    if update_health(camera, took, &runtime.notifier) {
        runtime.indicator.bad_camera();
    }

    if camera.is_healthy() {
        info!("recording {} took {:?}", camera.name, took);
    }

    runtime.run_tasks(&camera.after_rec, "after_rec");
}

/// Judges the session by its length and flips the camera's health flag,
/// notifying only on transitions. Returns whether the session was too short.
fn update_health(camera: &Camera, took: std::time::Duration, notifier: &Notifier) -> bool {
    if took < MIN_VIDEO_DURATION {
        if camera.is_healthy() {
            warn!(
                "camera {} is unhealthy. recording took {:?}",
                camera.name, took
            );
            notifier.notify(format!("error: camera {} is not recording", camera.name));
        }
        camera.set_unhealthy();
        true
    } else {
        if !camera.is_healthy() {
            notifier.notify(format!("camera {} is now recording", camera.name));
        }
        camera.set_healthy();
        false
    }
}
