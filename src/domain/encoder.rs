//! External encoder contract
//!
//! The encoder is an out-of-process child supervised through signals. It is
//! expected to honor a three-level stop: SIGINT for a planned segment
//! boundary (flushes container headers), SIGTERM for cancellation
//! (abort-but-flush) and SIGKILL as a last resort. Argument construction and
//! process control live here; scheduling decisions stay with the recorder.

use crate::domain::camera::Camera;
use chrono::Local;
use log::{debug, error, info};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};

/// Errors thrown while starting an encoder
#[derive(Debug, Error)]
pub enum EncoderError {
    /// unable to spawn the encoder process
    #[error("unable to spawn encoder process")]
    SpawnFailed(#[from] std::io::Error),
}

/// Errors thrown while taking a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unable to prepare snapshot directory")]
    DirectoryUnavailable(#[source] std::io::Error),
    #[error("unable to run encoder for snapshot")]
    SpawnFailed(#[source] std::io::Error),
    #[error("encoder exited with {status}: {stderr}")]
    EncoderFailed { status: ExitStatus, stderr: String },
}

/// Command line for one recording segment, excluding the binary itself
pub fn record_args(camera: &Camera, duration: Duration, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-nostdin".to_owned(),
        "-nostats".to_owned(),
        "-y".to_owned(),
        "-r".to_owned(),
        format!("{:.1}", camera.in_rate()),
    ];

    if !camera.rtsp_transport.is_empty() {
        args.push("-rtsp_transport".to_owned());
        args.push(camera.rtsp_transport.clone());
    }

    args.push("-i".to_owned());
    args.push(camera.url.clone());
    args.push("-c:v".to_owned());
    args.push(camera.video_codec().to_owned());
    args.push("-r".to_owned());
    args.push(format!("{:.1}", camera.out_rate()));

    if camera.audio {
        args.push("-c:a".to_owned());
        args.push(camera.audio_codec().to_owned());
    } else {
        args.push("-an".to_owned());
    }

    args.push("-to".to_owned());
    args.push(duration.as_secs().to_string());
    args.push("-movflags".to_owned());
    args.push("+faststart".to_owned());
    args.push(output.to_string_lossy().into_owned());

    args
}

/// Command line for a single-frame snapshot, excluding the binary itself
pub fn snapshot_args(url: &str, output: &Path) -> Vec<String> {
    vec![
        "-y".to_owned(),
        "-i".to_owned(),
        url.to_owned(),
        "-ss".to_owned(),
        "00:00:01.500".to_owned(),
        "-f".to_owned(),
        "image2".to_owned(),
        "-vframes".to_owned(),
        "1".to_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Signal-only handle onto a running encoder, detached from the child's
/// wait state so signals can be sent while an exit is being awaited
#[derive(Debug, Clone, Copy)]
pub struct EncoderSignals {
    pid: Option<i32>,
}

impl EncoderSignals {
    fn send(&self, signal: Signal) {
        let pid = match self.pid {
            Some(pid) => pid,
            None => return,
        };

        if let Err(e) = kill(Pid::from_raw(pid), signal) {
            error!("error sending {:?} to encoder: {}", signal, e);
        }
    }

    /// Planned segment boundary, the encoder flushes headers and exits
    pub fn interrupt(&self) {
        self.send(Signal::SIGINT);
    }

    /// Cooperative stop on cancellation
    pub fn terminate(&self) {
        self.send(Signal::SIGTERM);
    }

    /// Last resort
    pub fn kill(&self) {
        self.send(Signal::SIGKILL);
    }
}

/// Running encoder process
pub struct EncoderProcess {
    child: Child,
    pid: Option<i32>,
}

impl EncoderProcess {
    /// Spawns the encoder. Stdio is attached in debug deployments and
    /// discarded otherwise.
    pub fn spawn(binary: &Path, args: &[String], debug: bool) -> Result<Self, EncoderError> {
        debug!("launching {} {}", binary.display(), args.join(" "));

        let (stdout, stderr) = if debug {
            (Stdio::inherit(), Stdio::inherit())
        } else {
            (Stdio::null(), Stdio::null())
        };

        let child = Command::new(binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()?;

        let pid = child.id().map(|pid| pid as i32);

        Ok(Self { child, pid })
    }

    /// Handle for sending signals independently of `wait`
    pub fn signals(&self) -> EncoderSignals {
        EncoderSignals { pid: self.pid }
    }

    /// Waits for the encoder to exit
    pub async fn wait(&mut self) -> Option<ExitStatus> {
        match self.child.wait().await {
            Ok(status) => {
                info!("encoder exited: {}", status);
                Some(status)
            }
            Err(e) => {
                error!("error awaiting encoder exit: {}", e);
                None
            }
        }
    }
}

/// Takes a JPEG snapshot of the given source into the snapshots directory
pub async fn take_snapshot(
    binary: &Path,
    url: &str,
    videos_dir: &Path,
    camera_name: &str,
) -> Result<PathBuf, SnapshotError> {
    let dir = videos_dir.join("snapshots");
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(SnapshotError::DirectoryUnavailable)?;

    let output = dir.join(crate::domain::layout::snapshot_file_name(
        camera_name,
        &Local::now(),
    ));

    let result = Command::new(binary)
        .args(snapshot_args(url, &output))
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(SnapshotError::SpawnFailed)?;

    if !result.status.success() {
        return Err(SnapshotError::EncoderFailed {
            status: result.status,
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        });
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_args_match_the_encoder_contract() {
        let mut camera = Camera::new("porch", "rtsp://10.0.0.2/h264");
        camera.rtsp_transport = "tcp".into();

        let args = record_args(
            &camera,
            Duration::from_secs(3600),
            Path::new("/mnt/storage/cameras/rec_2024_03_07/09_00_00_porch.mp4"),
        );

        assert_eq!(
            args,
            vec![
                "-nostdin",
                "-nostats",
                "-y",
                "-r",
                "10.0",
                "-rtsp_transport",
                "tcp",
                "-i",
                "rtsp://10.0.0.2/h264",
                "-c:v",
                "copy",
                "-r",
                "10.0",
                "-an",
                "-to",
                "3600",
                "-movflags",
                "+faststart",
                "/mnt/storage/cameras/rec_2024_03_07/09_00_00_porch.mp4",
            ]
        );
    }

    #[test]
    fn audio_enables_the_audio_codec_instead_of_an() {
        let mut camera = Camera::new("porch", "rtsp://10.0.0.2/h264");
        camera.audio = true;
        camera.audio_codec = "aac".into();

        let args = record_args(&camera, Duration::from_secs(10), Path::new("out.mp4"));

        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
        assert!(!args.contains(&"-an".to_owned()));
    }

    #[test]
    fn transport_flag_is_omitted_when_unset() {
        let camera = Camera::new("porch", "rtsp://10.0.0.2/h264");
        let args = record_args(&camera, Duration::from_secs(10), Path::new("out.mp4"));
        assert!(!args.contains(&"-rtsp_transport".to_owned()));
    }

    #[test]
    fn snapshot_args_match_the_encoder_contract() {
        let args = snapshot_args("rtsp://10.0.0.2/h264", Path::new("/tmp/porch.jpg"));
        assert_eq!(
            args,
            vec![
                "-y",
                "-i",
                "rtsp://10.0.0.2/h264",
                "-ss",
                "00:00:01.500",
                "-f",
                "image2",
                "-vframes",
                "1",
                "/tmp/porch.jpg",
            ]
        );
    }
}
