//! Camera dispatch and overlap handoff
//!
//! A single-slot channel carries cameras from completed (or still-flushing)
//! workers back to the dispatcher. Each worker owns a `released` latch so its
//! camera is re-enqueued exactly once: early at `duration + margin` while the
//! previous encoder is still flushing (the parallel transition), or on
//! completion. Unhealthy cameras sit out a short backoff before retrying.

use crate::constants::{HANDOFF_MARGIN, UNHEALTHY_BACKOFF};
use crate::domain::camera::Camera;
use crate::library::scheduling::StopSignal;
use async_trait::async_trait;
use log::debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;

/// One segment session for one camera, start to finish
///
/// Implementations must return once the session is over; under cancellation
/// they are responsible for winding down their encoder before returning.
#[async_trait]
pub trait SegmentRunner: Send + Sync + 'static {
    async fn run_segment(&self, camera: Arc<Camera>, stop: StopSignal);
}

/// Hands cameras to workers and drains them on cancellation
pub struct Dispatcher<R: SegmentRunner> {
    runner: Arc<R>,
    duration: Duration,
    margin: Duration,
    backoff: Duration,
}

impl<R: SegmentRunner> Dispatcher<R> {
    pub fn new(runner: Arc<R>, duration: Duration) -> Self {
        Self::with_timing(runner, duration, HANDOFF_MARGIN, UNHEALTHY_BACKOFF)
    }

    /// Timing seam for tests driving handoff and backoff deterministically
    pub fn with_timing(
        runner: Arc<R>,
        duration: Duration,
        margin: Duration,
        backoff: Duration,
    ) -> Self {
        Self {
            runner,
            duration,
            margin,
            backoff,
        }
    }

    /// Runs until cancellation, then blocks until every worker has returned
    pub async fn run(&self, cameras: &[Arc<Camera>], stop: StopSignal) {
        if cameras.is_empty() {
            stop.wait().await;
            return;
        }

        let (queue_tx, mut queue_rx) = mpsc::channel::<Arc<Camera>>(1);
        let active = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        // seed the queue from the side so the single slot never deadlocks
        let seed_tx = queue_tx.clone();
        let seed: Vec<_> = cameras.to_vec();
        tokio::spawn(async move {
            for camera in seed {
                if seed_tx.send(camera).await.is_err() {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                () = stop.wait() => break,
                camera = queue_rx.recv() => match camera {
                    Some(camera) => self.spawn_worker(camera, &queue_tx, &stop, &active, &idle),
                    None => break,
                },
            }
        }

        // closing the queue releases any worker blocked on a re-enqueue
        drop(queue_rx);

        loop {
            let notified = idle.notified();
            if active.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
    }

    fn spawn_worker(
        &self,
        camera: Arc<Camera>,
        queue_tx: &mpsc::Sender<Arc<Camera>>,
        stop: &StopSignal,
        active: &Arc<AtomicUsize>,
        idle: &Arc<Notify>,
    ) {
        let runner = self.runner.clone();
        let queue_tx = queue_tx.clone();
        let stop = stop.clone();
        let active = active.clone();
        let idle = idle.clone();
        let handoff_after = self.duration + self.margin;
        let backoff = self.backoff;

        active.fetch_add(1, Ordering::AcqRel);

        tokio::spawn(async move {
            let mut released = false;
            let mut handoff_armed = !camera.disable_parallel_transition;

            let segment = runner.run_segment(camera.clone(), stop.clone());
            tokio::pin!(segment);
            let handoff_at = sleep(handoff_after);
            tokio::pin!(handoff_at);

            loop {
                tokio::select! {
                    () = &mut segment => {
                        if !released && !stop.triggered() {
                            if !camera.is_healthy() {
                                tokio::select! {
                                    _ = sleep(backoff) => {
                                        released = true;
                                        queue_tx.send(camera.clone()).await.ok();
                                    }
                                    () = stop.wait() => {}
                                }
                            } else {
                                released = true;
                                queue_tx.send(camera.clone()).await.ok();
                            }
                        }
                        break;
                    }
                    () = &mut handoff_at, if handoff_armed => {
                        handoff_armed = false;

                        // the previous segment is still flushing; start the next
                        // one now so the boundary stays gap-free
                        if !stop.triggered() && camera.is_healthy() && !released {
                            released = true;
                            debug!("releasing {} for parallel transition", camera.name);
                            queue_tx.send(camera.clone()).await.ok();
                        }
                    }
                }
            }

            if active.fetch_sub(1, Ordering::AcqRel) == 1 {
                idle.notify_waiters();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time::{advance, Instant};

    /// Runner whose segments last a fixed time and record their live windows
    struct FakeRunner {
        segment_length: Duration,
        windows: Mutex<Vec<(Instant, Instant)>>,
        runs: AtomicUsize,
        unhealthy_after: Option<usize>,
    }

    impl FakeRunner {
        fn new(segment_length: Duration) -> Self {
            Self {
                segment_length,
                windows: Mutex::new(Vec::new()),
                runs: AtomicUsize::new(0),
                unhealthy_after: None,
            }
        }

        fn unhealthy_after(mut self, runs: usize) -> Self {
            self.unhealthy_after = Some(runs);
            self
        }
    }

    #[async_trait]
    impl SegmentRunner for FakeRunner {
        async fn run_segment(&self, camera: Arc<Camera>, stop: StopSignal) {
            let started = Instant::now();
            let run = self.runs.fetch_add(1, Ordering::SeqCst);

            tokio::select! {
                _ = sleep(self.segment_length) => {}
                () = stop.wait() => {}
            }

            if let Some(limit) = self.unhealthy_after {
                if run >= limit {
                    camera.set_unhealthy();
                }
            }

            self.windows.lock().unwrap().push((started, Instant::now()));
        }
    }

    fn camera(name: &str) -> Arc<Camera> {
        Arc::new(Camera::new(name, "rtsp://10.0.0.2/stream"))
    }

    const SEGMENT: Duration = Duration::from_secs(12);
    const MARGIN: Duration = Duration::from_secs(2);
    const BACKOFF: Duration = Duration::from_secs(5);

    fn dispatcher(runner: Arc<FakeRunner>) -> Dispatcher<FakeRunner> {
        // the fake segments outlive duration + margin so the handoff fires
        Dispatcher::with_timing(runner, Duration::from_secs(8), MARGIN, BACKOFF)
    }

    #[tokio::test(start_paused = true)]
    async fn handoff_overlaps_consecutive_segments() {
        let runner = Arc::new(FakeRunner::new(SEGMENT));
        let dispatcher = dispatcher(runner.clone());
        let cameras = vec![camera("cam1")];
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&cameras, stop).await });

        // three segments plus change
        advance(Duration::from_secs(27)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();

        let windows = runner.windows.lock().unwrap();
        assert!(windows.len() >= 2, "expected overlap, got {:?}", windows);

        // each successor went live before its predecessor finished
        for pair in windows.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start < prev_end);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_one_reenqueue_per_worker() {
        let runner = Arc::new(FakeRunner::new(SEGMENT));
        let dispatcher = dispatcher(runner.clone());
        let cameras = vec![camera("cam1")];
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&cameras, stop).await });

        advance(Duration::from_secs(100)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();

        // ten handoff slots in 100s; duplicated re-enqueues would double this
        let runs = runner.runs.load(Ordering::SeqCst);
        assert!(runs >= 9 && runs <= 11, "unexpected run count {}", runs);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_transition_serializes_segments() {
        let runner = Arc::new(FakeRunner::new(SEGMENT));
        let dispatcher = dispatcher(runner.clone());
        let mut cam = Camera::new("cam1", "rtsp://10.0.0.2/stream");
        cam.disable_parallel_transition = true;
        let cameras = vec![Arc::new(cam)];
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&cameras, stop).await });

        advance(Duration::from_secs(45)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();

        let windows = runner.windows.lock().unwrap();
        assert!(windows.len() >= 2);
        for pair in windows.windows(2) {
            let (_, prev_end) = pair[0];
            let (next_start, _) = pair[1];
            assert!(next_start >= prev_end);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unhealthy_camera_backs_off_before_retrying() {
        // short segments so the handoff never fires; every retry goes through
        // the completion path
        let runner = Arc::new(FakeRunner::new(Duration::from_secs(1)).unhealthy_after(0));
        let dispatcher =
            Dispatcher::with_timing(runner.clone(), Duration::from_secs(8), MARGIN, BACKOFF);
        let cameras = vec![camera("cam1")];
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&cameras, stop).await });

        // each attempt costs 1s segment + 5s backoff
        advance(Duration::from_secs(30)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();

        let runs = runner.runs.load(Ordering::SeqCst);
        assert!(runs >= 4 && runs <= 6, "unexpected run count {}", runs);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_active_workers() {
        let runner = Arc::new(FakeRunner::new(SEGMENT));
        let dispatcher = dispatcher(runner.clone());
        let cameras = vec![camera("cam1"), camera("cam2")];
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&cameras, stop).await });

        advance(Duration::from_secs(3)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();

        // both workers observed the stop and recorded their windows
        assert_eq!(runner.windows.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn no_cameras_waits_for_cancellation() {
        let runner = Arc::new(FakeRunner::new(SEGMENT));
        let dispatcher = dispatcher(runner);
        let (stop_tx, stop) = StopSignal::pair();

        let run = tokio::spawn(async move { dispatcher.run(&[], stop).await });
        advance(Duration::from_secs(1)).await;
        stop_tx.send(Some(())).unwrap();
        run.await.unwrap();
    }
}
