//! Process-wide constants and configuration defaults

use std::time::Duration;

/// Completed segments shorter than this mark their camera as unhealthy.
///
/// Independent of the configured segment duration; a reachable camera always
/// records for at least this long before the encoder is asked to stop.
pub const MIN_VIDEO_DURATION: Duration = Duration::from_secs(50);

/// Slack granted after the segment duration before a successor segment is
/// released while the predecessor encoder is still flushing.
pub const HANDOFF_MARGIN: Duration = Duration::from_secs(60);

/// Delay before an unhealthy camera is queued for another attempt.
pub const UNHEALTHY_BACKOFF: Duration = Duration::from_secs(10);

/// Delay between attempts to mount the recording volume.
pub const MOUNT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Hard ceiling for the post-cancellation drain of all jobs.
pub const DRAIN_CEILING: Duration = Duration::from_secs(60);

/// Interval between retention sweeps of the recording area.
pub const RETENTION_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Interval between camera reachability probes while a recording is live.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Echo requests sent per reachability probe.
pub const PROBE_COUNT: u16 = 3;

/// Per-echo reply deadline. Three echoes share a 15 second budget.
pub const PROBE_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between pings of the configured health-check URL.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outbound HTTP timeout for request tasks.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Capacity of the notification queue. Overflowing messages are dropped.
pub const NOTIFICATION_QUEUE_SIZE: usize = 20;

/// Interval at which the key/value store persists dirty state.
pub const KV_PERSIST_INTERVAL: Duration = Duration::from_secs(60);

/// Floor for motion detection snapshot intervals.
pub const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

/// Exit code instructing an external supervisor to reboot the host.
pub const EXIT_CODE_REBOOT: i32 = 2;

/// Name layout of a day directory inside the recording area.
pub const DAY_DIR_FORMAT: &str = "rec_%Y_%m_%d";

/// Time prefix layout of a segment file inside a day directory.
pub const SEGMENT_TIME_FORMAT: &str = "%H_%M_%S_";

/// Timestamp layout used for snapshot file names and `${{ _now }}` expansion.
pub const COMPACT_TIME_FORMAT: &str = "%Y_%m_%d_%H_%M_%S";

/// Recording area used when the configuration does not name one.
pub const DEFAULT_VIDEOS_DIR: &str = "./cameras";

/// Encoder binary used when the configuration does not name one.
pub const DEFAULT_FFMPEG: &str = "/usr/local/bin/ffmpeg";

/// Segment length used when the configuration does not specify one.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60 * 60);

/// Grace between cooperative and forced encoder termination.
pub const DEFAULT_TERMINATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Days of recordings kept when the configuration does not specify.
pub const DEFAULT_DELETE_AFTER_DAYS: i64 = 20;

/// Bind address of the admin server when the configuration does not name one.
pub const DEFAULT_ADMIN_ADDR: &str = ":80";

/// Key under which a pending recording pause is persisted.
pub const PAUSE_KEY: &str = "pause";

/// Keys under which monitor chat identifiers are persisted.
pub const MONITOR_KEYS: [&str; 2] = ["monitors", "user-monitors"];
