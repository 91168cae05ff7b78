//! Configuration for the task manager and the slp2mp4 converter.
//!
//! Both structs have sane defaults, deserialize from any serde source
//! (durations are whole seconds), and can be read from `REPLAYCAST_*`
//! environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::store::RetentionPolicy;

/// Task manager configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Maximum number of pending tasks.
    pub max_queue_size: usize,

    /// Number of workers pulling from the queue.
    pub workers: usize,

    /// Upper bound for one conversion; `None` waits forever.
    #[serde(with = "duration_secs_opt")]
    pub conversion_timeout: Option<Duration>,

    /// How long finished tasks stay pollable.
    pub retention: RetentionPolicy,

    /// How often the eviction loop sweeps expired results.
    #[serde(with = "duration_secs")]
    pub eviction_interval: Duration,

    /// How long `stop()` waits for in-flight conversions before aborting them.
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            workers: 1,
            conversion_timeout: Some(Duration::from_secs(15 * 60)),
            retention: RetentionPolicy::default(),
            eviction_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl ManagerConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// A value of `0` for a timeout or retention bound disables it.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_queue_size: env_parse("REPLAYCAST_MAX_QUEUE_SIZE").unwrap_or(defaults.max_queue_size),
            workers: env_parse("REPLAYCAST_WORKERS").unwrap_or(defaults.workers),
            conversion_timeout: env_secs_opt("REPLAYCAST_CONVERSION_TIMEOUT_SECS")
                .unwrap_or(defaults.conversion_timeout),
            retention: RetentionPolicy {
                ttl: env_secs_opt("REPLAYCAST_RESULT_TTL_SECS").unwrap_or(defaults.retention.ttl),
                max_entries: env_parse::<usize>("REPLAYCAST_MAX_RETAINED_RESULTS")
                    .map(|n| (n > 0).then_some(n))
                    .unwrap_or(defaults.retention.max_entries),
            },
            eviction_interval: env_parse("REPLAYCAST_EVICTION_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.eviction_interval),
            shutdown_grace: env_parse("REPLAYCAST_SHUTDOWN_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_grace),
        }
    }
}

/// slp2mp4 / ffmpeg conversion settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub slp2mp4_bin: PathBuf,
    pub ffmpeg_bin: PathBuf,

    /// Parent of the per-task working directories.
    pub work_dir: PathBuf,

    /// Minimum black stretch (seconds) reported by `blackdetect`.
    pub black_min_duration: f64,

    /// `blackdetect` pixel threshold (0.0..=1.0).
    pub black_pixel_threshold: f64,

    /// Delete the input replay once it has been converted.
    pub remove_input: bool,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            slp2mp4_bin: PathBuf::from("slp2mp4"),
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            work_dir: std::env::temp_dir().join("replaycast"),
            black_min_duration: 0.5,
            black_pixel_threshold: 0.98,
            remove_input: true,
        }
    }
}

impl ConverterConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            slp2mp4_bin: env_parse("REPLAYCAST_SLP2MP4_BIN").unwrap_or(defaults.slp2mp4_bin),
            ffmpeg_bin: env_parse("REPLAYCAST_FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            work_dir: env_parse("REPLAYCAST_WORK_DIR").unwrap_or(defaults.work_dir),
            black_min_duration: env_parse("REPLAYCAST_BLACK_MIN_DURATION")
                .unwrap_or(defaults.black_min_duration),
            black_pixel_threshold: env_parse("REPLAYCAST_BLACK_PIXEL_THRESHOLD")
                .unwrap_or(defaults.black_pixel_threshold),
            remove_input: env_parse("REPLAYCAST_REMOVE_INPUT").unwrap_or(defaults.remove_input),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// `Some(None)` for an explicit `0`, `None` when unset or unparsable.
fn env_secs_opt(key: &str) -> Option<Option<Duration>> {
    env_parse::<u64>(key).map(|secs| (secs > 0).then(|| Duration::from_secs(secs)))
}

pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

pub(crate) mod duration_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    /// `null` or `0` disables the bound.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs))
    }
}

pub(crate) mod count_opt {
    use serde::{Deserialize, Deserializer};

    /// `null` or `0` disables the bound.
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<usize>, D::Error> {
        Ok(Option::<usize>::deserialize(d)?.filter(|n| *n > 0))
    }
}
