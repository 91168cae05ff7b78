//! ffmpeg `blackdetect` helpers for trimming the black screen slp2mp4 leaves
//! at the end of a render.

use std::ffi::OsString;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static BLACK_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"black_start:(\d+(?:\.\d+)?)").expect("valid regex"));

/// Arguments for a detection pass that writes nothing but ffmpeg's log.
pub fn detect_args(video: &Path, min_duration: f64, pixel_threshold: f64) -> Vec<OsString> {
    vec![
        "-nostdin".into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-vf".into(),
        format!("blackdetect=d={min_duration}:pic_th={pixel_threshold}").into(),
        "-an".into(),
        "-f".into(),
        "null".into(),
        "-".into(),
    ]
}

/// Arguments for a stream-copy trim that keeps the first `seconds`.
pub fn trim_args(video: &Path, seconds: f64, output: &Path) -> Vec<OsString> {
    vec![
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        video.as_os_str().to_owned(),
        "-t".into(),
        format!("{seconds:.3}").into(),
        "-c".into(),
        "copy".into(),
        output.as_os_str().to_owned(),
    ]
}

/// Start (seconds) of the last black stretch in a blackdetect log.
///
/// A stretch starting at 0 means the whole video is black; trimming there
/// would leave nothing, so it is ignored.
pub fn last_black_start(stderr: &str) -> Option<f64> {
    BLACK_START
        .captures_iter(stderr)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .last()
        .filter(|start| *start > 0.0)
}
