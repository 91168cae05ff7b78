//! Slp2Mp4Converter - slp2mp4 + ffmpeg による変換手続き
//!
//! # フロー
//! 1. 作業ディレクトリを作る（TempDir、drop で削除される）
//! 2. `slp2mp4 --output-directory <dir> single <input>` で mp4 を出力
//! 3. 出力がちょうど 1 ファイルであることを確認
//! 4. ffmpeg blackdetect で末尾の黒画面を検出し、あれば `-c copy` で切り詰める
//! 5. 結果をメモリに読み込む（作業ディレクトリはここで消える）

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use ulid::Ulid;

use super::blackdetect;
use crate::config::ConverterConfig;
use crate::domain::{ConversionError, InputRef};
use crate::ports::Converter;

/// Resolved locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub slp2mp4: PathBuf,
    pub ffmpeg: PathBuf,
}

/// Converts `.slp` replays to mp4 using the slp2mp4 CLI and ffmpeg.
pub struct Slp2Mp4Converter {
    config: ConverterConfig,
}

impl Slp2Mp4Converter {
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Check that both tools can be found.
    pub fn check_tools(&self) -> Result<ToolPaths, ConversionError> {
        Ok(ToolPaths {
            slp2mp4: resolve(&self.config.slp2mp4_bin)?,
            ffmpeg: resolve(&self.config.ffmpeg_bin)?,
        })
    }

    async fn convert_in(
        &self,
        tools: &ToolPaths,
        input: &Path,
        workdir: &Path,
    ) -> Result<Vec<u8>, ConversionError> {
        let rendered = self.render(tools, input, workdir).await?;
        let video = self.trim_trailing_black(tools, &rendered, workdir).await?;
        Ok(tokio::fs::read(&video).await?)
    }

    async fn render(
        &self,
        tools: &ToolPaths,
        input: &Path,
        workdir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let args: Vec<OsString> = vec![
            "--output-directory".into(),
            workdir.as_os_str().to_owned(),
            "single".into(),
            input.as_os_str().to_owned(),
        ];
        let output = run(&tools.slp2mp4, &args).await?;
        check_status(&tools.slp2mp4, &output)?;

        single_output(workdir).await
    }

    async fn trim_trailing_black(
        &self,
        tools: &ToolPaths,
        video: &Path,
        workdir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        let args = blackdetect::detect_args(
            video,
            self.config.black_min_duration,
            self.config.black_pixel_threshold,
        );
        let output = run(&tools.ffmpeg, &args).await?;
        if !output.status.success() {
            // 検出に失敗しても変換自体は成功しているので、そのまま返す
            warn!(code = ?output.status.code(), "blackdetect failed, keeping video untrimmed");
            return Ok(video.to_path_buf());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let Some(cut_at) = blackdetect::last_black_start(&stderr) else {
            debug!("no trailing black detected");
            return Ok(video.to_path_buf());
        };

        info!(cut_at, "trimming trailing black");
        let trimmed = workdir.join(format!("{}.mp4", Ulid::new()));
        let output = run(&tools.ffmpeg, &blackdetect::trim_args(video, cut_at, &trimmed)).await?;
        check_status(&tools.ffmpeg, &output)?;
        Ok(trimmed)
    }

    async fn create_workdir(&self) -> Result<tempfile::TempDir, ConversionError> {
        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let parent = self.config.work_dir.clone();
        let workdir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix("convert-").tempdir_in(parent)
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(workdir)
    }
}

#[async_trait]
impl Converter for Slp2Mp4Converter {
    async fn convert(&self, input: &InputRef) -> Result<Vec<u8>, ConversionError> {
        let tools = self.check_tools()?;
        let workdir = self.create_workdir().await?;
        debug!(workdir = %workdir.path().display(), input = %input, "converting");

        let result = self.convert_in(&tools, input.path(), workdir.path()).await;

        // 動画 1 本分を消すので blocking pool で
        match tokio::task::spawn_blocking(move || workdir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "failed to remove working directory"),
            Err(e) => warn!(error = %e, "working directory cleanup task failed"),
        }
        // 失敗時は調査できるよう入力を残す
        if self.config.remove_input
            && result.is_ok()
            && let Err(e) = tokio::fs::remove_file(input.path()).await
        {
            warn!(input = %input, error = %e, "failed to remove input");
        }

        result
    }
}

fn resolve(bin: &Path) -> Result<PathBuf, ConversionError> {
    which::which(bin).map_err(|_| ConversionError::ToolNotFound(bin.display().to_string()))
}

async fn run(program: &Path, args: &[OsString]) -> Result<Output, ConversionError> {
    debug!(program = %program.display(), ?args, "spawning");
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ConversionError::Spawn {
            program: program.display().to_string(),
            source,
        })
}

fn check_status(program: &Path, output: &Output) -> Result<(), ConversionError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let tail: String = stderr
        .lines()
        .rev()
        .take(20)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<Vec<_>>()
        .join("\n");
    Err(ConversionError::exit_status(
        program.display().to_string(),
        output.status.code(),
        (!tail.is_empty()).then_some(tail),
    ))
}

/// The only file slp2mp4 wrote, hidden files included.
async fn single_output(dir: &Path) -> Result<PathBuf, ConversionError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        files.push(entry.path());
    }

    match files.as_slice() {
        [only] => Ok(only.clone()),
        _ => {
            warn!(dir = %dir.display(), ?files, "unexpected slp2mp4 output");
            Err(ConversionError::UnexpectedOutputCount {
                dir: dir.to_path_buf(),
                found: files.len(),
            })
        }
    }
}
