//! replaycast - convert Slippi replays to mp4.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use replaycast_core::{
    ConverterConfig, ManagerBuilder, ManagerConfig, Slp2Mp4Converter, SubmitError, TaskId,
    TaskManager, TaskStatus,
};

#[derive(Debug, Parser)]
#[command(name = "replaycast", version, about = "Convert Slippi replays to mp4")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Convert one replay and wait for the video.
    Convert {
        input: PathBuf,

        /// Output file (default: processed_<stem>.mp4 next to the input).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Queue several replays and poll until every one has finished.
    Batch {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(long, env = "REPLAYCAST_OUT_DIR", default_value = ".")]
        out_dir: PathBuf,

        #[arg(
            long,
            env = "REPLAYCAST_POLL_MS",
            default_value_t = 500,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        poll_ms: u64,
    },

    /// Report whether slp2mp4 and ffmpeg can be found.
    Check,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("replaycast=info,replaycast_core=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // ユーザーのファイルなので変換後も消さない
    let converter_config = ConverterConfig {
        remove_input: false,
        ..ConverterConfig::from_env()
    };
    let converter = Slp2Mp4Converter::new(converter_config);

    match cli.command {
        Command::Check => check(&converter),
        Command::Convert { input, output } => {
            let output = match output {
                Some(output) => output,
                None => input.with_file_name(output_name(&input)?),
            };
            let manager = build_manager(converter)?;
            manager.start().await?;
            let outcome = with_ctrl_c(&manager, convert_one(&manager, &input, &output)).await;
            manager.stop().await;
            outcome
        }
        Command::Batch {
            inputs,
            out_dir,
            poll_ms,
        } => {
            let manager = build_manager(converter)?;
            manager.start().await?;
            let outcome = with_ctrl_c(
                &manager,
                batch(&manager, &inputs, &out_dir, Duration::from_millis(poll_ms)),
            )
            .await;
            manager.stop().await;
            outcome
        }
    }
}

fn build_manager(converter: Slp2Mp4Converter) -> anyhow::Result<TaskManager> {
    let manager = ManagerBuilder::new()
        .config(ManagerConfig::from_env())
        .converter(converter)
        .build()?;
    info!(config = ?manager.config(), "manager config");
    Ok(manager)
}

/// Run `work` unless ctrl-c arrives first.
async fn with_ctrl_c(
    manager: &TaskManager,
    work: impl Future<Output = anyhow::Result<()>>,
) -> anyhow::Result<()> {
    tokio::select! {
        outcome = work => outcome,
        _ = tokio::signal::ctrl_c() => {
            warn!(queued = manager.queue_depth().await, "interrupted, shutting down");
            bail!("interrupted")
        }
    }
}

fn check(converter: &Slp2Mp4Converter) -> anyhow::Result<()> {
    let tools = converter.check_tools()?;
    println!("slp2mp4: {}", tools.slp2mp4.display());
    println!("ffmpeg:  {}", tools.ffmpeg.display());
    Ok(())
}

async fn convert_one(manager: &TaskManager, input: &Path, output: &Path) -> anyhow::Result<()> {
    ensure_replay(input)?;
    let name = file_name(output);
    let result = manager.convert(input.to_path_buf(), name).await?;
    tokio::fs::write(output, result.payload())
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    info!(output = %output.display(), bytes = result.len(), "video written");
    Ok(())
}

async fn batch(
    manager: &TaskManager,
    inputs: &[PathBuf],
    out_dir: &Path,
    poll_interval: Duration,
) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let replays: Vec<PathBuf> = inputs
        .iter()
        .filter(|input| match ensure_replay(input) {
            Ok(()) => true,
            Err(e) => {
                warn!(input = %input.display(), "{e}");
                false
            }
        })
        .cloned()
        .collect();
    let planned = plan_outputs(&replays, out_dir)?;

    let mut submitted: Vec<(TaskId, PathBuf)> = Vec::new();
    for (input, output) in planned {
        let name = file_name(&output);
        match manager.submit(input.clone(), name).await {
            Ok(task_id) => {
                println!("{task_id}  queued  {}", input.display());
                submitted.push((task_id, output));
            }
            Err(SubmitError::QueueFull { capacity }) => {
                println!("-  rejected  {} (queue full, capacity {capacity})", input.display());
            }
            Err(e) => return Err(e.into()),
        }
    }

    let mut failed = 0usize;
    let mut ticker = tokio::time::interval(poll_interval);
    while !submitted.is_empty() {
        ticker.tick().await;

        let mut still_open = Vec::with_capacity(submitted.len());
        for (task_id, output) in submitted {
            match manager.status(task_id).await {
                Some(TaskStatus::Succeeded(result)) => {
                    tokio::fs::write(&output, result.payload())
                        .await
                        .with_context(|| format!("failed to write {}", output.display()))?;
                    println!("{task_id}  done    {}", output.display());
                }
                Some(TaskStatus::Failed { reason }) => {
                    failed += 1;
                    println!("{task_id}  failed  {reason}");
                }
                Some(TaskStatus::Pending | TaskStatus::Running) => still_open.push((task_id, output)),
                None => {
                    failed += 1;
                    println!("{task_id}  evicted before it could be collected");
                }
            }
        }
        submitted = still_open;
    }

    let stats = manager.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    if failed > 0 {
        bail!("{failed} conversion(s) failed");
    }
    Ok(())
}

/// Output path for every input; two inputs mapping to the same file is an error.
fn plan_outputs(inputs: &[PathBuf], out_dir: &Path) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut planned = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = out_dir.join(output_name(input)?);
        if let Some(first) = claimed.insert(output.clone(), input) {
            bail!(
                "{} and {} would both be written to {}",
                first.display(),
                input.display(),
                output.display()
            );
        }
        planned.push((input.clone(), output));
    }
    Ok(planned)
}

fn ensure_replay(input: &Path) -> anyhow::Result<()> {
    let is_slp = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("slp"));
    if !is_slp {
        bail!("{} is not a .slp replay", input.display());
    }
    if !input.is_file() {
        bail!("{} does not exist", input.display());
    }
    Ok(())
}

/// `processed_<stem>.mp4`
fn output_name(input: &Path) -> anyhow::Result<String> {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("cannot derive an output name from {}", input.display()))?;
    Ok(format!("processed_{stem}.mp4"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_the_processed_prefix() {
        assert_eq!(
            output_name(Path::new("/replays/Game_20240101T120000.slp")).unwrap(),
            "processed_Game_20240101T120000.mp4"
        );
    }

    #[test]
    fn only_slp_files_are_accepted() {
        let err = ensure_replay(Path::new("clip.mp4")).unwrap_err();
        assert!(err.to_string().contains("not a .slp replay"));
    }

    #[test]
    fn missing_replay_is_reported() {
        let err = ensure_replay(Path::new("/nonexistent/game.SLP")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn batch_outputs_land_in_out_dir() {
        let inputs = vec![PathBuf::from("a/game1.slp"), PathBuf::from("b/game2.slp")];
        let planned = plan_outputs(&inputs, Path::new("out")).unwrap();
        assert_eq!(
            planned,
            vec![
                (inputs[0].clone(), PathBuf::from("out/processed_game1.mp4")),
                (inputs[1].clone(), PathBuf::from("out/processed_game2.mp4")),
            ]
        );
    }

    #[test]
    fn batch_rejects_inputs_sharing_an_output() {
        let inputs = vec![PathBuf::from("dir1/game.slp"), PathBuf::from("dir2/game.slp")];
        let err = plan_outputs(&inputs, Path::new("out")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("dir1/game.slp") && msg.contains("dir2/game.slp"));
        assert!(msg.contains("processed_game.mp4"));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let parsed = Cli::try_parse_from(["replaycast", "batch", "a.slp", "--poll-ms", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_parses_batch_arguments() {
        let cli = Cli::try_parse_from(["replaycast", "batch", "a.slp", "b.slp", "--poll-ms", "50"]).unwrap();
        match cli.command {
            Command::Batch { inputs, poll_ms, .. } => {
                assert_eq!(inputs.len(), 2);
                assert_eq!(poll_ms, 50);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
