use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use engine::{
    Command, EditSession, FfmpegMediaBackend, FlowStep, SessionSnapshot, Settings, TargetId,
    Workflow, format_clock, seconds_to_ticks, ticks_to_seconds,
};
use placement_api::PlacementClient;
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

type Session = EditSession<FfmpegMediaBackend, PlacementClient>;

#[derive(Parser)]
#[command(name = "placement")]
#[command(about = "Headless client for the product placement service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Place a product from a text prompt via /process-video
    Process {
        #[arg(long)]
        video: PathBuf,

        /// Reference image of the product
        #[arg(long)]
        image: Option<PathBuf>,

        #[arg(long, default_value = "")]
        prompt: String,

        /// Where to write the result video
        #[arg(short, long)]
        out: PathBuf,

        /// Clip start in seconds
        #[arg(long)]
        start: Option<f64>,

        /// Clip end in seconds
        #[arg(long)]
        end: Option<f64>,
    },

    /// Detect replaceable objects via /analyze and print them as JSON
    Analyze {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Analyze, keep the chosen targets, then render via /generate
    Generate {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        image: PathBuf,

        #[arg(short, long)]
        out: PathBuf,

        /// Target ids from `analyze` to keep; all targets when omitted
        #[arg(long = "only")]
        only: Vec<TargetId>,
    },

    /// Re-encode a clip locally without contacting the service
    Trim {
        #[arg(long)]
        video: PathBuf,

        #[arg(long)]
        start: f64,

        #[arg(long)]
        end: f64,

        #[arg(short, long)]
        out: PathBuf,
    },

    /// Check that the service is reachable
    Health,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings()?;
    match cli.command {
        Commands::Process {
            video,
            image,
            prompt,
            out,
            start,
            end,
        } => process(&settings, video, image, prompt, &out, start, end),
        Commands::Analyze { video, image } => analyze(&settings, video, image),
        Commands::Generate {
            video,
            image,
            out,
            only,
        } => generate(&settings, video, image, &out, &only),
        Commands::Trim {
            video,
            start,
            end,
            out,
        } => trim(&settings, &video, start, end, &out),
        Commands::Health => health(&settings),
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_settings() -> Result<Settings> {
    let settings = Settings::load().context("failed to load settings")?;
    settings
        .validate()
        .map_err(|reason| anyhow::anyhow!("invalid settings: {reason}"))?;
    debug!(base_url = %settings.api.base_url, "settings loaded");
    Ok(settings)
}

fn open_session(
    settings: &Settings,
    workflow: Workflow,
    video: PathBuf,
    image: Option<PathBuf>,
) -> Result<Session> {
    let mut session =
        EditSession::from_settings(settings).context("failed to create edit session")?;
    session.handle_command(Command::SetWorkflow { workflow })?;
    session
        .handle_command(Command::SelectVideo {
            path: video.clone(),
        })
        .with_context(|| format!("failed to open {}", video.display()))?;
    session.handle_command(Command::SelectImage { path: image })?;
    Ok(session)
}

/// Applies `--start/--end`; a short or reversed range fails before any upload.
fn select_range(session: &mut Session, start: Option<f64>, end: Option<f64>) -> Result<()> {
    session
        .handle_command(Command::SetClipRange {
            start_tl: start.map(seconds_to_ticks),
            end_tl: end.map(seconds_to_ticks),
        })
        .context("invalid clip range")?;

    if let Some(clip) = session.snapshot().clip {
        info!(
            start = %format_clock(clip.start_tl()),
            end = %format_clock(clip.end_tl()),
            "clip range selected"
        );
    }
    Ok(())
}

fn save_result(snapshot: &SessionSnapshot, out: &Path) -> Result<()> {
    if snapshot.step != FlowStep::Result {
        bail!("the service did not return a video");
    }
    let Some(result) = &snapshot.result_video else {
        bail!("the service did not return a video");
    };
    fs::copy(result, out)
        .with_context(|| format!("failed to write result to {}", out.display()))?;

    if let Some(note) = &snapshot.note {
        println!("{note}");
    }
    println!("result written to {}", out.display());
    Ok(())
}

fn process(
    settings: &Settings,
    video: PathBuf,
    image: Option<PathBuf>,
    prompt: String,
    out: &Path,
    start: Option<f64>,
    end: Option<f64>,
) -> Result<()> {
    let mut session = open_session(settings, Workflow::Prompt, video, image)?;
    if start.is_some() || end.is_some() {
        session.handle_command(Command::SetTrimBeforeUpload { enabled: true })?;
        select_range(&mut session, start, end)?;
    }
    session.handle_command(Command::SetPrompt { text: prompt })?;
    session
        .handle_command(Command::Submit)
        .context("processing failed")?;

    save_result(&session.snapshot(), out)
}

fn analyze(settings: &Settings, video: PathBuf, image: Option<PathBuf>) -> Result<()> {
    let mut session = open_session(settings, Workflow::Reference, video, image)?;
    session
        .handle_command(Command::Submit)
        .context("analysis failed")?;

    let snapshot = session.snapshot();
    println!("{}", serde_json::to_string_pretty(&detection_json(&snapshot))?);
    Ok(())
}

fn detection_json(snapshot: &SessionSnapshot) -> serde_json::Value {
    let items: Vec<_> = snapshot
        .targets
        .iter()
        .map(|target| {
            let timestamps: Vec<_> = target
                .spans
                .iter()
                .map(|span| [span.start_time, span.end_time])
                .collect();
            json!({
                "id": target.id,
                "label": target.label,
                "description": target.description,
                "timestamps": timestamps,
                "visible_seconds": target.visible_seconds,
            })
        })
        .collect();

    json!({
        "target": snapshot.target_description,
        "items": items,
        "note": snapshot.note,
    })
}

fn generate(
    settings: &Settings,
    video: PathBuf,
    image: PathBuf,
    out: &Path,
    only: &[TargetId],
) -> Result<()> {
    let mut session = open_session(settings, Workflow::Reference, video, Some(image))?;
    session
        .handle_command(Command::Submit)
        .context("analysis failed")?;

    let snapshot = session.snapshot();
    if snapshot.targets.is_empty() {
        bail!(
            "{}",
            snapshot
                .note
                .unwrap_or_else(|| "no targets were detected".to_owned())
        );
    }
    for id in targets_to_drop(&snapshot, only)? {
        session.handle_command(Command::ToggleTarget { id })?;
    }

    session
        .handle_command(Command::Generate)
        .context("generation failed")?;
    save_result(&session.snapshot(), out)
}

/// Ids to deselect so that only `keep` remains; an empty `keep` keeps all.
fn targets_to_drop(snapshot: &SessionSnapshot, keep: &[TargetId]) -> Result<Vec<TargetId>> {
    if keep.is_empty() {
        return Ok(Vec::new());
    }

    let known: BTreeSet<_> = snapshot.targets.iter().map(|target| target.id).collect();
    if let Some(unknown) = keep.iter().find(|id| !known.contains(id)) {
        bail!("unknown target id {unknown}");
    }
    Ok(snapshot
        .targets
        .iter()
        .filter(|target| target.selected && !keep.contains(&target.id))
        .map(|target| target.id)
        .collect())
}

fn trim(settings: &Settings, video: &Path, start: f64, end: f64, out: &Path) -> Result<()> {
    let outcome = engine::trim::extract_clip(
        &settings.media_backend(),
        video,
        seconds_to_ticks(start),
        seconds_to_ticks(end),
        settings.session_config().min_clip_tl,
        out,
    )?;

    println!(
        "wrote {} ({:.2}s - {:.2}s, {} bytes)",
        outcome.output.display(),
        ticks_to_seconds(outcome.range.start_tl()),
        ticks_to_seconds(outcome.range.end_tl()),
        outcome.bytes
    );
    Ok(())
}

fn health(settings: &Settings) -> Result<()> {
    let client = settings.client()?;
    let status = client
        .health()
        .with_context(|| format!("{} is not reachable", client.base_url()))?;
    println!("{}: {}", client.base_url(), status.status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use engine::{FlowStep, SessionSnapshot, TargetSummary, Workflow};

    use super::{Cli, Commands, targets_to_drop};

    fn snapshot(targets: &[(u64, bool)]) -> SessionSnapshot {
        SessionSnapshot {
            step: FlowStep::Select,
            workflow: Workflow::Reference,
            prompt: String::new(),
            video: None,
            image: None,
            result_video: None,
            duration_tl: None,
            clip: None,
            min_clip_tl: 2_000_000,
            playhead_tl: 0,
            playing: false,
            volume: 1.0,
            trim_before_upload: true,
            target_description: None,
            targets: targets
                .iter()
                .map(|&(id, selected)| TargetSummary {
                    id,
                    label: format!("item {id}"),
                    description: String::new(),
                    spans: Vec::new(),
                    visible_seconds: 0.0,
                    selected,
                })
                .collect(),
            note: None,
            error: None,
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_accepts_repeated_only_flags() {
        let cli = Cli::try_parse_from([
            "placement", "generate", "--video", "in.mp4", "--image", "can.png", "--out",
            "out.mp4", "--only", "1", "--only", "3",
        ])
        .expect("parse");

        let Commands::Generate { only, .. } = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(only, vec![1, 3]);
    }

    #[test]
    fn only_list_deselects_every_other_target() {
        let snapshot = snapshot(&[(1, true), (2, true), (3, true)]);

        let dropped = targets_to_drop(&snapshot, &[2]).expect("known ids");

        assert_eq!(dropped, vec![1, 3]);
    }

    #[test]
    fn empty_only_list_keeps_everything_and_unknown_ids_fail() {
        let snapshot = snapshot(&[(1, true), (2, true)]);

        assert!(targets_to_drop(&snapshot, &[]).expect("empty").is_empty());
        assert!(targets_to_drop(&snapshot, &[9]).is_err());
    }
}
