//! ghostwrite demo binary.
//!
//! Previews a scripted rewrite of part of a text file, then accepts, rejects
//! or cancels it. No model is involved: the "AI" upper-cases, lower-cases,
//! reverses or title-cases the selection and streams it back word by word.
//!
//! Usage:
//!   # Stream an upper-cased rewrite of characters 10..42 and accept it
//!   cargo run -p ghostwrite-cli -- notes.txt --from 10 --to 42
//!
//!   # Batch request, reject the result
//!   cargo run -p ghostwrite-cli -- notes.txt --mode batch --decision reject
//!
//!   # Custom settings (see crates/ghostwrite-core/assets/preview.rhai)
//!   cargo run -p ghostwrite-cli -- notes.txt --config preview.rhai
//!
//! The resulting document goes to stdout; logs go to stderr (`RUST_LOG`).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::StreamExt;
use ghostwrite_core::{
    AdapterContext, Adapters, AiConfig, AiOrchestrator, ChunkStream, DEFAULT_CONFIG_SCRIPT,
    HostHooks, OrchestratorSettings, PreviewController, batch_fn, bind_editor,
    load_preview_config, streaming_fn,
};
use ghostwrite_doc::{DecorationBridge, DocumentHost, TextDocument};
use ghostwrite_types::{PreviewStatus, RequestMode, SelectionPayload};
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt};

/// Preview a scripted rewrite of a text range.
#[derive(Parser, Debug)]
#[command(name = "ghostwrite")]
#[command(about = "Preview a scripted AI-style rewrite of a text range")]
struct Args {
    /// File to edit
    file: PathBuf,

    /// Start of the selection (character offset)
    #[arg(long, default_value_t = 0)]
    from: usize,

    /// End of the selection (character offset, exclusive). Defaults to end of file
    #[arg(long)]
    to: Option<usize>,

    /// Request mode: stream or batch
    #[arg(long, default_value = "stream", value_parser = parse_mode)]
    mode: RequestMode,

    /// Rhai settings script
    #[arg(long)]
    config: Option<PathBuf>,

    /// What to do with the preview once it is ready
    #[arg(long, value_enum, default_value_t = Decision::Accept)]
    decision: Decision,

    /// Rewrite the scripted adapter applies
    #[arg(long, value_enum, default_value_t = Transform::Upper)]
    transform: Transform,

    /// Delay before each streamed word (and before the batch reply)
    #[arg(long, default_value_t = 40)]
    delay_ms: u64,

    /// Undo the applied suggestion before printing
    #[arg(long)]
    undo: bool,

    /// Write the result back to the file instead of stdout
    #[arg(long)]
    write: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Decision {
    Accept,
    Reject,
    Cancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Transform {
    Upper,
    Lower,
    Reverse,
    Title,
}

impl Transform {
    fn apply(self, text: &str) -> String {
        match self {
            Transform::Upper => text.to_uppercase(),
            Transform::Lower => text.to_lowercase(),
            Transform::Reverse => text.chars().rev().collect(),
            Transform::Title => text
                .split_inclusive(char::is_whitespace)
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars).collect(),
                        None => String::new(),
                    }
                })
                .collect(),
        }
    }
}

fn parse_mode(s: &str) -> Result<RequestMode, String> {
    RequestMode::from_str(s).ok_or_else(|| format!("unknown mode '{s}' (expected stream or batch)"))
}

/// Adapters that rewrite the selection locally.
fn scripted_adapters(transform: Transform, delay: Duration) -> Adapters {
    let streaming = streaming_fn(move |payload: SelectionPayload, ctx: AdapterContext| async move {
        let words: Vec<String> = transform
            .apply(&payload.text)
            .split_inclusive(char::is_whitespace)
            .map(str::to_string)
            .collect();
        tracing::debug!(words = words.len(), "streaming scripted rewrite");

        let stream = futures::stream::iter(words).then(move |word| {
            let abort = ctx.abort.clone();
            async move {
                tokio::select! {
                    _ = abort.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
                Ok::<_, anyhow::Error>(json!({ "delta": word }))
            }
        });
        Ok::<ChunkStream, anyhow::Error>(stream.boxed())
    });

    let batch = batch_fn(move |payload: SelectionPayload, _ctx| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, anyhow::Error>(json!({ "text": transform.apply(&payload.text) }))
    });

    Adapters::none().with_streaming(streaming).with_batch(batch)
}

fn load_settings(path: Option<&PathBuf>) -> Result<OrchestratorSettings> {
    let Some(path) = path else {
        return Ok(load_preview_config(DEFAULT_CONFIG_SCRIPT)?);
    };
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    load_preview_config(&script).with_context(|| format!("invalid config {}", path.display()))
}

#[tokio::main]
async fn main() -> ExitCode {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(PreviewStatus::Error) => ExitCode::FAILURE,
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<PreviewStatus> {
    let settings = load_settings(args.config.as_ref())?;

    let text = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let doc = Arc::new(TextDocument::new(&text));
    let to = args.to.unwrap_or_else(|| doc.len());
    let selected = doc
        .text_between(args.from, to)
        .with_context(|| format!("selection {}..{to} is outside the document", args.from))?;
    let selection = SelectionPayload::new(selected)
        .with_range(json!({ "from": args.from, "to": to }))
        .with_version(doc.version());

    let adapters = scripted_adapters(args.transform, Duration::from_millis(args.delay_ms));
    let orchestrator = Arc::new(AiOrchestrator::new(
        AiConfig::new(adapters).with_settings(settings),
    ));
    let controller = PreviewController::new(orchestrator);

    let bridge = Arc::new(DecorationBridge::new(doc.clone()));
    let hooks = HostHooks::new()
        .on_preview_update(|preview| {
            tracing::info!(preview = preview.content().unwrap_or_default(), "preview updated")
        })
        .on_error(|error| tracing::error!(error = %error, "suggestion failed"))
        .on_cancel(|reason| tracing::info!(reason, "suggestion cancelled"));
    let binding = bind_editor(&controller, bridge, hooks);
    let _states = controller.subscribe(|state| tracing::debug!(status = %state.status, "preview state"));

    tracing::info!(mode = %args.mode, from = args.from, to, "requesting suggestion");
    controller.send_selection(selection, args.mode).await;

    if controller.get_state().status == PreviewStatus::Preview {
        match args.decision {
            Decision::Accept => controller.accept(),
            Decision::Reject => controller.reject(),
            Decision::Cancel => controller.cancel(Some("declined from the command line")),
        }
    }

    if args.undo && !binding.undo_last_apply() {
        tracing::warn!("nothing to undo");
    }

    let status = controller.get_state().status;
    let result = doc.text();
    binding.dispose();
    controller.destroy();

    if args.write {
        std::fs::write(&args.file, &result)
            .with_context(|| format!("failed to write {}", args.file.display()))?;
        tracing::info!(status = %status, file = %args.file.display(), "document written");
    } else {
        print!("{result}");
    }
    Ok(status)
}
