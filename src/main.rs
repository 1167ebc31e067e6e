mod script;

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use capture_agent::{AgentConfig, CaptureAgent};
use capture_core::host::{Host, HostEvent};
use capture_core::sim::{MemoryArtifactStore, SimulatedCapture, SimulatedDocument};
use capture_router::{forward_host_events, run, AgentInput, ChannelPort};
use capture_telemetry::{init_telemetry, parse_level, parse_module_level, TelemetryConfig};
use clap::Parser;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::script::ScriptLine;

/// Drive one canvas capture agent over newline-delimited JSON on stdio.
#[derive(Debug, Parser)]
#[command(name = "canvas-capture", version)]
struct Cli {
    /// Settings file (JSON, camelCase keys).
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Directory that receives downloaded recordings.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Per-module override such as `capture_agent=debug`. Repeatable.
    #[arg(long = "module-level")]
    module_levels: Vec<String>,
    /// Log JSON lines instead of human-readable output.
    #[arg(long)]
    json_logs: bool,
    /// Size of each synthetic chunk the simulated encoder produces.
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level =
        parse_level(&cli.log_level).ok_or_else(|| anyhow!("unknown log level: {}", cli.log_level))?;
    let module_levels = cli
        .module_levels
        .iter()
        .map(|s| parse_module_level(s).ok_or_else(|| anyhow!("invalid module level: {s}")))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let telemetry = init_telemetry(TelemetryConfig {
        log_level,
        module_levels,
        json: cli.json_logs,
    });

    let settings =
        capture_settings::load_settings(cli.settings.as_deref()).context("failed to load settings")?;
    let config = AgentConfig::from(&settings);
    info!(
        max_video_size = config.max_video_size,
        fps = config.frames_per_second,
        mime_type = %config.mime_type,
        "settings loaded"
    );

    let store = match &cli.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            MemoryArtifactStore::with_output_dir(dir)
        }
        None => MemoryArtifactStore::new(),
    };

    let document = SimulatedDocument::new();
    let (inputs, input_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let _forwarder = forward_host_events(event_rx, inputs.clone());
    let capture = SimulatedCapture::new(document.clone()).with_chunk_pump(event_tx, cli.chunk_size);

    let (port, mut outbound) = ChannelPort::channel();
    let agent = CaptureAgent::new(config, Host::new(document.clone(), capture, store), port);
    let cancel = CancellationToken::new();
    let agent_task = tokio::spawn(run(agent, input_rx, cancel.clone()));

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(envelope) = outbound.recv().await {
            let line = match envelope.to_json() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            };
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
    loop {
        let line = tokio::select! {
            line = lines.next() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        };
        let line = match line {
            Some(Ok(line)) => line,
            Some(Err(e)) => {
                warn!(error = %e, "failed to read input line");
                continue;
            }
            None => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        match script::classify(line) {
            ScriptLine::Message(message) => {
                inputs.send(AgentInput::Message(message))?;
            }
            ScriptLine::Directive(directive) => {
                if let Some(duration) = directive.wait_duration() {
                    tokio::time::sleep(duration).await;
                } else if let Some((module, level)) = directive.log_level() {
                    let filter = telemetry.set_module_level(module, level);
                    info!(%filter, "log filter updated");
                } else if let Some(record) = script::apply(&document, &directive) {
                    inputs.send(AgentInput::Host(HostEvent::Mutations(vec![record])))?;
                }
            }
        }
    }

    cancel.cancel();
    let agent = agent_task.await.context("agent task panicked")?;
    info!(
        state = agent.state().as_str(),
        artifacts = agent.artifacts().live_count(),
        "shutting down"
    );
    drop(agent);
    drop(inputs);
    writer.await.context("writer task panicked")??;
    Ok(())
}
