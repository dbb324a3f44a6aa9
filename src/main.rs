//! MailCore CLI: run one command batch against a host configuration file.

use anyhow::{Context, Result};
use clap::Parser;
use mailcore::{
    config::Config,
    domain::CommandEnvelope,
    email::{BodyFormatter, PassthroughFormatter, SmtpTransportFactory, TemplateEngine},
    host::{ChannelSink, EventSink, MemoryHost, TracingSink},
    telemetry, HostContext, MailCoreService,
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Run a batch of mail commands through the extension.
#[derive(Parser)]
#[command(name = "mailcore", version, about)]
struct Cli {
    /// Host configuration (JSON object with SMTPServer, Port, EnableSSL, Username, Password).
    #[arg(long)]
    settings: PathBuf,

    /// Command batch (JSON array of {name, payload}); `-` reads stdin.
    #[arg(long, default_value = "-")]
    batch: String,

    /// Template variable substituted into HTML bodies, as KEY=VALUE.
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Print Prometheus metrics to stderr after shutdown.
    #[arg(long)]
    metrics: bool,
}

fn parse_var(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.trim().is_empty())
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

fn read_batch(source: &str) -> Result<Vec<CommandEnvelope>> {
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read batch from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {}", source))?
    };

    serde_json::from_str(&raw).context("Batch must be a JSON array of commands")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    dotenvy::dotenv().ok();
    let mut config = Config::from_env()?;
    config.telemetry.metrics_enabled |= cli.metrics;

    let metrics_handle = telemetry::init(&config.telemetry)?;

    let host = Arc::new(MemoryHost::from_json_file(&cli.settings)?);
    let mut batch = read_batch(&cli.batch)?;

    // Host events travel through a bounded channel so sends never wait on logging.
    let (channel_sink, mut events) = ChannelSink::new(config.event_buffer);
    let channel_sink = Arc::new(channel_sink);
    let forwarder = tokio::spawn(async move {
        let sink = TracingSink;
        while let Some(event) = events.recv().await {
            sink.emit(event);
        }
    });

    let formatter: Arc<dyn BodyFormatter> = if cli.vars.is_empty() {
        Arc::new(PassthroughFormatter)
    } else {
        let mut engine = TemplateEngine::new();
        engine.set_all(cli.vars);
        Arc::new(engine)
    };

    let service = MailCoreService::init(
        HostContext {
            config_source: host.clone(),
            registry: host.clone(),
            sink: channel_sink.clone(),
        },
        Arc::new(SmtpTransportFactory::from_config(&config)),
        formatter,
    )?;

    info!(commands = batch.len(), "Dispatching batch");
    let result = service.on_request_batch(&mut batch).await;
    service.on_shutdown();

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": result.status,
            "total": result.total,
            "failed": result.failed,
            "results": batch,
        }))?
    );

    let dropped = channel_sink.dropped();
    drop(service);
    drop(channel_sink);
    forwarder.await.context("Event forwarder failed")?;
    if dropped > 0 {
        tracing::warn!(dropped, "Host events dropped on a full channel");
    }

    if let Some(handle) = metrics_handle {
        eprintln!("{}", handle.render());
    }

    Ok(())
}
