use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use maestro::{telemetry, Predictor, Previewer, WebState};
use maestroconf::MaestroConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Composer prediction service for MIDI uploads
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file, used in place of ./maestro.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP prediction service
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = MaestroConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml());
            Ok(())
        }
        Command::Serve { port, host } => {
            if let Some(port) = port {
                config.bind.http_port = port;
            }
            if let Some(host) = host {
                config.bind.host = host;
            }

            if config.telemetry.otlp_enabled() {
                telemetry::init(&config.telemetry.otlp_endpoint, &config.telemetry.log_level)
                    .context("Failed to initialize OpenTelemetry")?;
            } else {
                telemetry::init_console(&config.telemetry.log_level)?;
            }

            for file in &sources.files {
                tracing::info!("⚙️  Config file: {}", file.display());
            }
            if !sources.env_overrides.is_empty() {
                tracing::info!("⚙️  Env overrides: {}", sources.env_overrides.join(", "));
            }

            let result = serve(config).await;
            telemetry::shutdown();
            result
        }
    }
}

async fn serve(config: MaestroConfig) -> Result<()> {
    tracing::info!("🧠 Loading model bundle...");
    let predictor = Predictor::load(&config).context("Failed to load model bundle")?;
    tracing::info!("   Chunk size: {}", predictor.chunk_size());

    let previewer = match &config.paths.soundfont {
        Some(path) => match Previewer::load(path, config.predict.preview_sample_rate) {
            Ok(previewer) => {
                tracing::info!("🎹 Audio previews with {}", path.display());
                Some(previewer)
            }
            Err(e) => {
                tracing::warn!("🎹 Audio previews disabled: {:#}", e);
                None
            }
        },
        None => {
            tracing::info!("🎹 Audio previews disabled (no soundfont configured)");
            None
        }
    };

    let state = WebState {
        predictor: Arc::new(predictor),
        previewer,
        samples_dir: config.paths.samples_dir.clone(),
        scratch_dir: std::env::temp_dir(),
        default_top_k: config.predict.default_top_k,
        max_upload_bytes: config.predict.max_upload_bytes,
        start_time: Instant::now(),
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("🎼 maestro listening on http://{}", addr);
    tracing::info!("   Upload page: GET http://{}/", addr);
    tracing::info!("   Predict: POST http://{}/predict", addr);
    tracing::info!("   Health: GET http://{}/health", addr);

    axum::serve(listener, maestro::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("🛑 Shutdown signal received");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}
