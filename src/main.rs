//! maia-serve CLI: HTTP server, interactive session, or model download.
//!
//! Logging: set `RUST_LOG=maia_serve=debug` (or `warn`, ...) to adjust
//! what is written to stderr.

mod cli;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use maia_serve::{
    RequestPipeline, ServiceConfig, fetch_model,
    http::run_http,
    session::{Session, SessionOptions},
    validate_device, validate_variant,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("maia_serve=info,tower_http=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend.into();
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Serve {
            bind,
            model_type,
            device,
            preload,
        } => {
            if let Some(bind) = bind {
                config.bind = bind;
            }
            config.default_variant =
                validate_variant(model_type.as_deref(), config.default_variant)?;
            config.device = validate_device(device.as_deref(), config.device)?;

            let pipeline = Arc::new(RequestPipeline::from_config(&config));
            if preload {
                let warm = Arc::clone(&pipeline);
                // a failed preload is retried by the first request
                if let Err(e) = tokio::task::spawn_blocking(move || warm.init(None, None)).await? {
                    tracing::warn!(error = %e, "preload failed");
                }
            }
            run_http(pipeline, &config.bind).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Play {
            mode,
            ai_color,
            white_elo,
            black_elo,
            model_type,
            device,
            top_k,
        } => {
            let options = SessionOptions {
                mode: mode.into(),
                ai_color: ai_color.into(),
                white_elo,
                black_elo,
                model_type,
                device,
                top_k,
            };
            run_play(config, options).await
        }
        Command::Fetch {
            model_type,
            url,
            force,
        } => {
            let variant = validate_variant(Some(model_type.as_str()), config.default_variant)?;
            let url = url.unwrap_or_else(|| config.download_url(variant));
            let model_dir = config.model_dir.clone();
            let path = tokio::task::spawn_blocking(move || {
                fetch_model(&url, &model_dir, variant, force)
            })
            .await?
            .with_context(|| format!("fetching {variant} model"))?;
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_play(config: ServiceConfig, options: SessionOptions) -> Result<ExitCode> {
    let pipeline = RequestPipeline::from_config(&config);
    let session = tokio::task::spawn_blocking(move || -> Result<ExitCode> {
        let mut session = match Session::start(&pipeline, options) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("Cannot load Maia2: {e}");
                return Ok(ExitCode::FAILURE);
            }
        };
        session.run(io::stdin().lock(), io::stdout())?;
        Ok(ExitCode::SUCCESS)
    });

    tokio::select! {
        joined = session => joined?,
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Session interrupted.");
            // the session thread is parked on stdin and cannot be joined
            std::process::exit(0);
        }
    }
}
