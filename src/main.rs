use std::{process::ExitCode, sync::Arc, time::Duration};

use cli::Commands;
use config::FleetConfig;
use logs::event::NewEvent;
use logs::sink::{EventSink, HttpEventSink, emit_best_effort};

mod cli;
mod config;
mod http;
mod logs;
mod orchestration;

const EMIT_TIMEOUT: Duration = Duration::from_secs(10);

async fn emit(args: &cli::EmitArgs) -> ExitCode {
    let mut event = NewEvent::new(&args.action, &args.service);
    if let Some(document_number) = &args.document_number {
        event = event.with_document_number(document_number);
    }
    if let Some(details) = &args.details {
        match serde_json::from_str(details) {
            Ok(details) => event = event.with_details(details),
            Err(e) => {
                eprintln!("Details are not valid JSON: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let sink = match HttpEventSink::new(&args.url, EMIT_TIMEOUT) {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            eprintln!("Unable to build HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.best_effort {
        let _ = emit_best_effort(sink, event).await;
        return ExitCode::SUCCESS;
    }

    match sink.send(&event).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("Failed to send event: {e}");
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenv::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::get_cli_args();

    if let Commands::Emit(emit_args) = &args.command {
        return emit(emit_args).await;
    }

    let config = match FleetConfig::try_init(&args.config) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Unable to load config {:?}: {err}", args.config);
            return ExitCode::FAILURE;
        }
    };

    let result = match &args.command {
        Commands::Logs => logs::run(&config.logs)
            .await
            .map_err(|e| e.to_string()),
        Commands::Orchestrator => orchestration::run(&config.orchestrator)
            .await
            .map_err(|e| e.to_string()),
        Commands::Emit(_) => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
