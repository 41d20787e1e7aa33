//! Megabolsa Backend - API Server
//!
//! Run modes:
//!   cargo run                          - Show usage
//!   cargo run -- api                   - Start REST API
//!   cargo run -- api --port 3001       - Override API_PORT
//!   cargo run -- api --allow-partial   - Start with missing engine/provider settings

use megabolsa::api::{self, AppState};
use megabolsa::common::{init_from_config, MegabolsaConfig};
use megabolsa::storage::{MemoryStore, SqliteStore};
use std::env;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "api" => run_api_server(&args[2..]).await,
        "help" | "--help" | "-h" => print_usage(),
        _ => print_usage(),
    }
}

fn print_usage() {
    println!("Megabolsa Backend - Server-Side Services");
    println!();
    println!("Usage:");
    println!("  megabolsa-api api [--port <port>] [--allow-partial]   Start REST API server (default: 3000)");
    println!();
    println!("Environment Variables:");
    println!("  BACKEND_WALLET_ADDRESS     Operator wallet that signs mints");
    println!("  ENGINE_URL                 thirdweb Engine base URL");
    println!("  THIRDWEB_SECRET_KEY        Engine secret");
    println!("  MERCADOPAGO_ACCESS_TOKEN   Mercado Pago access token");
    println!("  PUBLIC_BASE_URL            Public URL for webhook callbacks");
    println!("  MEGABOLSA_DB_PATH          SQLite file (in-memory when unset)");
    println!("  API_PORT                   REST API port (default: 3000)");
    println!();
    println!("A .env file in the working directory is loaded first.");
}

/// Start REST API server
async fn run_api_server(args: &[String]) {
    // .env is optional
    dotenv::dotenv().ok();

    let config = match MegabolsaConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = init_from_config(&config) {
        eprintln!("Warning: {}", e);
    }

    let mut port = config.api_port;
    let mut allow_partial = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" if i + 1 < args.len() => {
                port = match args[i + 1].parse() {
                    Ok(p) => p,
                    Err(_) => {
                        eprintln!("Invalid port: {}", args[i + 1]);
                        process::exit(1);
                    }
                };
                i += 2;
            }
            "--allow-partial" => {
                allow_partial = true;
                i += 1;
            }
            _ => i += 1,
        }
    }

    if let Err(e) = config.require_complete() {
        if !allow_partial {
            eprintln!("Configuration error: {}", e);
            eprintln!("Pass --allow-partial to start anyway.");
            process::exit(1);
        }
        tracing::warn!(
            target: "megabolsa::api",
            missing = ?config.missing_vars(),
            "starting with partial configuration; affected endpoints answer 500"
        );
    }

    config.print_summary();

    let state = match &config.db_path {
        Some(path) => SqliteStore::new(path)
            .map_err(|e| e.to_string())
            .and_then(|store| AppState::from_config(&config, Arc::new(store)).map_err(|e| e.to_string())),
        None => AppState::from_config(&config, Arc::new(MemoryStore::new())).map_err(|e| e.to_string()),
    };

    let state = match state {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = api::start_server(state, port).await {
        eprintln!("API server error: {}", e);
        process::exit(1);
    }
}
