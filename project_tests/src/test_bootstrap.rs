//! # Backend Bootstrap Live Test
//!
//! Calls the bootstrap and status endpoints of a running backend through
//! lib_dashboard and prints what the engine would boot from.

use clap::Parser;
use lib_dashboard::auth::TokenStore;
use lib_dashboard::configs::{AuthSettings, HttpSettings, FALLBACK_TOKEN};
use lib_dashboard::retrieve::{BackendApi, ResilientClient};
use serde_json::json;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(about = "Live smoke test for the dashboard backend", version)]
struct Args {
    /// Backend base URL.
    #[clap(long, default_value = "http://127.0.0.1:5000/")]
    base_url: String,

    /// Bearer token; the shared fallback token when omitted.
    #[clap(long)]
    token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let http = HttpSettings { base_url: args.base_url.clone(), ..Default::default() };
    let auth = AuthSettings::default();
    let tokens = Arc::new(TokenStore::in_memory(FALLBACK_TOKEN));
    if let Some(token) = &args.token {
        tokens.set(token);
    }
    let client = Arc::new(ResilientClient::new(&http, &auth, tokens)?);
    let api = BackendApi::new(client, "/api/ai/status");

    println!("[*] Requesting bootstrap from {} ...", args.base_url);
    match api.bootstrap().await {
        Ok(payload) => {
            let summary = json!({
                "demo_mode": payload.demo_mode,
                "esp32_online_count": payload.esp32_online_count,
                "violations": payload.violations.len(),
                "devices": payload.devices.keys().collect::<Vec<_>>(),
                "events": payload.events.len(),
                "theme": payload.theme,
            });
            println!("\n[SUCCESS] Bootstrap received:");
            println!("-----------------------------------------------");
            println!("{}", serde_json::to_string_pretty(&summary)?);
            println!("-----------------------------------------------");
        }
        Err(e) => {
            eprintln!("\n[ERROR] Bootstrap failed: {}", e);
            eprintln!(">>> {}", e.user_message());
            std::process::exit(1);
        }
    }

    match api.ai_status().await {
        Ok(status) => println!("[INFO] Status: {:#?}", status),
        Err(e) => eprintln!("[WARN] Status call failed: {}", e.user_message()),
    }

    Ok(())
}
