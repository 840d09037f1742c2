use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use request_guard::security::{now_millis, webhook::sign_payload};

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for request-guard", long_about = None)]
struct Cli {
    /// Admin API base URL
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    /// Admin API key
    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check guard status
    Status,
    /// Show tracked rate-limit state and the active policy table
    Limits,
    /// Show the number of live CSRF tokens
    Tokens,
    /// Print a signature header for a payload
    Sign {
        /// File holding the exact payload bytes
        payload: PathBuf,
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: String,
        /// Unix seconds; defaults to now
        #[arg(short, long)]
        timestamp: Option<u64>,
    },
    /// Sign a payload and POST it to a guarded webhook endpoint
    SendWebhook {
        /// Full endpoint URL, e.g. http://localhost:8080/api/webhooks/stripe
        endpoint: String,
        payload: PathBuf,
        #[arg(short, long, env = "WEBHOOK_SECRET")]
        secret: String,
        #[arg(long, default_value = "stripe-signature")]
        header: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let admin_path = match &cli.command {
        Commands::Status => Some("status"),
        Commands::Limits => Some("limits"),
        Commands::Tokens => Some("tokens"),
        _ => None,
    };
    if let Some(path) = admin_path {
        let res = client
            .get(format!("{}/admin/{}", cli.url, path))
            .headers(headers)
            .send()
            .await?;
        return print_response(res).await;
    }

    match cli.command {
        Commands::Sign { payload, secret, timestamp } => {
            let body = std::fs::read(payload)?;
            let t = timestamp.unwrap_or_else(|| now_millis() / 1000);
            println!("{}", sign_payload(&body, &secret, t));
        }
        Commands::SendWebhook { endpoint, payload, secret, header } => {
            let body = std::fs::read(payload)?;
            let signature = sign_payload(&body, &secret, now_millis() / 1000);
            let res = client
                .post(endpoint)
                .header(CONTENT_TYPE, "application/json")
                .header(header.as_str(), signature)
                .body(body)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Status | Commands::Limits | Commands::Tokens => {}
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: request returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
