use clap::{Parser, Subcommand};
use reqwest::StatusCode;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "host-cli")]
#[command(about = "Operations CLI for a running service-host", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the per-dependency health report
    Health,
    /// List background jobs, optionally filtered by state
    Jobs {
        #[arg(short, long)]
        state: Option<String>,
    },
    /// List published integration messages, optionally filtered by status
    Messages {
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Dump the Prometheus metrics page
    Metrics,
    /// Run a recurring job now
    Trigger {
        /// Recurring job id, e.g. cap-failed-retry
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => {
            let res = client
                .get(format!("{base}/health?detail=true"))
                .send()
                .await?;
            // 503 still carries the report.
            print_json(res, &[StatusCode::SERVICE_UNAVAILABLE]).await?;
        }
        Commands::Jobs { state } => {
            let mut req = client.get(format!("{base}/hangfire/api/jobs"));
            if let Some(state) = state {
                req = req.query(&[("state", state)]);
            }
            print_json(req.send().await?, &[]).await?;
        }
        Commands::Messages { status } => {
            let mut req = client.get(format!("{base}/cap/api/published"));
            if let Some(status) = status {
                req = req.query(&[("status", status)]);
            }
            print_json(req.send().await?, &[]).await?;
        }
        Commands::Metrics => {
            let res = client.get(format!("{base}/metrics")).send().await?;
            if !res.status().is_success() {
                eprintln!("Error: host returned status {}", res.status());
                std::process::exit(1);
            }
            print!("{}", res.text().await?);
        }
        Commands::Trigger { id } => {
            let res = client
                .post(format!("{base}/hangfire/api/recurring/{id}/trigger"))
                .send()
                .await?;
            print_json(res, &[]).await?;
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response, also_ok: &[StatusCode]) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() && !also_ok.contains(&status) {
        eprintln!("Error: host returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
