//! otaflow CLI
//!
//! Command-line interface for the otaflow daemon

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use eyre::{WrapErr, bail};
use otaflow_api::requests::TriggerRequest;
use otaflow_api::responses::{OtaStatus, StatusResponse};
use otaflow_client::HttpClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "otaflow-cli")]
#[command(about = "Firmware update CLI", long_about = None)]
struct Cli {
    /// Daemon base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:8080")]
    server: String,

    /// Print raw JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the current update status
    Status,
    /// Start a firmware update
    Trigger {
        /// Firmware image URL
        url: String,
        /// CA certificate (PEM) to verify the firmware server
        #[arg(long, value_name = "FILE")]
        ca_cert: Option<PathBuf>,
        /// Also trust the system certificate store
        #[arg(long)]
        global_ca: bool,
        /// Client private key (PEM) for mutual TLS
        #[arg(long, value_name = "FILE", requires = "client_cert")]
        client_key: Option<PathBuf>,
        /// Client certificate (PEM) for mutual TLS
        #[arg(long, value_name = "FILE", requires = "client_key")]
        client_cert: Option<PathBuf>,
    },
    /// Cancel the update in flight
    Abort,
    /// Poll the status until the update finishes
    Watch {
        /// Poll interval in milliseconds
        #[arg(long, default_value_t = 500)]
        interval: u64,
    },
}

fn read_pem(path: Option<&Path>) -> Result<Option<String>> {
    path.map(|p| {
        std::fs::read_to_string(p).wrap_err_with(|| format!("reading {}", p.display()))
    })
    .transpose()
}

fn summary(status: &StatusResponse) -> String {
    let mut line = status.status.to_string();
    match (status.total_size, status.percent) {
        (Some(total), Some(percent)) => {
            line.push_str(&format!(" {} / {total} bytes ({percent:.1}%)", status.progress));
        }
        _ if status.progress > 0 => line.push_str(&format!(" {} bytes", status.progress)),
        _ => {}
    }
    if let Some(image) = &status.image {
        line.push_str(&format!(" [{} {}]", image.project_name, image.version));
    }
    if !status.message.is_empty() {
        line.push_str(&format!(": {}", status.message));
    }
    line
}

fn print_status(status: &StatusResponse, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(status)?);
    } else {
        println!("{}", summary(status));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let client = HttpClient::new(&cli.server)?;

    match cli.command {
        Commands::Status => {
            print_status(&client.status().await?, cli.json)?;
        }
        Commands::Trigger {
            url,
            ca_cert,
            global_ca,
            client_key,
            client_cert,
        } => {
            let request = TriggerRequest {
                url,
                ca_cert_pem: read_pem(ca_cert.as_deref())?,
                use_global_trust_store: global_ca,
                client_key_pem: read_pem(client_key.as_deref())?,
                client_cert_pem: read_pem(client_cert.as_deref())?,
            };
            client.trigger(&request).await?;
            println!("update started: {}", request.url);
        }
        Commands::Abort => {
            client.abort().await?;
            println!("abort requested");
        }
        Commands::Watch { interval } => {
            let every = Duration::from_millis(interval.max(50));
            loop {
                let status = client.status().await?;
                print_status(&status, cli.json)?;
                match status.status {
                    OtaStatus::Succeeded => break,
                    OtaStatus::Failed => bail!("update failed: {}", status.message),
                    _ if !status.status.is_busy() => break,
                    _ => tokio::time::sleep(every).await,
                }
            }
        }
    }

    Ok(())
}
