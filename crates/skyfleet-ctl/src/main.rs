use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "skyfleet-ctl", about = "Command-line client for the Skyfleet control plane")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    control_plane: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Drone(DroneCommand),
    #[command(subcommand)]
    Mission(MissionCommand),
}

#[derive(Debug, Clone, Copy, Args)]
struct PageArgs {
    #[arg(long)]
    page: Option<u32>,
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(Debug, Subcommand)]
enum DroneCommand {
    Add {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        battery: Option<u8>,
    },
    List {
        #[arg(long)]
        org: Option<Uuid>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
}

#[derive(Debug, Subcommand)]
enum MissionCommand {
    Create {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        lon: f64,
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        /// RFC 3339 start time. Defaults to now.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// daily, weekly or monthly. Makes the mission recurring.
        #[arg(long)]
        frequency: Option<String>,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        #[arg(long = "drone")]
        drones: Vec<Uuid>,
    },
    List {
        #[arg(long)]
        org: Option<Uuid>,
        #[arg(long)]
        status: Option<String>,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Stop a mission's schedule without touching its record.
    Cancel { id: Uuid },
    Status { id: Uuid, status: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let base = cli.control_plane.trim_end_matches('/').to_string();
    let client = Client::new();

    let request = match cli.command {
        Command::Drone(DroneCommand::Add { org, serial, model, battery }) => client
            .post(format!("{base}/api/drones"))
            .json(&json!({
                "organization_id": org,
                "serial_number": serial,
                "model": model,
                "battery_level": battery,
            })),
        Command::Drone(DroneCommand::List { org, status, page }) => client
            .get(format!("{base}/api/drones"))
            .query(&filters(org, status, page)),
        Command::Mission(MissionCommand::Create {
            org,
            name,
            description,
            lon,
            lat,
            at,
            frequency,
            interval,
            drones,
        }) => {
            let mut body = mission_body(
                org,
                &name,
                at.unwrap_or_else(Utc::now),
                frequency.as_deref(),
                interval,
                &drones,
            );
            body["location"] = json!({ "type": "Point", "coordinates": [lon, lat] });
            if let Some(description) = description {
                body["description"] = json!(description);
            }
            client.post(format!("{base}/api/missions")).json(&body)
        }
        Command::Mission(MissionCommand::List { org, status, page }) => client
            .get(format!("{base}/api/missions"))
            .query(&filters(org, status, page)),
        Command::Mission(MissionCommand::Cancel { id }) => {
            client.delete(format!("{base}/api/missions/{id}/schedule"))
        }
        Command::Mission(MissionCommand::Status { id, status }) => client
            .patch(format!("{base}/api/missions/{id}/status"))
            .json(&json!({ "status": status })),
    };

    let body = send(request).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn send(request: RequestBuilder) -> Result<Value> {
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    debug!(%status, "control-plane responded");
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|body| body.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or(text);
        bail!("control plane returned {status}: {message}");
    }
    Ok(serde_json::from_str(&text)?)
}

fn filters(
    org: Option<Uuid>,
    status: Option<String>,
    page: PageArgs,
) -> Vec<(&'static str, String)> {
    let mut query = Vec::new();
    if let Some(org) = org {
        query.push(("organization_id", org.to_string()));
    }
    if let Some(status) = status {
        query.push(("status", status));
    }
    if let Some(number) = page.page {
        query.push(("page", number.to_string()));
    }
    if let Some(limit) = page.limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

fn mission_body(
    org: Uuid,
    name: &str,
    at: DateTime<Utc>,
    frequency: Option<&str>,
    interval: u32,
    drones: &[Uuid],
) -> Value {
    let mut body = json!({
        "organization_id": org,
        "name": name,
        "type": "one-time",
        "scheduled_time": at,
        "scheduled_drones": drones,
    });
    if let Some(frequency) = frequency {
        body["type"] = json!("recurring");
        body["recurrence_rule"] = json!({ "frequency": frequency, "interval": interval });
    }
    body
}
