use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use skyfleet_protocol::{Envelope, MissionEvent};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "skyfleet-watch", about = "Stream mission notifications from the control plane")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    control_plane: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let url = events_url(&cli.control_plane);
    let (mut stream, _) =
        connect_async(url.as_str()).await.with_context(|| format!("failed to connect to {url}"))?;
    info!(%url, "watching mission events");

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => log_event(&envelope),
                    Err(err) => warn!(error = %err, "unreadable notification"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("control plane closed the stream");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(error = %err, "event stream failed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopping");
                break;
            }
        }
    }

    Ok(())
}

fn events_url(control_plane: &str) -> String {
    let base = control_plane.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/api/events")
}

fn log_event(envelope: &Envelope) {
    match &envelope.event {
        MissionEvent::InProgress(m) | MissionEvent::Completed(m) => info!(
            event = envelope.event.event_type(),
            mission_id = %m.mission_id,
            detail = %m.message,
            "mission event"
        ),
        MissionEvent::Error(f) => warn!(
            event = envelope.event.event_type(),
            mission_id = %f.mission_id,
            error = %f.error,
            "mission event"
        ),
    }
}
