//! wampkit - command line WAMP caller/subscriber.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wampkit_client::{Client, ClientConfig, Event};

const USAGE: &str = "Usage: wampkit-client <command>\n\nCommands:\n  call <procedure> [args-json] [options-json]\n  subscribe <topic> [seconds]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv_from_repo_root();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wampkit_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ClientConfig::from_env();
    let mut args = std::env::args().skip(1);
    let command = args.next();
    let target = args.next();

    let (command, target) = match (command.as_deref(), target) {
        (Some(command @ ("call" | "subscribe")), Some(target)) => (command.to_string(), target),
        (Some(cmd @ ("call" | "subscribe")), None) => anyhow::bail!("{cmd}: missing argument\n\n{USAGE}"),
        (Some(cmd), _) => anyhow::bail!("Unknown command: {cmd}\n\n{USAGE}"),
        (None, _) => anyhow::bail!(USAGE),
    };

    tracing::info!(
        host = %config.host,
        port = config.port,
        realm = %config.realm,
        "Connecting to WAMP router"
    );
    let client = Client::new(config);
    let session_id = client
        .connect_configured(Some(Arc::new(|| {
            tracing::warn!("Connection to router lost");
        })))
        .await
        .context("connecting to router")?;
    tracing::info!(session_id, "Session joined");

    let outcome = match command.as_str() {
        "call" => {
            let call_args = args.next().unwrap_or_else(|| "{}".into());
            let options = args.next().unwrap_or_else(|| "{}".into());
            run_call(&client, &target, &call_args, &options).await
        }
        _ => {
            let seconds = args
                .next()
                .map(|s| s.parse::<u64>())
                .transpose()
                .context("subscribe duration must be a number of seconds")?;
            run_subscribe(&client, &target, seconds.map(Duration::from_secs)).await
        }
    };

    client.disconnect().await;
    outcome
}

async fn run_call(
    client: &Client,
    procedure: &str,
    args: &str,
    options: &str,
) -> anyhow::Result<()> {
    match client.call_json(procedure, args, options).await {
        Ok(result) => {
            println!("{result}");
            Ok(())
        }
        Err(e) => anyhow::bail!("{}", e.to_document()),
    }
}

async fn run_subscribe(
    client: &Client,
    topic: &str,
    duration: Option<Duration>,
) -> anyhow::Result<()> {
    let subscription = client
        .subscribe(topic, serde_json::Value::Null, |event: &Event| {
            println!("{}", event.payload());
        })
        .await
        .map_err(|e| anyhow::anyhow!("{}", e.to_document()))?;
    tracing::info!(subscription_id = subscription.id, topic, "Subscribed, waiting for events");

    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => {
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
        }
    }

    if let Err(e) = client.unsubscribe(subscription.id).await {
        tracing::warn!(error = %e, "Unsubscribe on exit failed");
    }
    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
