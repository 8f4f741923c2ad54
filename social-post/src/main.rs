//! social-post - Publish or schedule an image post

use clap::Parser;
use libsocialcast::logging::LoggingConfig;
use libsocialcast::service::SocialcastService;
use libsocialcast::{Platform, Result, SocialcastError};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "social-post")]
#[command(version)]
#[command(about = "Publish or schedule an image post on a connected account")]
#[command(long_about = "\
social-post - Publish or schedule an image post

DESCRIPTION:
    Publishes an image (by public URL) with an optional caption to the
    account a server has connected for a platform. With --schedule the post
    is stored instead and social-send publishes it when it comes due.

USAGE:
    social-post --server 42 --platform instagram \\
        --image https://cdn.example.com/latte.jpg --caption \"Latte art\"

    social-post --server 42 --platform facebook \\
        --image https://cdn.example.com/menu.jpg --schedule \"tomorrow 9am\"

    --schedule accepts \"2025-06-01 09:30\" (UTC), RFC 3339 timestamps,
    durations like \"2h 30m\", or phrases like \"next friday 5pm\".

OUTPUT:
    text: platform:external_id, or scheduled:post_id:time
    json: the receipt as a JSON object

EXIT CODES:
    0 - Success
    1 - Publish, configuration, or storage failure
    2 - Authorization failure
    3 - Invalid input (unknown account, bad URL, past schedule time)
")]
struct Cli {
    /// Server (community) the account belongs to
    #[arg(long, env = "SOCIALCAST_SERVER")]
    server: String,

    /// Target platform (facebook, instagram, linkedin, tiktok)
    #[arg(short, long)]
    platform: Platform,

    /// Public URL of the image to post
    #[arg(short, long, value_name = "URL")]
    image: String,

    /// Caption text
    #[arg(short, long)]
    caption: Option<String>,

    /// Schedule the post instead of publishing now
    #[arg(short, long, value_name = "WHEN")]
    schedule: Option<String>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("error", cli.verbose).init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let service = SocialcastService::new().await?;
    let posting = service.posting();
    let caption = cli.caption.as_deref();

    match &cli.schedule {
        Some(when) => {
            let receipt = posting
                .schedule_post(&cli.server, cli.platform, &cli.image, caption, when)
                .await?;
            let text = format!(
                "scheduled:{}:{}",
                receipt.post_id,
                receipt.scheduled_at.to_rfc3339()
            );
            emit(&cli.format, &receipt, text)
        }
        None => {
            let receipt = posting
                .publish_now(&cli.server, cli.platform, &cli.image, caption)
                .await?;
            let text = format!("{}:{}", receipt.platform, receipt.external_post_id);
            emit(&cli.format, &receipt, text)
        }
    }
}

fn emit<T: Serialize>(format: &str, receipt: &T, text: String) -> Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(receipt).map_err(|e| {
            SocialcastError::InvalidInput(format!("Failed to serialize output: {}", e))
        })?;
        println!("{}", json);
    } else {
        println!("{}", text);
    }
    Ok(())
}
