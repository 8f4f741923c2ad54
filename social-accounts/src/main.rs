//! social-accounts - Connect and manage social accounts for a server
//!
//! `connect` runs the OAuth handshake: it prints the authorization URL on
//! stdout, serves the provider's redirect on the callback listener, and
//! saves the chosen page once the user approves. `recent`, `stats`, and
//! `delete` act on posts already live on the connected account.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use libsocialcast::credentials::TokenCipher;
use libsocialcast::error::AuthorizationError;
use libsocialcast::logging::LoggingConfig;
use libsocialcast::oauth::OAuthEngine;
use libsocialcast::service::SocialcastService;
use libsocialcast::{Platform, PostAnalytics, RemoteMedia, ScheduledPost, SocialcastError};

#[derive(Parser)]
#[command(name = "social-accounts")]
#[command(version)]
#[command(about = "Connect, inspect, and disconnect social accounts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect an account through the provider's OAuth dialog
    Connect {
        /// Server (community) the account is for
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        /// Platform to connect (facebook or instagram)
        #[arg(short, long)]
        platform: Platform,

        /// Page or Instagram account id to use when several are managed
        #[arg(long)]
        page_id: Option<String>,
    },

    /// Remove a connected account and its stored token
    Disconnect {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        #[arg(short, long)]
        platform: Platform,
    },

    /// Show the accounts connected for a server
    Show {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,
    },

    /// List a server's most recent posts
    ListPosts {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        /// Number of posts to show (default: 10)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// List the newest posts on the connected account
    Recent {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        #[arg(short, long, default_value = "instagram")]
        platform: Platform,

        /// Number of posts to show (default: 5)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Fetch and save a post's insights (impressions, reach, engagement, saved)
    Stats {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        #[arg(short, long, default_value = "instagram")]
        platform: Platform,

        /// Platform post id
        #[arg(long = "post", value_name = "POST_ID")]
        post_id: String,

        /// Show the last saved insights instead of fetching
        #[arg(long)]
        saved: bool,
    },

    /// Delete a post from the platform
    Delete {
        #[arg(long, env = "SOCIALCAST_SERVER")]
        server: String,

        #[arg(short, long, default_value = "instagram")]
        platform: Platform,

        /// Platform post id
        #[arg(long = "post", value_name = "POST_ID")]
        post_id: String,
    },

    /// Generate an encryption key for `[security] encryption_key`
    Keygen,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::from_env("warn", cli.verbose).init();

    if let Err(e) = run_command(cli.command, &cli.format).await {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<SocialcastError>()
            .map(SocialcastError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run_command(command: Commands, format: &str) -> Result<()> {
    let json = format == "json";

    match command {
        Commands::Keygen => keygen(json),
        Commands::Connect {
            server,
            platform,
            page_id,
        } => connect(&server, platform, page_id.as_deref(), json).await,
        Commands::Disconnect { server, platform } => disconnect(&server, platform, json).await,
        Commands::Show { server } => show(&server, json).await,
        Commands::ListPosts { server, limit } => list_posts(&server, limit, json).await,
        Commands::Recent {
            server,
            platform,
            limit,
        } => recent(&server, platform, limit, json).await,
        Commands::Stats {
            server,
            platform,
            post_id,
            saved,
        } => stats(&server, platform, &post_id, saved, json).await,
        Commands::Delete {
            server,
            platform,
            post_id,
        } => delete(&server, platform, &post_id, json).await,
    }
}

fn keygen(json: bool) -> Result<()> {
    let key = TokenCipher::generate_key();
    let recipient = TokenCipher::from_key(&key)?.recipient();

    if json {
        println!(
            "{}",
            serde_json::json!({ "encryption_key": key, "recipient": recipient })
        );
    } else {
        eprintln!("# recipient: {}", recipient);
        eprintln!("# add the key below to [security] encryption_key and keep it secret");
        println!("{}", key);
    }
    Ok(())
}

async fn connect(server: &str, platform: Platform, page_id: Option<&str>, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    let engine = Arc::new(OAuthEngine::from_config(&service.config().oauth, platform));

    let pending = service
        .accounts()
        .begin_connect(&engine, server, platform)
        .await?;

    eprintln!("Open this URL in your browser to authorize {}:", platform);
    println!("{}", pending.url());
    eprintln!(
        "Waiting up to {}s for the authorization...",
        service.config().oauth.timeout_secs
    );

    let result = tokio::select! {
        result = service.accounts().complete_connect(pending, page_id) => result,
        _ = tokio::signal::ctrl_c() => {
            Err(SocialcastError::Authorization(AuthorizationError::Cancelled))
        }
    };
    engine.stop().await;
    let account = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&account)?);
    } else {
        println!(
            "Connected {} account {} ({})",
            account.platform, account.display_name, account.platform_account_id
        );
    }
    Ok(())
}

async fn disconnect(server: &str, platform: Platform, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    let removed = service.accounts().disconnect(server, platform).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "server_id": server,
                "platform": platform,
                "removed": removed.is_some(),
                "display_name": removed,
            })
        );
        return Ok(());
    }

    match removed {
        Some(name) => println!("Disconnected {} account {}", platform, name),
        None => println!("No {} account connected for server {}", platform, server),
    }
    Ok(())
}

async fn show(server: &str, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    let accounts = service.accounts().show(server).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    if accounts.is_empty() {
        println!("No accounts connected for server {}", server);
        return Ok(());
    }
    for account in accounts {
        println!(
            "{}\t{}\t{}\tconnected {}",
            account.platform,
            account.display_name,
            account.platform_account_id,
            format_timestamp(account.connected_at)
        );
    }
    Ok(())
}

async fn list_posts(server: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    let posts = service.posting().recent_posts(server, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    if posts.is_empty() {
        println!("No posts for server {}", server);
        return Ok(());
    }
    for post in &posts {
        println!("{}", post_line(post));
    }
    Ok(())
}

async fn recent(server: &str, platform: Platform, limit: Option<usize>, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    let media = service.posting().recent_media(server, platform, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&media)?);
        return Ok(());
    }

    if media.is_empty() {
        println!("No {} posts found", platform);
        return Ok(());
    }
    for item in &media {
        println!("{}", media_line(item));
    }
    Ok(())
}

async fn stats(
    server: &str,
    platform: Platform,
    post_id: &str,
    saved: bool,
    json: bool,
) -> Result<()> {
    let service = SocialcastService::new().await?;
    let analytics = if saved {
        service.posting().saved_insights(post_id).await?
    } else {
        Some(service.posting().post_insights(server, platform, post_id).await?)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&analytics)?);
        return Ok(());
    }

    match analytics {
        Some(analytics) => print_analytics(&analytics),
        None => println!("No saved insights for post {}", post_id),
    }
    Ok(())
}

async fn delete(server: &str, platform: Platform, post_id: &str, json: bool) -> Result<()> {
    let service = SocialcastService::new().await?;
    service.posting().delete_post(server, platform, post_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "platform": platform, "post_id": post_id, "deleted": true })
        );
    } else {
        println!("Deleted {} post {}", platform, post_id);
    }
    Ok(())
}

fn media_line(item: &RemoteMedia) -> String {
    let day = item
        .timestamp
        .as_deref()
        .and_then(|ts| ts.get(..10))
        .unwrap_or("-");
    let caption: String = item
        .caption
        .as_deref()
        .unwrap_or("No caption")
        .chars()
        .take(100)
        .collect();
    format!(
        "{}\t{}\t{}\t{}",
        item.id,
        day,
        caption,
        item.permalink.as_deref().unwrap_or("")
    )
}

fn print_analytics(analytics: &PostAnalytics) {
    println!(
        "{} post {} (fetched {})",
        analytics.platform,
        analytics.external_post_id,
        format_timestamp(analytics.fetched_at)
    );
    for (name, value) in &analytics.metrics {
        println!("{}\t{}", name, value);
    }
}

fn post_line(post: &ScheduledPost) -> String {
    let when = post.published_at.or(post.scheduled_at).unwrap_or(post.created_at);
    let detail = post
        .external_post_id
        .as_deref()
        .or(post.error_message.as_deref())
        .unwrap_or(&post.image_url);
    format!(
        "{}\t{}\t{}\t{}\t{}",
        post.id,
        post.platform,
        post.status,
        format_timestamp(when),
        detail
    )
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
