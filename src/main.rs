//! CLI entry point for the crawler page fetcher.

use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Read};

use anyhow::{Context, Result};
use clap::Parser;
use crawler_core::{Downloader, DownloaderConfig};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries the JSON result; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let input_text = if !args.urls.is_empty() {
        args.urls.join("\n")
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: echo 'https://example.com/' | crawler");
        return Ok(());
    };

    let urls = parse_urls(&input_text);
    if urls.is_empty() {
        info!("No valid URLs found in input");
        return Ok(());
    }

    let cache_dir = (!args.no_cache).then(|| args.cache_dir.clone());
    let mut config = DownloaderConfig::new(cache_dir, args.qps);
    config.max_throttle_retries = args.max_throttle_retries;

    let downloader = Downloader::new(config).context("failed to set up downloader")?;

    let progress = ProgressBar::new(urls.len() as u64);
    if args.quiet {
        progress.set_draw_target(ProgressDrawTarget::hidden());
    }
    progress.set_style(ProgressStyle::with_template(
        "{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}",
    )?);

    let mut pages: BTreeMap<String, Option<String>> = BTreeMap::new();
    let stats = downloader
        .download_all(&urls, |url, content| {
            progress.inc(1);
            progress.set_message(url.clone());
            pages.insert(url, content);
        })
        .await?;
    progress.finish_and_clear();

    info!(
        cached = stats.cached(),
        fetched = stats.fetched(),
        failed = stats.failed(),
        "Done"
    );

    println!("{}", serde_json::to_string_pretty(&pages)?);
    Ok(())
}

/// Extracts absolute URLs, one per non-empty line, skipping anything unparseable.
fn parse_urls(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match url::Url::parse(line) {
            Ok(_) => Some(line.to_string()),
            Err(e) => {
                warn!(input = line, error = %e, "Skipped unrecognized input");
                None
            }
        })
        .collect()
}
