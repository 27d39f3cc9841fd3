mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use cli::{Cli, Commands};
use cm_monitor::app::App;
use cm_monitor::core::metrics::ContainerMetrics;
use cm_monitor::core::profiler::profile_container;
use cm_monitor::core::{DockerRuntime, MetricsCollector};
use cm_monitor::utils::{format_bytes, format_rate, logging, short_id, truncate_string, AppConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;

    match cli.command {
        None | Some(Commands::Dashboard) => {
            let _guard = logging::init_file(&AppConfig::config_dir()?.join("logs"))?;
            let runtime = Arc::new(connect(&config)?);
            let collector = MetricsCollector::new(runtime.clone());
            let mut app = App::new(collector, runtime, config);
            app.run().await?;
        }
        Some(Commands::Serve { port, host, cors }) => {
            logging::init_stderr()?;
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            config.server.cors |= cors;
            handle_serve(config).await?;
        }
        Some(Commands::Stats {
            container,
            watch,
            interval,
            json,
        }) => {
            logging::init_stderr()?;
            handle_stats(&config, container, watch, interval, json).await?;
        }
        Some(Commands::Profile {
            container,
            duration,
            interval,
            json,
        }) => {
            logging::init_stderr()?;
            let duration = duration.unwrap_or_else(|| config.profile.duration());
            let interval = interval.unwrap_or_else(|| config.profile.interval());
            handle_profile(&config, &container, duration, interval, json).await?;
        }
        Some(Commands::Token { owner }) => {
            handle_token(&owner)?;
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> Result<DockerRuntime> {
    DockerRuntime::connect(config.adapter_timeout()).context("Is the Docker daemon running?")
}

/// Token cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
    cancel
}

#[cfg(feature = "server")]
async fn handle_serve(config: AppConfig) -> Result<()> {
    let collector = MetricsCollector::new(Arc::new(connect(&config)?));
    cm_monitor::server::run(config, collector).await
}

#[cfg(not(feature = "server"))]
async fn handle_serve(_config: AppConfig) -> Result<()> {
    anyhow::bail!("cm-monitor was built without the `server` feature")
}

async fn handle_stats(
    config: &AppConfig,
    container: Option<String>,
    watch: bool,
    interval: Duration,
    json: bool,
) -> Result<()> {
    let collector = MetricsCollector::new(Arc::new(connect(config)?));

    if watch {
        let cancel = interrupt_token();
        let mut stream = match &container {
            Some(id) => collector.stream(id.clone(), interval, cancel.clone()),
            None => collector.stream_all(interval, cancel.clone()),
        };
        if !json {
            print_header();
        }
        while let Some(metrics) = stream.next().await {
            print_metrics(&metrics, json)?;
        }
        return Ok(());
    }

    // CPU and rates need two samples; prime the cache first
    let snapshot = match &container {
        Some(id) => {
            collector.collect(id).await.with_context(|| format!("Failed to read stats for {}", id))?;
            tokio::time::sleep(interval).await;
            vec![collector.collect(id).await?]
        }
        None => {
            collector.collect_all().await.context("Failed to list containers")?;
            tokio::time::sleep(interval).await;
            let mut all = collector.collect_all().await?;
            all.sort_by(|a, b| a.container_name.cmp(&b.container_name));
            all
        }
    };

    if !json {
        print_header();
    }
    for metrics in &snapshot {
        print_metrics(metrics, json)?;
    }
    if snapshot.is_empty() && !json {
        println!("{}", "No running containers".yellow());
    }

    Ok(())
}

fn print_header() {
    println!(
        "{}",
        format!(
            "{:<14} {:<24} {:>8} {:>22} {:>24} {:>24} {:>6}",
            "ID", "NAME", "CPU", "MEMORY", "NET RX/TX", "BLOCK R/W", "PIDS"
        )
        .bold()
    );
}

fn print_metrics(m: &ContainerMetrics, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(m)?);
        return Ok(());
    }

    let cpu = format!("{:.1}%", m.cpu_percent);
    let cpu = if m.cpu_percent / m.cpu_count.max(1) as f64 > 80.0 {
        cpu.red()
    } else {
        cpu.normal()
    };
    let memory = format!("{} ({:.0}%)", format_bytes(m.memory_used), m.memory_percent);
    let memory = if m.memory_percent > 80.0 { memory.red() } else { memory.normal() };

    println!(
        "{:<14} {:<24} {:>8} {:>22} {:>24} {:>24} {:>6}",
        short_id(&m.container_id),
        truncate_string(&m.container_name, 24),
        cpu,
        memory,
        format!("{} / {}", format_rate(m.network_rx_rate), format_rate(m.network_tx_rate)),
        format!("{} / {}", format_rate(m.block_read_rate), format_rate(m.block_write_rate)),
        m.pids
    );
    Ok(())
}

async fn handle_profile(config: &AppConfig, container: &str, duration: Duration, interval: Duration, json: bool) -> Result<()> {
    let collector = MetricsCollector::new(Arc::new(connect(config)?));
    // fail fast on an unknown container
    let identity = collector
        .runtime()
        .inspect(container)
        .await
        .with_context(|| format!("Cannot profile {}", container))?;

    let expected = (duration.as_millis() / interval.as_millis().max(1)).max(1) as u64;
    let progress = if json { ProgressBar::hidden() } else { ProgressBar::new(expected) };
    progress.set_style(
        ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len} samples")
            .context("Invalid progress template")?
            .progress_chars("=> "),
    );
    progress.set_message(format!("Profiling {}", identity.name));

    let report = profile_container(&collector, container, duration, interval, interrupt_token(), |n, m| {
        progress.set_position(n as u64);
        progress.set_message(format!("Profiling {} (cpu {:.1}%, mem {})", identity.name, m.cpu_percent, format_bytes(m.memory_used)));
    })
    .await;
    progress.finish_and_clear();

    let Some(rec) = report.recommendation else {
        anyhow::bail!("No samples collected for {} in {}", identity.name, humantime::format_duration(duration));
    };

    if json {
        let output = serde_json::json!({
            "container_id": report.container_id,
            "container_name": identity.name,
            "samples": report.samples,
            "recommendation": rec,
            "reason": rec.reason(),
            "devcontainer": rec.host_requirements(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("{} {}", "Resource recommendation for".bold(), identity.name.cyan().bold());
    println!("  CPU limit:     {:.2}%  (P95 {:.2}%)", rec.cpu_limit, rec.p95_cpu);
    println!("  Memory limit:  {} MB  (P95 {} MB)", rec.memory_limit_mb, rec.p95_memory_mb);
    println!("  {}", rec.reason().dimmed());
    println!();
    println!("devcontainer.json:");
    println!("{}", serde_json::to_string_pretty(&rec.host_requirements())?);

    Ok(())
}

#[cfg(feature = "server")]
fn handle_token(owner: &str) -> Result<()> {
    // the file only, so environment overrides are not persisted
    let mut config = AppConfig::load_from(&AppConfig::config_path()?)?;
    let token = cm_monitor::server::auth::generate_token();
    config.add_token(token.clone(), owner)?;

    println!("{} {}", "✓ Token generated for".green(), owner.bold());
    println!("  {}", token);
    println!("  Saved to {}", AppConfig::config_path()?.display());
    println!("  Use it as: Authorization: Bearer {}", token);
    Ok(())
}

#[cfg(not(feature = "server"))]
fn handle_token(_owner: &str) -> Result<()> {
    anyhow::bail!("cm-monitor was built without the `server` feature")
}
