use anyhow::Context;
use clap::Parser;
use siteherd::events::spawn_event_logger;
use siteherd::{CommandHost, Config, EventBus, SiteConfig, Supervisor};
use std::path::Path;
use std::sync::Arc;

mod cli;

use cli::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "siteherd=debug"
    } else {
        "siteherd=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        if let Some(err) = err.downcast_ref::<siteherd::Error>() {
            if let Some(suggestion) = err.suggestion() {
                eprintln!("  hint: {}", suggestion);
            }
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::find_config_file(Path::new("."))?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Invalid config {}", config_path.display()))?;

    match cli.command {
        Commands::Validate => validate(&config_path, &config),
        Commands::Serve { sites, json } => serve(config, sites, json).await,
    }
}

fn validate(path: &Path, config: &Config) -> anyhow::Result<()> {
    let settings = config.settings();
    let mut problems = 0;
    for site in &config.sites {
        if !site.root.is_dir() {
            println!("  {} - root {} is not a directory", site.name, site.root.display());
            problems += 1;
            continue;
        }
        if let Some(marker) = &settings.layout_marker {
            if !site.root.join(marker).exists() {
                println!(
                    "  {} - missing '{}' under {}",
                    site.name,
                    marker,
                    site.root.display()
                );
                problems += 1;
                continue;
            }
        }
        println!("  {} - ok ({})", site.name, site.root.display());
    }
    if problems > 0 {
        anyhow::bail!(
            "{}: {} of {} site(s) failed validation",
            path.display(),
            problems,
            config.sites.len()
        );
    }
    println!("{}: {} site(s) ok", path.display(), config.sites.len());
    Ok(())
}

async fn serve(config: Config, only: Vec<String>, json: bool) -> anyhow::Result<()> {
    let settings = config.settings();

    let events = EventBus::default();
    let _event_logger = spawn_event_logger(&events);

    let host = Arc::new(CommandHost::new(
        settings.command.clone(),
        settings.grace_period(),
        events.clone(),
    ));
    let mut builder = Supervisor::builder(host)
        .start_port(settings.start_port)
        .max_port_scan(settings.max_port_scan)
        .retry_policy(settings.retry_policy())
        .startup_timeout(settings.startup_timeout())
        .stop_timeout(settings.stop_timeout())
        .event_bus(events);
    if let Some(marker) = settings.layout_marker.clone() {
        builder = builder.layout_marker(marker);
    }
    let supervisor = builder.build();

    let selected: Vec<&SiteConfig> = if only.is_empty() {
        config.sites.iter().collect()
    } else {
        let mut picked = Vec::new();
        for name in &only {
            let site = config
                .sites
                .iter()
                .find(|s| &s.name == name)
                .with_context(|| format!("Site '{}' is not in the config", name))?;
            picked.push(site);
        }
        picked
    };
    anyhow::ensure!(!selected.is_empty(), "No sites configured");

    let mut started = 0;
    for site in &selected {
        match supervisor.start_server(&site.name, &site.root).await {
            Ok(info) => {
                started += 1;
                tracing::info!(
                    "'{}' serving at {}",
                    site.name,
                    info.url.as_deref().unwrap_or("<unknown>")
                );
            }
            Err(err) => {
                tracing::error!("Failed to start '{}': {}", site.name, err);
                if let Some(suggestion) = err.suggestion() {
                    tracing::error!("  hint: {}", suggestion);
                }
            }
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&supervisor.get_all_servers())?
        );
    }
    anyhow::ensure!(started > 0, "No sites could be started");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("Interrupt received, stopping all servers");
    supervisor.stop_all_servers().await;
    Ok(())
}
