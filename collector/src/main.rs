use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::info;

mod collect;

use collect::Collector;
use common::es::EsClient;
use common::reports::ReportsClient;
use common::{schedule, Config, ScopeRegistry};

#[derive(Parser)]
#[command(about = "Polls the identity provider's token audit feed and stores OAuth grants")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value_t = Config::default_path())]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting grantwatch collector");

    let config = Config::load(&args.config)?;
    info!("Config loaded from {}", args.config);

    let registry = ScopeRegistry::load(&config.collector.scopes_file)?;
    info!("Scope registry loaded ({} scopes)", registry.len());

    let es = EsClient::new(&config.elasticsearch);
    let reports = ReportsClient::new(&config.reports);
    let collector = Collector::new(reports, es, registry, &config.collector);

    schedule::run_every("collector", config.collector.run_every_minutes, |cycle| {
        collector.collect(Utc::now(), cycle)
    })
    .await;

    Ok(())
}
