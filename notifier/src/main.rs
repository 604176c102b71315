use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use log::info;

mod notify;

use notify::{Notifier, Templates};
use common::es::EsClient;
use common::mail::Mailer;
use common::reports::ReportsClient;
use common::{schedule, Config, PolicyLists, ScopeRegistry};

#[derive(Parser)]
#[command(about = "Classifies stored OAuth grants and alerts on or revokes the risky ones")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value_t = Config::default_path())]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting grantwatch notifier");

    let config = Config::load(&args.config)?;
    info!("Config loaded from {}", args.config);

    let registry = ScopeRegistry::load(&config.notifier.scopes_file)?;
    info!("Scope registry loaded ({} scopes)", registry.len());

    let policy = PolicyLists::load(
        &config.notifier.whitelist_file,
        &config.notifier.blacklist_file,
    )?;
    info!(
        "Policy lists loaded ({} whitelisted, {} blacklisted)",
        policy.whitelist_len(),
        policy.blacklist_len()
    );

    let templates = Templates {
        default: std::fs::read_to_string(&config.notifier.template_file)?,
        blacklist: std::fs::read_to_string(&config.notifier.blacklist_template_file)?,
    };

    let mailer = Mailer::new(
        &config.smtp,
        &config.notifier.sender_name,
        &config.notifier.sender_email,
        &config.notifier.audit_recipient,
    )?;

    let es = EsClient::new(&config.elasticsearch);
    let reports = ReportsClient::new(&config.reports);
    let notifier = Notifier::new(
        reports,
        es,
        registry,
        policy,
        mailer,
        templates,
        &config.notifier,
    );

    schedule::run_every("notifier", config.notifier.run_every_minutes, |cycle| {
        notifier.notify(Utc::now(), cycle)
    })
    .await;

    Ok(())
}
