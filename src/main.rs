use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use std::path::PathBuf;

use proxy_link_harvester::config::{self, HarvestConfig};
use proxy_link_harvester::{FileStore, Harvester};

/// Harvest proxy links from public channels and label them by country
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file holding the list of channel names
    #[arg(short, long, value_name = "FILE", default_value = "telegram-channels.json")]
    channels: PathBuf,

    /// Directory the link store and outputs are written to
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Path of the GeoLite2 country database
    #[arg(long, value_name = "FILE", default_value = "GeoLite2-Country.mmdb")]
    geoip_db: PathBuf,

    /// Skip reachability probing
    #[arg(long, default_value_t = false)]
    no_probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let args = Args::parse();

    let sources = config::load_sources(&args.channels).await?;
    info!("Loaded {} channels from {}", sources.len(), args.channels.display());

    let config = HarvestConfig::builder()
        .sources(sources)
        .geoip_db_path(args.geoip_db)
        .enable_reachability_check(!args.no_probe)
        .build();

    let store = FileStore::new(args.output);
    let summary = Harvester::new(config).run(&store).await?;

    info!(
        "Done: {} links harvested, {} new, {} isolated, {} reachable",
        summary.harvested,
        summary.appended,
        summary.output.isolated.len(),
        summary.output.reachable.len()
    );
    Ok(())
}
