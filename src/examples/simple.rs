//! Simple example of using proxy-link-harvester as a library.

use proxy_link_harvester::{FileStore, HarvestConfig, Harvester};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Harvesting proxy links...");

    let config = HarvestConfig::builder()
        // public channel names, as they appear in https://t.me/s/<name>
        .sources(vec!["v2ray_configs_pool", "ConfigsHubPlus"])
        .fetch_timeout(Duration::from_secs(10))
        .fetch_retries(2)
        .retry_delay(Duration::from_secs(2))
        // keep the shortlist small, probing stops once it is full
        .reachable_cap(10)
        .probe_timeout(Duration::from_secs(3))
        .build();

    let store = FileStore::new("harvest-output");
    let summary = Harvester::new(config).run(&store).await?;

    println!("Harvested: {}", summary.harvested);
    println!("New links: {}", summary.appended);
    println!("Reachable:");
    for line in &summary.output.reachable {
        println!("  {}", line);
    }

    Ok(())
}
