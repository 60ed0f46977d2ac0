//! A complete harvest run: fetch, merge, annotate.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::fetch::{self, HttpFetcher, PageFetcher};
use crate::geo::{self, CountryLookup, MmdbCountryLookup};
use crate::pipeline::{AnnotationPipeline, PipelineOutput};
use crate::probe::{Prober, TcpProber};
use crate::store::{BlobStore, LinkStore};

use log::info;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Unique links extracted from all sources.
    pub harvested: usize,
    /// Links new to the store.
    pub appended: usize,
    /// Result of the annotation pass.
    pub output: PipelineOutput,
}

/// Runs the batch job over the configured sources.
pub struct Harvester {
    /// Configuration for the run.
    pub config: HarvestConfig,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    /// Run with the production collaborators: HTTP retrieval, the MaxMind
    /// country database (downloaded if missing) and TCP probing.
    pub async fn run(&self, blobs: &dyn BlobStore) -> Result<RunSummary, HarvestError> {
        geo::ensure_database(
            &self.config.geoip_db_path,
            &self.config.geoip_db_url,
            self.config.geoip_download_timeout,
        )
        .await?;
        let lookup = MmdbCountryLookup::open(&self.config.geoip_db_path)?;
        let fetcher = HttpFetcher::new(self.config.fetch_timeout)?;

        self.run_with(&fetcher, blobs, &lookup, &TcpProber).await
    }

    /// Run with injected collaborators.
    pub async fn run_with(
        &self,
        fetcher: &dyn PageFetcher,
        blobs: &dyn BlobStore,
        lookup: &dyn CountryLookup,
        prober: &dyn Prober,
    ) -> Result<RunSummary, HarvestError> {
        let links = fetch::harvest(&self.config, fetcher).await;
        let appended = LinkStore::new(blobs)
            .merge(&links, &self.config.store_key)
            .await?;

        let output = AnnotationPipeline::new(self.config.clone())
            .run(blobs, lookup, prober)
            .await?;

        info!(
            "Run complete: {} harvested, {} new, {} stored",
            links.len(),
            appended,
            output.main.len()
        );

        Ok(RunSummary {
            harvested: links.len(),
            appended,
            output,
        })
    }
}
