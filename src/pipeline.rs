//! Label rewriting, isolation and reachability shortlisting of stored links.

use crate::config::HarvestConfig;
use crate::error::StoreError;
use crate::geo::CountryLookup;
use crate::link::Protocol;
use crate::probe::Prober;
use crate::resolve::{EndpointResolver, Resolution};
use crate::store::{self, BlobStore, LinkStore};

use futures::{stream, StreamExt};
use log::{debug, info};
use rand::Rng;
use std::collections::HashSet;
use std::net::SocketAddr;

/// The three partitions produced by one pipeline pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutput {
    /// Every non-isolated line, relabeled where applicable.
    pub main: Vec<String>,
    /// Isolated-protocol lines, sampled down to the cap.
    pub isolated: Vec<String>,
    /// Lines whose endpoint accepted a connection, in store order.
    pub reachable: Vec<String>,
    /// Number of endpoints probed.
    pub probed: usize,
    /// Lines left unexamined after the reachable cap was hit.
    pub unexamined: usize,
}

/// Pick `cap` lines uniformly at random, keeping their relative order.
pub fn sample_capped<R: Rng + ?Sized>(lines: Vec<String>, cap: usize, rng: &mut R) -> Vec<String> {
    if lines.len() <= cap {
        return lines;
    }
    let mut picked = rand::seq::index::sample(rng, lines.len(), cap).into_vec();
    picked.sort_unstable();
    let picked: HashSet<usize> = picked.into_iter().collect();
    lines
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picked.contains(i))
        .map(|(_, line)| line)
        .collect()
}

/// A line held back until the reachability checks of its batch finish.
enum Pending {
    Isolated(String),
    Main(String),
    Candidate { line: String, addr: SocketAddr },
}

/// Rewrites the link store and derives the isolated and reachable outputs.
pub struct AnnotationPipeline {
    /// Configuration for the pipeline.
    pub config: HarvestConfig,
}

impl AnnotationPipeline {
    pub fn new(config: HarvestConfig) -> Self {
        Self { config }
    }

    /// Check the candidates of a batch concurrently and emit it in store order.
    async fn flush(
        &self,
        batch: &mut Vec<Pending>,
        prober: &dyn Prober,
        output: &mut PipelineOutput,
        isolated: &mut Vec<String>,
    ) {
        let timeout = self.config.probe_timeout;
        let addrs: Vec<SocketAddr> = batch
            .iter()
            .filter_map(|entry| match entry {
                Pending::Candidate { addr, .. } => Some(*addr),
                _ => None,
            })
            .collect();

        // `buffered` yields in input order.
        let results: Vec<bool> = stream::iter(addrs)
            .map(|addr| async move { prober.probe(addr, timeout).await })
            .buffered(self.config.probe_concurrency)
            .collect()
            .await;
        output.probed += results.len();

        let mut results = results.into_iter();
        for entry in batch.drain(..) {
            match entry {
                Pending::Isolated(line) => isolated.push(line),
                Pending::Main(line) => output.main.push(line),
                Pending::Candidate { line, addr } => {
                    if results.next().unwrap_or(false) {
                        debug!("Endpoint {} is reachable", addr);
                        output.reachable.push(line.clone());
                    }
                    output.main.push(line);
                }
            }
        }
    }

    /// Run one pass over `lines`.
    ///
    /// Lines are resolved in store order. Literal-IP endpoints are checked in
    /// batches no larger than the number of reachable slots still open, so the
    /// pass stops on exactly the line that fills the shortlist; the lines after
    /// it are neither resolved nor checked and are kept verbatim.
    pub async fn annotate(
        &self,
        lines: &[String],
        lookup: &dyn CountryLookup,
        prober: &dyn Prober,
    ) -> PipelineOutput {
        let cap = self.config.reachable_cap;
        let probing = self.config.enable_reachability_check && cap > 0;

        let mut resolver = EndpointResolver::new(self.config.placeholder_markers.clone());
        let mut output = PipelineOutput::default();
        let mut isolated = Vec::new();
        let mut batch = Vec::new();
        let mut candidates = 0;
        // A raw link re-harvested after its stored copy was relabeled
        // relabels to the same line again; keep the store a set.
        let mut seen = HashSet::new();
        let mut examined = 0;

        while examined < lines.len() && !(probing && output.reachable.len() >= cap) {
            let line = &lines[examined];
            examined += 1;

            match resolver.resolve(line, lookup) {
                Resolution::Isolated => batch.push(Pending::Isolated(line.clone())),
                Resolution::PassThrough => {
                    if seen.insert(line.clone()) {
                        batch.push(Pending::Main(line.clone()));
                    }
                }
                Resolution::Relabeled { line: relabeled, endpoint } => {
                    if !seen.insert(relabeled.clone()) {
                        continue;
                    }
                    match endpoint.and_then(|e| e.socket_addr()).filter(|_| probing) {
                        Some(addr) => {
                            batch.push(Pending::Candidate { line: relabeled, addr });
                            candidates += 1;
                        }
                        None => batch.push(Pending::Main(relabeled)),
                    }
                }
            }

            let open_slots = cap.saturating_sub(output.reachable.len());
            if candidates > 0 && candidates >= open_slots.min(self.config.probe_concurrency) {
                self.flush(&mut batch, prober, &mut output, &mut isolated).await;
                candidates = 0;
            }
        }
        self.flush(&mut batch, prober, &mut output, &mut isolated).await;

        if examined < lines.len() {
            info!("Reachable cap of {} hit at line {}", cap, examined);
        }
        for line in &lines[examined..] {
            output.unexamined += 1;
            if Protocol::of_line(line).is_some_and(|p| p.is_isolated()) {
                isolated.push(line.clone());
            } else if seen.insert(line.clone()) {
                output.main.push(line.clone());
            }
        }

        if isolated.len() > self.config.isolated_cap {
            debug!(
                "Sampling {} of {} isolated links",
                self.config.isolated_cap,
                isolated.len()
            );
        }
        output.isolated = sample_capped(isolated, self.config.isolated_cap, &mut rand::rng());
        output
    }

    /// Read the link store, rewrite it in place and write the other outputs.
    pub async fn run(
        &self,
        blobs: &dyn BlobStore,
        lookup: &dyn CountryLookup,
        prober: &dyn Prober,
    ) -> Result<PipelineOutput, StoreError> {
        let lines = LinkStore::new(blobs).load(&self.config.store_key).await?;
        info!("Annotating {} stored links", lines.len());

        let output = self.annotate(&lines, lookup, prober).await;

        blobs
            .write(&self.config.store_key, &store::join_lines(&output.main))
            .await?;
        blobs
            .write(&self.config.isolated_key, &store::join_lines(&output.isolated))
            .await?;
        if self.config.enable_reachability_check {
            blobs
                .write(&self.config.reachable_key, &store::join_lines(&output.reachable))
                .await?;
        }

        info!(
            "Wrote {} links, {} isolated, {} reachable ({} probed, {} unexamined)",
            output.main.len(),
            output.isolated.len(),
            output.reachable.len(),
            output.probed,
            output.unexamined
        );
        Ok(output)
    }
}
