//! # proxy-link-harvester
//!
//! Harvests vless, vmess, trojan and shadowsocks links from public channel
//! previews, keeps them in a deduplicated append-only store, and rewrites
//! each link's label with the flag and country of its endpoint.
//!
//! A run writes three artifacts: the relabeled store itself, a sampled list
//! of vmess links, and a short list of links whose endpoint accepted a TCP
//! connection.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod geo;
pub mod harvester;
pub mod link;
pub mod pipeline;
pub mod probe;
pub mod resolve;
pub mod store;

pub use config::{HarvestConfig, HarvestConfigBuilder};
pub use error::{ConfigError, FetchError, GeoIpError, HarvestError, StoreError};
pub use extract::extract_links;
pub use fetch::{HttpFetcher, PageFetcher};
pub use geo::{CountryCode, CountryLookup, MmdbCountryLookup};
pub use harvester::{Harvester, RunSummary};
pub use link::Protocol;
pub use pipeline::{AnnotationPipeline, PipelineOutput};
pub use probe::{Prober, TcpProber};
pub use resolve::{EndpointResolver, Resolution};
pub use store::{BlobStore, FileStore, LinkStore, MemoryStore};
