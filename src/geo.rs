//! Country lookup for endpoint addresses and flag rendering.

use crate::error::GeoIpError;
use crate::store;

use log::{debug, info};
use maxminddb::MaxMindDBError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Offset from an ASCII capital letter to its regional indicator symbol.
const REGIONAL_INDICATOR_OFFSET: u32 = 127397;

/// ISO 3166-1 alpha-2 country code, stored uppercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    /// Parse a two-letter code, case-insensitively.
    pub fn new(code: &str) -> Option<Self> {
        match code.as_bytes() {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                Some(Self([a.to_ascii_uppercase(), b.to_ascii_uppercase()]))
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII letters.
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    /// The flag emoji: one regional indicator symbol per letter.
    pub fn flag(&self) -> String {
        self.0
            .iter()
            .filter_map(|&c| char::from_u32(c as u32 + REGIONAL_INDICATOR_OFFSET))
            .collect()
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flag for an optional code; empty when the code is unknown.
pub fn flag(code: Option<CountryCode>) -> String {
    code.map(|c| c.flag()).unwrap_or_default()
}

/// Display label for a country: flag, a space, then the code.
///
/// An unknown country renders as an empty flag and a blank code.
pub fn country_label(code: Option<CountryCode>) -> String {
    let text = code.map(|c| c.to_string()).unwrap_or_default();
    format!("{} {}", flag(code), text)
}

/// Maps literal addresses to countries.
pub trait CountryLookup: Send + Sync {
    /// Country of `ip`, or `None` when unknown.
    fn lookup(&self, ip: IpAddr) -> Option<CountryCode>;
}

impl CountryLookup for HashMap<IpAddr, CountryCode> {
    fn lookup(&self, ip: IpAddr) -> Option<CountryCode> {
        self.get(&ip).copied()
    }
}

#[derive(Deserialize, Debug)]
struct CountryRecord {
    country: Option<CountryInfo>,
    registered_country: Option<CountryInfo>,
}

#[derive(Deserialize, Debug)]
struct CountryInfo {
    iso_code: Option<String>,
}

/// `CountryLookup` backed by a MaxMind GeoLite2 country database.
pub struct MmdbCountryLookup {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl MmdbCountryLookup {
    /// Open the database at `path`.
    pub fn open(path: &Path) -> Result<Self, GeoIpError> {
        let data = std::fs::read(path).map_err(|source| GeoIpError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(data)
    }

    /// Open a database already loaded into memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, GeoIpError> {
        let reader = maxminddb::Reader::from_source(data)?;
        Ok(Self { reader })
    }
}

impl CountryLookup for MmdbCountryLookup {
    fn lookup(&self, ip: IpAddr) -> Option<CountryCode> {
        match self.reader.lookup::<CountryRecord>(ip) {
            Ok(record) => record
                .country
                .or(record.registered_country)
                .and_then(|c| c.iso_code)
                .and_then(|code| CountryCode::new(&code)),
            Err(MaxMindDBError::AddressNotFoundError(_)) => {
                debug!("IP address {} not found in the country database", ip);
                None
            }
            Err(e) => {
                debug!("Country lookup for {} failed: {}", ip, e);
                None
            }
        }
    }
}

/// Download the country database to `path` unless it is already present.
///
/// Returns `true` when a download took place.
pub async fn ensure_database(
    path: &Path,
    url: &str,
    timeout: Duration,
) -> Result<bool, GeoIpError> {
    if store::file_exists(path).await {
        return Ok(false);
    }

    info!("Downloading country database from {}", url);
    let io_error = |source| GeoIpError::Io {
        path: path.to_path_buf(),
        source,
    };

    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let mut response = client.get(url).send().await?.error_for_status()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
    }

    // Stream into a sibling file so an interrupted download never looks complete.
    let partial = path.with_extension("part");
    let mut file = tokio::fs::File::create(&partial).await.map_err(io_error)?;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await.map_err(io_error)?;
    }
    file.flush().await.map_err(io_error)?;
    drop(file);
    tokio::fs::rename(&partial, path).await.map_err(io_error)?;

    info!("Country database saved to {}", path.display());
    Ok(true)
}
