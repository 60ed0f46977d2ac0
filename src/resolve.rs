//! Endpoint parsing and label rewriting for stored link lines.

use crate::geo::{self, CountryLookup};
use crate::link::Protocol;

use log::debug;
use std::net::{IpAddr, SocketAddr};

/// Delimiter between a link and its display label.
pub const LABEL_DELIMITER: char = '#';

/// A literal-IP endpoint parsed from a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: IpAddr,
    /// Port, when the authority carries a valid one.
    pub port: Option<u16>,
}

impl Endpoint {
    /// Socket address to probe, if the port is known.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.port.map(|port| SocketAddr::new(self.ip, port))
    }
}

/// Outcome of resolving one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// An isolated-protocol link; left untouched.
    Isolated,
    /// No label delimiter; the line is kept as is.
    PassThrough,
    /// The label was rewritten.
    Relabeled {
        line: String,
        /// Set when the host was a literal IP.
        endpoint: Option<Endpoint>,
    },
}

/// Split the authority of a link (text before the label) into host and port.
///
/// The host is the text after the last `@` up to the next `:`; bracketed IPv6
/// hosts are unwrapped. Never fails: malformed input simply yields a host
/// that will not parse as an address.
pub fn split_authority(before_label: &str) -> (&str, Option<u16>) {
    let authority = before_label.rsplit('@').next().unwrap_or(before_label);

    let (host, rest) = match authority.strip_prefix('[') {
        Some(bracketed) => match bracketed.split_once(']') {
            Some((host, rest)) => (host, rest.strip_prefix(':')),
            None => (authority, None),
        },
        None => match authority.split_once(':') {
            Some((host, rest)) => (host, Some(rest)),
            None => (authority, None),
        },
    };

    let port = rest.and_then(|rest| {
        let end = rest.find(['?', '/']).unwrap_or(rest.len());
        rest[..end].parse::<u16>().ok()
    });

    (host, port)
}

/// Rewrites the labels of stored link lines.
///
/// Holds the label computed for the most recent literal-IP line, which is
/// reused for lines whose own label is a channel advertisement.
pub struct EndpointResolver {
    placeholder_markers: Vec<String>,
    last_label: Option<String>,
}

impl EndpointResolver {
    pub fn new(placeholder_markers: Vec<String>) -> Self {
        Self {
            placeholder_markers,
            last_label: None,
        }
    }

    fn is_placeholder(&self, label: &str) -> bool {
        self.placeholder_markers
            .iter()
            .any(|marker| !marker.is_empty() && label.contains(marker.as_str()))
    }

    /// Resolve one line.
    pub fn resolve(&mut self, line: &str, lookup: &dyn CountryLookup) -> Resolution {
        if Protocol::of_line(line).is_some_and(|p| p.is_isolated()) {
            return Resolution::Isolated;
        }

        let Some((before, after)) = line.split_once(LABEL_DELIMITER) else {
            return Resolution::PassThrough;
        };

        let (host, port) = split_authority(before);
        let (mut label, endpoint) = match host.parse::<IpAddr>() {
            Ok(ip) => {
                let code = lookup.lookup(ip);
                if code.is_none() {
                    debug!("No country for {} in line {}", ip, line);
                }
                let label = geo::country_label(code);
                self.last_label = Some(label.clone());
                (label, Some(Endpoint { ip, port }))
            }
            Err(_) => (after.trim().to_string(), None),
        };

        if self.is_placeholder(&label) {
            label = self
                .last_label
                .clone()
                .unwrap_or_else(|| geo::country_label(None));
        }

        Resolution::Relabeled {
            line: format!("{before}{LABEL_DELIMITER}{label}"),
            endpoint,
        }
    }
}
