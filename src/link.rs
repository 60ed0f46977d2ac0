//! Proxy link protocols and single-protocol disambiguation.

use std::fmt;

/// Proxy protocols recognised in harvested links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Vless,
    Vmess,
    Trojan,
    Shadowsocks,
}

impl Protocol {
    /// All protocols, in disambiguation priority order.
    pub const PRIORITY: [Protocol; 4] = [
        Protocol::Vless,
        Protocol::Vmess,
        Protocol::Trojan,
        Protocol::Shadowsocks,
    ];

    /// The URI prefix of this protocol.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Vless => "vless://",
            Self::Vmess => "vmess://",
            Self::Trojan => "trojan://",
            Self::Shadowsocks => "ss://",
        }
    }

    /// Protocol whose prefix starts `line`, if any.
    pub fn of_line(line: &str) -> Option<Protocol> {
        Self::PRIORITY
            .into_iter()
            .find(|p| line.starts_with(p.prefix()))
    }

    /// Whether links of this protocol are kept out of label rewriting.
    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::Vmess)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches("://"))
    }
}

/// Protocols whose prefix occurs anywhere in `span`, in priority order.
pub fn protocols_in(span: &str) -> Vec<Protocol> {
    Protocol::PRIORITY
        .into_iter()
        .filter(|p| span.contains(p.prefix()))
        .collect()
}

/// Reduce a candidate span to a single link.
///
/// Returns `None` when no protocol prefix occurs. A span with exactly one
/// protocol is kept verbatim. With several, the span is rebuilt around the
/// first occurrence of the highest-priority protocol, keeping the text on
/// both sides of it.
pub fn single_protocol_link(span: &str) -> Option<String> {
    let found = protocols_in(span);
    match found.as_slice() {
        [] => None,
        [_] => Some(span.to_string()),
        [first, ..] => {
            let prefix = first.prefix();
            let (before, after) = span.split_once(prefix)?;
            Some(format!("{before}{prefix}{after}"))
        }
    }
}
