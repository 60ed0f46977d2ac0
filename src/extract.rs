//! Link extraction from channel preview pages.

use crate::link;

use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;

static MESSAGE_TEXT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.tgme_widget_message_text.js-message_text")
        .expect("message text selector is valid")
});

static CODE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("code").expect("code selector is valid"));

/// Extract the set of proxy links found in a page.
///
/// Each message text block contributes at most one link: the trimmed text of
/// its first `code` element, reduced to a single protocol.
pub fn extract_links(page: &str) -> HashSet<String> {
    let document = Html::parse_document(page);

    document
        .select(&MESSAGE_TEXT)
        .filter_map(|message| message.select(&CODE).next())
        .filter_map(|code| {
            let text: String = code.text().collect();
            link::single_protocol_link(text.trim())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> String {
        format!(
            r#"<div class="tgme_widget_message_wrap"><div class="tgme_widget_message_text js-message_text" dir="auto">{body}</div></div>"#
        )
    }

    fn page(messages: &[String]) -> String {
        format!("<html><body>{}</body></html>", messages.concat())
    }

    #[test]
    fn extracts_code_span_from_message() {
        let html = page(&[message(
            "New config:<br><code> vless://id@203.0.113.5:443?type=ws#node </code>",
        )]);
        let links = extract_links(&html);
        assert_eq!(links.len(), 1);
        assert!(links.contains("vless://id@203.0.113.5:443?type=ws#node"));
    }

    #[test]
    fn ignores_messages_without_code() {
        let html = page(&[message("vless://id@203.0.113.5:443#plain-text")]);
        assert!(extract_links(&html).is_empty());
    }

    #[test]
    fn ignores_code_outside_message_blocks() {
        let html = "<div class=\"other\"><code>trojan://pw@1.1.1.1:443#x</code></div>";
        assert!(extract_links(html).is_empty());
    }

    #[test]
    fn discards_code_without_protocol() {
        let html = page(&[message("<code>https://example.com</code>")]);
        assert!(extract_links(&html).is_empty());
    }

    #[test]
    fn only_first_code_element_counts() {
        let html = page(&[message(
            "<code>trojan://pw@1.1.1.1:443#a</code><code>ss://x@2.2.2.2:8388#b</code>",
        )]);
        let links = extract_links(&html);
        assert_eq!(links.len(), 1);
        assert!(links.contains("trojan://pw@1.1.1.1:443#a"));
    }

    #[test]
    fn duplicate_spans_collapse() {
        let span = "<code>ss://x@2.2.2.2:8388#b</code>";
        let html = page(&[message(span), message(span)]);
        assert_eq!(extract_links(&html).len(), 1);
    }

    #[test]
    fn mixed_protocol_span_yields_one_link() {
        let html = page(&[message("<code>vless://A trojan://B</code>")]);
        let links: Vec<_> = extract_links(&html).into_iter().collect();
        assert_eq!(links.len(), 1);
        assert!(links[0].starts_with("vless://"));
    }

    #[test]
    fn decodes_entities_in_code_text() {
        let html = page(&[message(
            "<code>vless://id@1.2.3.4:443?type=ws&amp;security=tls#n</code>",
        )]);
        assert!(extract_links(&html).contains("vless://id@1.2.3.4:443?type=ws&security=tls#n"));
    }
}
