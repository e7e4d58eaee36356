//! Link-header resource hints.
//!
//! Hosts that can act on `rel=preload` / `rel=prefetch` hints (a browser
//! shell, a warming proxy) register a [`LinkHintSink`] at construction. The
//! pipeline forwards hints best-effort, capped per client lifetime, and the
//! response itself is never affected.

use http::header::{HeaderMap, LINK};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lifetime cap on forwarded hints per client.
pub(crate) const MAX_HINTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintKind {
    Preload,
    Prefetch,
}

/// Host-provided receiver for resource hints.
pub trait LinkHintSink: Send + Sync {
    fn register(&self, url: &str, kind: HintKind);
}

/// Scan `Link` headers and forward preload/prefetch entries while the
/// budget lasts.
pub(crate) fn scan_link_headers(
    headers: &HeaderMap,
    sink: &dyn LinkHintSink,
    budget: &AtomicUsize,
) {
    for value in headers.get_all(LINK) {
        let Ok(value) = value.to_str() else { continue };
        for entry in value.split(',') {
            let Some((target, kind)) = parse_link_entry(entry) else { continue };
            if budget.fetch_add(1, Ordering::Relaxed) >= MAX_HINTS {
                return;
            }
            sink.register(target, kind);
        }
    }
}

/// Parse one `<url>; rel=preload` entry; returns `None` for other rels.
fn parse_link_entry(entry: &str) -> Option<(&str, HintKind)> {
    let entry = entry.trim();
    let close = entry.find('>')?;
    let target = entry.get(1..close)?;
    if !entry.starts_with('<') || target.is_empty() {
        return None;
    }
    for param in entry[close + 1..].split(';') {
        let mut parts = param.splitn(2, '=');
        let name = parts.next()?.trim();
        if !name.eq_ignore_ascii_case("rel") {
            continue;
        }
        let rels = parts.next().unwrap_or("").trim().trim_matches('"');
        for rel in rels.split_ascii_whitespace() {
            if rel.eq_ignore_ascii_case("preload") {
                return Some((target, HintKind::Preload));
            }
            if rel.eq_ignore_ascii_case("prefetch") {
                return Some((target, HintKind::Prefetch));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        hints: Mutex<Vec<(String, HintKind)>>,
    }

    impl LinkHintSink for RecordingSink {
        fn register(&self, url: &str, kind: HintKind) {
            self.hints.lock().unwrap().push((url.to_string(), kind));
        }
    }

    fn headers_with_link(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(LINK, value.parse().unwrap());
        headers
    }

    #[test]
    fn parses_preload_and_prefetch_entries() {
        let sink = RecordingSink::default();
        let budget = AtomicUsize::new(0);
        let headers = headers_with_link(
            "</app.js>; rel=preload; as=script, </next.html>; rel=\"prefetch\", </other>; rel=stylesheet",
        );
        scan_link_headers(&headers, &sink, &budget);

        let hints = sink.hints.lock().unwrap();
        assert_eq!(
            *hints,
            vec![
                ("/app.js".to_string(), HintKind::Preload),
                ("/next.html".to_string(), HintKind::Prefetch),
            ]
        );
    }

    #[test]
    fn ignores_malformed_entries() {
        let sink = RecordingSink::default();
        let budget = AtomicUsize::new(0);
        let headers = headers_with_link("garbage, <>; rel=preload, </x>; as=script");
        scan_link_headers(&headers, &sink, &budget);
        assert!(sink.hints.lock().unwrap().is_empty());
    }

    #[test]
    fn budget_caps_forwarded_hints() {
        let sink = RecordingSink::default();
        let budget = AtomicUsize::new(MAX_HINTS - 1);
        let headers =
            headers_with_link("</a>; rel=preload, </b>; rel=preload, </c>; rel=preload");
        scan_link_headers(&headers, &sink, &budget);
        assert_eq!(sink.hints.lock().unwrap().len(), 1, "only one slot remained");
    }
}
