//! URL resolution and query assembly.

use crate::error::Error;
use url::Url;

/// Resolve a request URL against the optional base.
///
/// Absolute `http(s)` URLs pass through. Protocol-relative URLs are rejected
/// outright: an ambiguous scheme could send credentials over plaintext.
/// Anything else is joined to the base with exactly one `/`.
pub(crate) fn resolve(base: Option<&str>, raw: &str) -> Result<Url, Error> {
    if raw.starts_with("//") {
        return Err(Error::Network {
            url: raw.to_string(),
            message: "protocol-relative URLs are not allowed".to_string(),
        });
    }
    if let Some(scheme) = leading_scheme(raw) {
        if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") {
            return Err(Error::Network {
                url: raw.to_string(),
                message: format!("unsupported URL scheme `{scheme}`"),
            });
        }
        return Url::parse(raw).map_err(|e| Error::Network {
            url: raw.to_string(),
            message: format!("invalid URL: {e}"),
        });
    }
    let Some(base) = base else {
        return Err(Error::Network {
            url: raw.to_string(),
            message: "relative URL with no base URL configured".to_string(),
        });
    };
    let joined =
        format!("{}/{}", base.trim_end_matches('/'), raw.trim_start_matches('/'));
    Url::parse(&joined).map_err(|e| Error::Network {
        url: joined.clone(),
        message: format!("invalid URL: {e}"),
    })
}

/// A scheme counts only at offset zero: `alpha (alnum | + | - | .)*` before
/// `://`. A `://` later in the string (say, inside a query value) leaves the
/// URL relative.
fn leading_scheme(raw: &str) -> Option<&str> {
    let (scheme, _) = raw.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        Some(scheme)
    } else {
        None
    }
}

/// Append query parameters in insertion order, skipping absent values.
/// Characters already valid in a query component are not re-encoded.
pub(crate) fn append_query(url: &mut Url, params: &[(String, Option<String>)]) {
    let mut extra = String::new();
    for (key, value) in params {
        let Some(value) = value else { continue };
        if !extra.is_empty() {
            extra.push('&');
        }
        extra.push_str(key);
        extra.push('=');
        extra.push_str(value);
    }
    if extra.is_empty() {
        return;
    }
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{extra}"),
        _ => extra,
    };
    url.set_query(Some(&combined));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_urls_pass_through() {
        let url = resolve(None, "https://api.test/v1/x").unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/x");
    }

    #[test]
    fn absolute_scheme_matching_is_case_insensitive() {
        let url = resolve(None, "HTTPS://api.test/v1/x").unwrap();
        assert_eq!(url.as_str(), "https://api.test/v1/x");
    }

    #[test]
    fn scheme_like_text_past_offset_zero_stays_relative() {
        let url =
            resolve(Some("https://api.test"), "/proxy?target=http://example.com").unwrap();
        assert_eq!(url.as_str(), "https://api.test/proxy?target=http://example.com");
    }

    #[test]
    fn protocol_relative_urls_are_rejected() {
        let err = resolve(Some("https://api.test"), "//evil.test/x").unwrap_err();
        assert!(err.is_network());
        assert!(err.to_string().contains("protocol-relative"));
    }

    #[test]
    fn non_http_schemes_are_rejected() {
        let err = resolve(None, "ftp://files.test/x").unwrap_err();
        assert!(err.to_string().contains("scheme"));
    }

    #[test]
    fn relative_joins_with_exactly_one_slash() {
        for (base, path) in [
            ("https://api.test", "/v1/x"),
            ("https://api.test/", "v1/x"),
            ("https://api.test/", "/v1/x"),
            ("https://api.test", "v1/x"),
        ] {
            let url = resolve(Some(base), path).unwrap();
            assert_eq!(url.as_str(), "https://api.test/v1/x", "base={base} path={path}");
        }
    }

    #[test]
    fn relative_without_base_is_an_error() {
        let err = resolve(None, "/v1/x").unwrap_err();
        assert!(err.to_string().contains("no base URL"));
    }

    #[test]
    fn query_appends_in_insertion_order_skipping_none() {
        let mut url = resolve(None, "https://api.test/x").unwrap();
        append_query(
            &mut url,
            &[
                ("b".into(), Some("2".into())),
                ("a".into(), None),
                ("c".into(), Some("3".into())),
            ],
        );
        assert_eq!(url.query(), Some("b=2&c=3"));
    }

    #[test]
    fn query_extends_an_existing_query() {
        let mut url = resolve(None, "https://api.test/x?a=1").unwrap();
        append_query(&mut url, &[("b".into(), Some("2".into()))]);
        assert_eq!(url.query(), Some("a=1&b=2"));
    }

    #[test]
    fn valid_query_characters_are_not_reencoded() {
        let mut url = resolve(None, "https://api.test/x").unwrap();
        append_query(&mut url, &[("q".into(), Some("a%20b+c".into()))]);
        assert_eq!(url.query(), Some("q=a%20b+c"));
    }
}
