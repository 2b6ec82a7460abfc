//! Link extraction, normalisation and stripping for answer text.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// `[anchor](https://...)` with an optional `"title"`.
static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\[([^\]]*)\]\(\s*(https?://[^\s)]+)(?:\s+"[^"]*")?\s*\)"#)
        .expect("markdown link pattern is valid")
});

static BARE_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"'`\]\[]+"#).expect("bare url pattern is valid"));

static ARTICLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/articles/(\d+)").expect("article id pattern is valid"));

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', '!', '?', ')'];

/// A link found in answer text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub url: String,
    /// Anchor text for markdown links; `None` for bare URLs.
    pub anchor_text: Option<String>,
}

/// Every distinct link in `text` that points at `support_domain` or one of
/// its subdomains, in first-seen order.
pub fn extract_references(text: &str, support_domain: &str) -> Vec<Reference> {
    let mut refs = Vec::new();
    let mut seen = HashSet::new();
    let mut markdown_spans = Vec::new();

    for caps in MARKDOWN_LINK.captures_iter(text) {
        let (Some(whole), Some(anchor), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        markdown_spans.push(whole.range());
        let url = url.as_str().to_string();
        if is_support_url(&url, support_domain) && seen.insert(url.clone()) {
            refs.push(Reference {
                url,
                anchor_text: Some(anchor.as_str().trim().to_string()),
            });
        }
    }

    for m in BARE_URL.find_iter(text) {
        if markdown_spans.iter().any(|span| span.contains(&m.start())) {
            continue;
        }
        let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION).to_string();
        if is_support_url(&url, support_domain) && seen.insert(url.clone()) {
            refs.push(Reference {
                url,
                anchor_text: None,
            });
        }
    }

    refs
}

/// Lowercased host of an http(s) URL, without port or userinfo.
pub fn host_of(url: &str) -> Option<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .or_else(|| {
            let lower = url.get(..8)?.to_ascii_lowercase();
            if lower == "https://" {
                url.get(8..)
            } else if lower.starts_with("http://") {
                url.get(7..)
            } else {
                None
            }
        })?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host = authority.rsplit('@').next().unwrap_or(authority);
    let host = host.split(':').next().unwrap_or(host);
    if host.is_empty() {
        None
    } else {
        Some(host.to_ascii_lowercase())
    }
}

/// Whether `url` points at `domain` or a subdomain of it.
pub fn is_support_url(url: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    match host_of(url) {
        Some(host) => host == domain || host.ends_with(&format!(".{domain}")),
        None => false,
    }
}

/// Help-center article id from a `/articles/<digits>` path segment.
pub fn article_id(url: &str) -> Option<u64> {
    ARTICLE_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical form used for cache keys and listing membership: lowercase
/// scheme and host, no query, no fragment, no trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);

    let (scheme, rest) = match without_query.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => return without_query.trim_end_matches('/').to_string(),
    };
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    format!(
        "{scheme}://{}{}",
        authority.to_ascii_lowercase(),
        path.trim_end_matches('/')
    )
}

/// Replace invalid markdown links with their anchor text and remove invalid
/// bare URLs.
pub fn strip_links(text: &str, invalid: &[String]) -> String {
    if invalid.is_empty() {
        return text.to_string();
    }
    let invalid: HashSet<&str> = invalid.iter().map(String::as_str).collect();

    let without_markdown = MARKDOWN_LINK.replace_all(text, |caps: &regex::Captures<'_>| {
        let url = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        if invalid.contains(url) {
            caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default().to_string()
        } else {
            caps.get(0).map(|m| m.as_str()).unwrap_or_default().to_string()
        }
    });

    // Bare URLs inside surviving markdown links are left alone.
    let spans: Vec<std::ops::Range<usize>> = MARKDOWN_LINK
        .find_iter(&without_markdown)
        .map(|m| m.range())
        .collect();

    let mut out = String::with_capacity(without_markdown.len());
    let mut last = 0;
    for m in BARE_URL.find_iter(&without_markdown) {
        if spans.iter().any(|span| span.contains(&m.start())) {
            continue;
        }
        let url = m.as_str().trim_end_matches(TRAILING_PUNCTUATION);
        if invalid.contains(url) {
            out.push_str(&without_markdown[last..m.start()]);
            last = m.start() + url.len();
        }
    }
    out.push_str(&without_markdown[last..]);

    collapse_spaces(&out)
}

/// Collapse runs of spaces left behind by removed URLs, keeping newlines.
fn collapse_spaces(text: &str) -> String {
    text.lines()
        .map(|line| {
            let mut collapsed = String::with_capacity(line.len());
            let mut prev_space = false;
            for ch in line.chars() {
                if ch == ' ' {
                    if !prev_space {
                        collapsed.push(ch);
                    }
                    prev_space = true;
                } else {
                    collapsed.push(ch);
                    prev_space = false;
                }
            }
            collapsed.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "help.example.com";

    #[test]
    fn test_extracts_markdown_and_bare_links_on_domain() {
        let text = "See [Exporting data](https://help.example.com/hc/en-us/articles/123-Export) \
            and https://help.example.com/hc/en-us/articles/456. Also https://other.com/x.";
        let refs = extract_references(text, DOMAIN);
        assert_eq!(
            refs,
            vec![
                Reference {
                    url: "https://help.example.com/hc/en-us/articles/123-Export".to_string(),
                    anchor_text: Some("Exporting data".to_string()),
                },
                Reference {
                    url: "https://help.example.com/hc/en-us/articles/456".to_string(),
                    anchor_text: None,
                },
            ]
        );
    }

    #[test]
    fn test_subdomain_matches_but_lookalike_does_not() {
        assert!(is_support_url("https://eu.help.example.com/a", DOMAIN));
        assert!(is_support_url("HTTPS://Help.Example.com/a", DOMAIN));
        assert!(!is_support_url("https://nothelp.example.com/a", DOMAIN));
        assert!(!is_support_url("https://help.example.com.evil.io/a", DOMAIN));
        assert!(is_support_url("https://help.example.com:443/a", DOMAIN));
    }

    #[test]
    fn test_trailing_punctuation_trimmed_from_bare_urls() {
        let text = "(see https://help.example.com/articles/9), or https://help.example.com/x!";
        let urls: Vec<String> = extract_references(text, DOMAIN)
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://help.example.com/articles/9",
                "https://help.example.com/x"
            ]
        );
    }

    #[test]
    fn test_duplicates_validated_once() {
        let text = "[A](https://help.example.com/a) again [B](https://help.example.com/a) \
            and https://help.example.com/a";
        let refs = extract_references(text, DOMAIN);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].anchor_text.as_deref(), Some("A"));
    }

    #[test]
    fn test_article_id() {
        assert_eq!(
            article_id("https://help.example.com/hc/en-us/articles/360001234-Title"),
            Some(360001234)
        );
        assert_eq!(article_id("https://help.example.com/hc/en-us/sections/1"), None);
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url("HTTPS://Help.Example.COM/hc/en-us/articles/1-Title/?utm=x#top"),
            "https://help.example.com/hc/en-us/articles/1-Title"
        );
        assert_eq!(
            normalize_url("https://help.example.com/"),
            "https://help.example.com"
        );
    }

    #[test]
    fn test_strip_links() {
        let text = "Read [the guide](https://help.example.com/fake) or \
            [this one](https://help.example.com/real). Bare: https://help.example.com/fake.";
        let stripped = strip_links(text, &["https://help.example.com/fake".to_string()]);
        assert_eq!(
            stripped,
            "Read the guide or [this one](https://help.example.com/real). Bare: ."
        );
    }

    #[test]
    fn test_strip_links_noop_without_invalid() {
        let text = "Nothing [here](https://help.example.com/a).";
        assert_eq!(strip_links(text, &[]), text);
    }
}
