//! Sitemap-backed reference listing.
//!
//! Parses `<loc>` entries from a sitemap. A sitemap index is followed one
//! level deep; nested indexes are not.

use std::collections::HashSet;
use std::sync::LazyLock;

use futures_util::future::join_all;
use regex::Regex;

use triage_core::validator::ReferenceListing;
use triage_types::error::AuthorityError;

static LOC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>").expect("loc pattern is valid"));

#[derive(Debug, Clone)]
pub struct SitemapListing {
    client: reqwest::Client,
    url: String,
}

impl SitemapListing {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, AuthorityError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::UnexpectedStatus {
                status: status.as_u16(),
                message: format!("sitemap fetch failed for {url}"),
            });
        }
        response
            .text()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))
    }
}

impl ReferenceListing for SitemapListing {
    async fn list_known_references(&self) -> Result<HashSet<String>, AuthorityError> {
        let document = self.fetch(&self.url).await?;
        if !is_sitemap_index(&document) {
            return Ok(parse_locs(&document).into_iter().collect());
        }

        let children = parse_locs(&document);
        let fetched = join_all(children.iter().map(|child| self.fetch(child))).await;

        let mut urls = HashSet::new();
        let mut failures = 0usize;
        for (child, result) in children.iter().zip(fetched) {
            match result {
                Ok(doc) => urls.extend(parse_locs(&doc)),
                Err(err) => {
                    failures += 1;
                    tracing::warn!(sitemap = %child, error = %err, "Child sitemap fetch failed");
                }
            }
        }

        // Never return a partial listing.
        if failures > 0 {
            return Err(AuthorityError::Request(format!(
                "{failures} of {} child sitemaps failed",
                children.len()
            )));
        }
        Ok(urls)
    }
}

pub fn is_sitemap_index(document: &str) -> bool {
    document.contains("<sitemapindex")
}

/// All `<loc>` values in document order, XML entities decoded.
pub fn parse_locs(document: &str) -> Vec<String> {
    LOC.captures_iter(document)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .filter(|url| !url.is_empty())
        .collect()
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
