//! Reference validation.
//!
//! Confirms that every support-domain link in a candidate answer points at
//! a page that exists. Authorities are consulted in order: the article API
//! for URLs carrying an article id, then the published-page listing. When
//! neither can answer, the link is accepted (permissive).

pub mod cache;
pub mod extract;

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use triage_types::config::ValidatorConfig;
use triage_types::error::{AuthorityError, CascadeError};
use triage_types::validation::{InvalidReference, ReferenceVerdict, ValidationOutcome};

use self::cache::{KnownReferences, ListingCache, TtlCache};
use self::extract::{Reference, article_id, extract_references, normalize_url};

/// Existence check against the help-center article API.
///
/// Implementations live in triage-infra (e.g., `HelpCenterArticleAuthority`).
pub trait ArticleAuthority: Send + Sync {
    /// True only if the article exists and is published.
    fn exists(
        &self,
        article_id: u64,
    ) -> impl Future<Output = Result<bool, AuthorityError>> + Send;
}

/// Full listing of published reference URLs (e.g., a sitemap).
pub trait ReferenceListing: Send + Sync {
    fn list_known_references(
        &self,
    ) -> impl Future<Output = Result<HashSet<String>, AuthorityError>> + Send;
}

/// No article authority configured.
impl ArticleAuthority for () {
    fn exists(&self, _article_id: u64) -> impl Future<Output = Result<bool, AuthorityError>> + Send {
        std::future::ready(Err(AuthorityError::NotConfigured))
    }
}

/// No listing configured.
impl ReferenceListing for () {
    fn list_known_references(
        &self,
    ) -> impl Future<Output = Result<HashSet<String>, AuthorityError>> + Send {
        std::future::ready(Err(AuthorityError::NotConfigured))
    }
}

impl<T: ArticleAuthority> ArticleAuthority for Option<T> {
    async fn exists(&self, article_id: u64) -> Result<bool, AuthorityError> {
        match self {
            Some(inner) => inner.exists(article_id).await,
            None => Err(AuthorityError::NotConfigured),
        }
    }
}

impl<T: ReferenceListing> ReferenceListing for Option<T> {
    async fn list_known_references(&self) -> Result<HashSet<String>, AuthorityError> {
        match self {
            Some(inner) => inner.list_known_references().await,
            None => Err(AuthorityError::NotConfigured),
        }
    }
}

type Listing = Option<Arc<KnownReferences>>;

/// Validates answer links with per-URL and listing caches.
#[derive(Debug)]
pub struct ReferenceValidator<A, L> {
    articles: A,
    listing: L,
    support_domain: String,
    verdicts: TtlCache<String, ReferenceVerdict>,
    listing_cache: ListingCache,
}

impl<A: ArticleAuthority, L: ReferenceListing> ReferenceValidator<A, L> {
    pub fn new(articles: A, listing: L, config: &ValidatorConfig) -> Self {
        Self {
            articles,
            listing,
            support_domain: config.support_domain.clone(),
            verdicts: TtlCache::new(Duration::from_secs(config.reference_cache_ttl_secs)),
            listing_cache: ListingCache::new(Duration::from_secs(config.sitemap_cache_ttl_secs)),
        }
    }

    pub fn support_domain(&self) -> &str {
        &self.support_domain
    }

    /// Validate every support-domain link in `text` concurrently.
    pub async fn validate(&self, text: &str) -> ValidationOutcome {
        let refs = extract_references(text, &self.support_domain);
        if refs.is_empty() {
            return ValidationOutcome::default();
        }

        let listing = OnceCell::new();
        let verdicts = join_all(refs.iter().map(|r| self.verdict(&r.url, &listing))).await;

        let invalid_references: Vec<InvalidReference> = refs
            .iter()
            .zip(verdicts)
            .filter(|(_, verdict)| !verdict.is_acceptable())
            .map(|(Reference { url, anchor_text }, _)| InvalidReference {
                url: url.clone(),
                anchor_text: anchor_text.clone(),
            })
            .collect();

        debug!(
            checked = refs.len(),
            invalid = invalid_references.len(),
            "References validated"
        );

        ValidationOutcome {
            invalid_references,
            checked: refs.len(),
        }
    }

    /// Validate a single URL (used by the `check-links` command).
    pub async fn validate_url(&self, url: &str) -> ReferenceVerdict {
        self.verdict(url, &OnceCell::new()).await
    }

    async fn verdict(&self, url: &str, listing: &OnceCell<Listing>) -> ReferenceVerdict {
        let key = normalize_url(url);
        if let Some(cached) = self.verdicts.get(&key) {
            return cached;
        }

        let verdict = match article_id(url) {
            Some(id) => match self.articles.exists(id).await {
                Ok(true) => ReferenceVerdict::Valid,
                Ok(false) => ReferenceVerdict::Invalid,
                Err(AuthorityError::NotConfigured) => self.listing_verdict(url, listing).await,
                Err(err) => {
                    let err = CascadeError::from(err);
                    warn!(error = %err, article_id = id, "Article lookup failed, using listing");
                    self.listing_verdict(url, listing).await
                }
            },
            None => self.listing_verdict(url, listing).await,
        };

        if verdict.is_definite() {
            self.verdicts.insert(key, verdict);
        }
        verdict
    }

    async fn listing_verdict(&self, url: &str, listing: &OnceCell<Listing>) -> ReferenceVerdict {
        let snapshot = listing.get_or_init(|| self.listing_snapshot()).await;
        match snapshot {
            Some(known) if !known.is_empty() => {
                if known.contains(url) {
                    ReferenceVerdict::Valid
                } else {
                    ReferenceVerdict::Invalid
                }
            }
            _ => ReferenceVerdict::Unknown,
        }
    }

    /// Current listing: cached if fresh, else refetched; the stale copy
    /// stands in when the refetch fails.
    async fn listing_snapshot(&self) -> Listing {
        if let Some(fresh) = self.listing_cache.fresh() {
            return Some(fresh);
        }

        match self.listing.list_known_references().await {
            Ok(urls) => {
                let known = KnownReferences::from_urls(urls.iter().map(String::as_str));
                debug!(entries = known.len(), "Reference listing refreshed");
                Some(self.listing_cache.store(known))
            }
            Err(AuthorityError::NotConfigured) => None,
            Err(err) => {
                let stale = self.listing_cache.stale();
                let err = CascadeError::from(err);
                warn!(error = %err, reusing_stale = stale.is_some(), "Reference listing fetch failed");
                stale
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedArticles, FixedListing};

    fn config() -> ValidatorConfig {
        ValidatorConfig {
            support_domain: "help.example.com".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_links_is_valid() {
        let validator = ReferenceValidator::new((), (), &config());
        let outcome = validator.validate("No links here.").await;
        assert!(!outcome.has_invalid());
        assert_eq!(outcome.checked, 0);
    }

    #[tokio::test]
    async fn test_article_authority_decides() {
        let articles = FixedArticles::with(&[123]);
        let validator = ReferenceValidator::new(articles, (), &config());
        let outcome = validator
            .validate(
                "[Real](https://help.example.com/hc/en-us/articles/123-Real) \
                 [Fake](https://help.example.com/hc/en-us/articles/999-Fake)",
            )
            .await;
        assert_eq!(outcome.checked, 2);
        assert_eq!(
            outcome.invalid_references,
            vec![InvalidReference {
                url: "https://help.example.com/hc/en-us/articles/999-Fake".to_string(),
                anchor_text: Some("Fake".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_listing_when_article_lookup_fails() {
        let listing = FixedListing::with(&["https://help.example.com/hc/en-us/articles/5-Five/"]);
        let validator = ReferenceValidator::new(FixedArticles::failing(), listing, &config());
        let outcome = validator
            .validate(
                "https://help.example.com/hc/en-us/articles/5-Five and \
                 https://help.example.com/hc/en-us/articles/6-Six",
            )
            .await;
        assert_eq!(outcome.invalid_urls(), vec!["https://help.example.com/hc/en-us/articles/6-Six"]);
    }

    #[tokio::test]
    async fn test_listing_matches_articles_by_id_regardless_of_slug() {
        let listing = FixedListing::with(&["https://help.example.com/hc/en-us/articles/5-Export-your-data"]);
        let validator = ReferenceValidator::new(FixedArticles::failing(), listing, &config());
        let outcome = validator
            .validate(
                "See https://help.example.com/hc/en-us/articles/5 and \
                 [Export](https://help.example.com/hc/en-us/articles/5-export-your-data) or \
                 https://help.example.com/hc/fr/articles/5-Exporter",
            )
            .await;
        assert_eq!(outcome.checked, 3);
        assert!(!outcome.has_invalid(), "{:?}", outcome.invalid_urls());
    }

    #[tokio::test]
    async fn test_listing_used_for_non_article_urls() {
        let listing = FixedListing::with(&["https://help.example.com/hc/en-us/sections/7"]);
        let validator = ReferenceValidator::new(FixedArticles::with(&[]), listing, &config());
        let outcome = validator
            .validate("https://help.example.com/hc/en-us/sections/7?x=1 https://help.example.com/nope")
            .await;
        assert_eq!(outcome.invalid_urls(), vec!["https://help.example.com/nope"]);
    }

    #[tokio::test]
    async fn test_permissive_without_authorities() {
        let validator = ReferenceValidator::new((), (), &config());
        let outcome = validator
            .validate("[Made up](https://help.example.com/hc/en-us/articles/42-Nope)")
            .await;
        assert!(!outcome.has_invalid());
        assert_eq!(outcome.checked, 1);
    }

    #[tokio::test]
    async fn test_permissive_when_authorities_unreachable() {
        let listing = FixedListing {
            fail_after: Some(0),
            ..Default::default()
        };
        let validator = ReferenceValidator::new(FixedArticles::failing(), listing, &config());
        let outcome = validator
            .validate("https://help.example.com/hc/en-us/articles/42-Nope")
            .await;
        assert!(!outcome.has_invalid());
    }

    #[tokio::test]
    async fn test_permissive_with_empty_listing() {
        let validator = ReferenceValidator::new((), FixedListing::default(), &config());
        let outcome = validator.validate("https://help.example.com/anything").await;
        assert!(!outcome.has_invalid());
    }

    #[tokio::test]
    async fn test_verdict_cached_within_ttl() {
        let articles = FixedArticles::with(&[1]);
        let validator = ReferenceValidator::new(articles.clone(), (), &config());
        let text = "https://help.example.com/articles/1";
        assert!(!validator.validate(text).await.has_invalid());
        assert!(!validator.validate(text).await.has_invalid());
        assert_eq!(articles.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_verdict_not_cached() {
        let articles = FixedArticles::failing();
        let validator = ReferenceValidator::new(articles.clone(), (), &config());
        let text = "https://help.example.com/articles/1";
        validator.validate(text).await;
        validator.validate(text).await;
        assert_eq!(articles.call_count(), 2);
    }

    #[tokio::test]
    async fn test_listing_fetched_once_per_batch() {
        let listing = FixedListing::with(&["https://help.example.com/a"]);
        let validator = ReferenceValidator::new((), listing.clone(), &config());
        validator
            .validate("https://help.example.com/a https://help.example.com/b https://help.example.com/c")
            .await;
        assert_eq!(listing.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_listing_reused_when_refetch_fails() {
        let listing = FixedListing {
            fail_after: Some(1),
            ..FixedListing::with(&["https://help.example.com/a"])
        };
        let cfg = ValidatorConfig {
            sitemap_cache_ttl_secs: 0,
            ..config()
        };
        let validator = ReferenceValidator::new((), listing.clone(), &cfg);

        let first = validator.validate("https://help.example.com/b").await;
        assert!(first.has_invalid());

        // Listing TTL is zero, so this refetches, fails, and falls back to
        // the stale copy. "/c" is a fresh key, so the verdict cache is not hit.
        let second = validator.validate("https://help.example.com/c").await;
        assert!(second.has_invalid());
        assert_eq!(listing.call_count(), 2);
    }
}
