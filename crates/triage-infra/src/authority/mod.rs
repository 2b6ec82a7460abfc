//! Reference authorities backed by the public help center.
//!
//! [`HelpCenterArticleAuthority`] answers per-article existence checks and
//! [`SitemapListing`] supplies the full published-page listing. Either may
//! be absent from config; the validator treats a missing authority as
//! "cannot say".

pub mod help_center;
pub mod sitemap;

use std::time::Duration;

use triage_core::validator::ReferenceValidator;
use triage_types::config::ValidatorConfig;
use triage_types::error::AuthorityError;

pub use help_center::HelpCenterArticleAuthority;
pub use sitemap::SitemapListing;

/// Validator wired to whichever HTTP authorities are configured.
pub type HttpReferenceValidator =
    ReferenceValidator<Option<HelpCenterArticleAuthority>, Option<SitemapListing>>;

const AUTHORITY_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the validator from config, sharing one HTTP client between authorities.
pub fn build_validator(config: &ValidatorConfig) -> Result<HttpReferenceValidator, AuthorityError> {
    let client = reqwest::Client::builder()
        .timeout(AUTHORITY_TIMEOUT)
        .user_agent(concat!("triage/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AuthorityError::Request(format!("failed to create HTTP client: {e}")))?;

    let articles = config
        .help_center_base_url
        .as_deref()
        .map(|base| HelpCenterArticleAuthority::new(client.clone(), base));
    let listing = config
        .sitemap_url
        .as_deref()
        .map(|url| SitemapListing::new(client.clone(), url));

    tracing::debug!(
        article_authority = articles.is_some(),
        sitemap = listing.is_some(),
        support_domain = %config.support_domain,
        "Reference validator configured"
    );

    Ok(ReferenceValidator::new(articles, listing, config))
}
