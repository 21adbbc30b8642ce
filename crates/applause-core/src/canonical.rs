//! Post URL canonicalization.
//!
//! Readers reach the same post through many spellings of its URL: a mixed-case
//! host, an in-page anchor, an uppercase scheme. Every spelling must map to
//! the same storage key, so requests are keyed by a canonical form.
//!
//! # Canonicalization Rules
//!
//! - Parse as an absolute URL (WHATWG rules)
//! - Lowercase the scheme and host
//! - Drop the fragment
//! - Default an empty path to `/`
//! - Preserve the path case and the query string

use std::fmt;

use url::{Host, Url};

use crate::error::{Error, Result};

/// A post URL in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    /// Canonicalize a raw URL string.
    ///
    /// # Examples
    ///
    /// ```
    /// use applause_core::CanonicalUrl;
    ///
    /// let url = CanonicalUrl::parse("HTTPS://Example.com/Post/#comments").unwrap();
    /// assert_eq!(url.as_str(), "https://example.com/Post/");
    ///
    /// assert!(CanonicalUrl::parse("not a url").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let mut url = Url::parse(raw).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        url.set_fragment(None);

        // Special schemes (http, https, ...) already get a lowercase host from
        // the parser; opaque hosts of other schemes keep their case.
        if let Some(Host::Domain(domain)) = url.host()
            && domain.chars().any(|c| c.is_ascii_uppercase())
        {
            let lowered = domain.to_ascii_lowercase();
            url.set_host(Some(&lowered))
                .map_err(|e| Error::InvalidUrl(e.to_string()))?;
        }

        if url.path().is_empty() && !url.cannot_be_a_base() {
            url.set_path("/");
        }

        Ok(Self(url.into()))
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
