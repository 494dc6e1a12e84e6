//! URL canonicalization for warm-up targets.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize an absolute URL so identical pages map to one queue item.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require http or https
/// 3. Lowercase the host (the url crate does this for special schemes)
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(format!("{trimmed}: {e}")))?;
    finish(parsed)
}

/// Resolve a sitemap `<loc>` against the sitemap's own URL, then canonicalize.
pub fn resolve(base: &Url, location: &str) -> Result<Url, UrlError> {
    let trimmed = location.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let joined = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(format!("{trimmed}: {e}")))?;
    finish(joined)
}

/// Same scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

fn finish(mut parsed: Url) -> Result<Url, UrlError> {
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(UrlError::InvalidUrl(format!("{parsed}: missing host")));
    }

    parsed.set_fragment(None);
    Ok(parsed)
}
