//! CDN URL construction.

use imgdup_core::Resolution;

/// Error type for image URL construction failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty base URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse and normalise the CDN base URL.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an http(s) scheme
/// 3. Drop query and fragment
/// 4. Ensure the path ends with `/` so segments can be appended
pub fn parse_base(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = url::Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_query(None);
    parsed.set_fragment(None);

    if !parsed.path().ends_with('/') {
        let path = format!("{}/", parsed.path());
        parsed.set_path(&path);
    }

    Ok(parsed)
}

/// Build `<base>/<resolution token>/<image name>`.
///
/// The name is appended as a single percent-encoded path segment, so it can never add directories.
pub fn image_url(base: &url::Url, resolution: Resolution, name: &str) -> Result<url::Url, UrlError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| UrlError::InvalidUrl(format!("{base} cannot be a base")))?
        .pop_if_empty()
        .push(resolution.token())
        .push(name);
    Ok(url)
}
