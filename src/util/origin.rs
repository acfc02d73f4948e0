use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum SourceUrlError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// Parses a source URL, accepting only `http` and `https` with a host.
pub fn parse_source_url(url_str: &str) -> Result<Url, SourceUrlError> {
    let url = Url::parse(url_str)?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(SourceUrlError::UnsupportedScheme(scheme.to_owned())),
    }
    if url.host_str().is_none() {
        return Err(SourceUrlError::MissingHost);
    }
    Ok(url)
}

/// Rate-limit key for a URL: lowercase host plus explicit port.
///
/// Two feeds on `www.example.com` share a key; `example.com` does not.
/// Unparseable URLs key on the raw string so they still get paced.
pub fn origin_key(url_str: &str) -> String {
    match Url::parse(url_str) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{port}", host.to_ascii_lowercase()),
            (Some(host), None) => host.to_ascii_lowercase(),
            (None, _) => url_str.to_string(),
        },
        Err(_) => url_str.to_string(),
    }
}

/// True for HTTPS, or plain HTTP to a loopback host (used by tests and local proxies).
pub fn is_secure_or_loopback(base: &str) -> bool {
    let Ok(url) = Url::parse(base) else {
        return false;
    };
    match url.scheme() {
        "https" => true,
        "http" => matches!(
            url.host_str(),
            Some("localhost") | Some("127.0.0.1") | Some("[::1]")
        ),
        _ => false,
    }
}
