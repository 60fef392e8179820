//! URL Normalization
//!
//! Deterministic canonical form so that textually different but
//! semantically identical URLs hash to the same cache key. The canonical
//! form keeps `scheme://host/path` only: query and fragment are dropped
//! entirely.

use sha2::{Digest, Sha256};

use super::types::ScanError;

/// Canonicalized URL plus the extracted host.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedUrl {
    pub url: String,
    pub host: String,
}

/// Normalize a raw URL string.
///
/// - trims surrounding whitespace, rejects embedded whitespace
/// - defaults the scheme to `https`, rejects non-http(s) schemes
/// - lowercases scheme and host, strips default ports and userinfo
/// - drops query and fragment, trims a trailing slash on non-root paths
pub fn normalize(raw: &str) -> Result<NormalizedUrl, ScanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScanError::InvalidUrl {
            reason: "empty url".to_string(),
        });
    }
    if trimmed.chars().any(char::is_whitespace) {
        return Err(ScanError::InvalidUrl {
            reason: "url contains whitespace".to_string(),
        });
    }

    let (scheme, rest) = match trimmed.split_once("://") {
        Some((s, r)) => (s.to_lowercase(), r),
        None => ("https".to_string(), trimmed),
    };
    if scheme != "http" && scheme != "https" {
        return Err(ScanError::InvalidUrl {
            reason: format!("unsupported scheme '{}'", scheme),
        });
    }

    // Fragment, then query; both come after the path
    let rest = rest.split('#').next().unwrap_or("");
    let rest = rest.split('?').next().unwrap_or("");

    let (authority, path) = match rest.split_once('/') {
        Some((a, p)) => (a, p),
        None => (rest, ""),
    };

    // Userinfo is a classic phishing decoy (https://trusted.com@evil.tld);
    // the real host is what follows the last '@'
    let authority = authority.rsplit('@').next().unwrap_or("").to_lowercase();

    let (host, port) = match authority.rsplit_once(':') {
        Some((h, p)) => {
            let port: u16 = p.parse().map_err(|_| ScanError::InvalidUrl {
                reason: format!("invalid port '{}'", p),
            })?;
            (h.to_string(), Some(port))
        }
        None => (authority.clone(), None),
    };

    if host.is_empty() || !host.contains('.') {
        return Err(ScanError::InvalidUrl {
            reason: format!("invalid host '{}'", host),
        });
    }

    let default_port = if scheme == "http" { 80 } else { 443 };
    let host_port = match port {
        Some(p) if p != default_port => format!("{}:{}", host, p),
        _ => host.clone(),
    };

    let path = path.trim_end_matches('/');
    let url = if path.is_empty() {
        format!("{}://{}", scheme, host_port)
    } else {
        format!("{}://{}/{}", scheme, host_port, path)
    };

    Ok(NormalizedUrl { url, host })
}

/// SHA-256 of the normalized URL, hex-encoded; the cache key.
pub fn url_hash(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equivalent_forms_hash_identically() {
        let a = normalize("https://Example.com/a?x=1#y").unwrap();
        let b = normalize("example.com/a").unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(url_hash(&a.url), url_hash(&b.url));
    }

    #[test]
    fn test_idempotence() {
        let once = normalize("HTTP://Example.COM:80/Path/?q=1").unwrap();
        let twice = normalize(&once.url).unwrap();
        assert_eq!(once.url, twice.url);
    }

    #[test]
    fn test_scheme_defaulting_and_case() {
        let n = normalize("example.com/A/B").unwrap();
        assert_eq!(n.url, "https://example.com/A/B");
        assert_eq!(n.host, "example.com");
        // Path case is preserved; host case is not
        let n = normalize("https://EXAMPLE.com/CaseSensitive").unwrap();
        assert_eq!(n.url, "https://example.com/CaseSensitive");
    }

    #[test]
    fn test_default_port_stripped_custom_kept() {
        assert_eq!(
            normalize("https://example.com:443/x").unwrap().url,
            "https://example.com/x"
        );
        assert_eq!(
            normalize("http://example.com:8080/x").unwrap().url,
            "http://example.com:8080/x"
        );
    }

    #[test]
    fn test_userinfo_decoy_stripped() {
        let n = normalize("https://trusted.com@evil.example/login").unwrap();
        assert_eq!(n.host, "evil.example");
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(normalize("").is_err());
        assert!(normalize("ftp://example.com/f").is_err());
        assert!(normalize("https://nodots/x").is_err());
        assert!(normalize("https://example.com:notaport/x").is_err());
        assert!(normalize("https://exa mple.com").is_err());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(
            normalize("https://example.com/a/").unwrap().url,
            normalize("https://example.com/a").unwrap().url
        );
    }
}
