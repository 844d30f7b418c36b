use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Why a URL was refused before any request was made.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Which hosts OPML and feed URLs may point at.
///
/// Every URL must be `http` or `https`. Under [`UrlPolicy::PublicOnly`]
/// (the default) loopback, private, link-local and shared address space is
/// refused as well, so a submitted OPML cannot make the service probe its own
/// network. Only literal addresses are inspected; host names are not resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UrlPolicy {
    #[default]
    PublicOnly,
    /// Scheme check only. For local development and loopback mock servers.
    AllowPrivate,
}

impl UrlPolicy {
    pub fn from_allow_private(allow_private_hosts: bool) -> Self {
        if allow_private_hosts {
            UrlPolicy::AllowPrivate
        } else {
            UrlPolicy::PublicOnly
        }
    }

    /// Parses `url_str` and applies the policy.
    pub fn check(self, url_str: &str) -> Result<Url, UrlValidationError> {
        let url = Url::parse(url_str)?;
        self.check_parsed(&url)?;
        Ok(url)
    }

    /// Applies the policy to an already-parsed URL, e.g. a redirect target.
    pub fn check_parsed(self, url: &Url) -> Result<(), UrlValidationError> {
        match url.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
        }

        match self {
            UrlPolicy::AllowPrivate => Ok(()),
            UrlPolicy::PublicOnly => check_public_host(url),
        }
    }
}

/// Checks `url_str` under [`UrlPolicy::PublicOnly`].
///
/// # Examples
///
/// ```
/// use opml2json::util::validate_url;
///
/// let url = validate_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_url("http://localhost/feed").is_err());
/// assert!(validate_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_url(url_str: &str) -> Result<Url, UrlValidationError> {
    UrlPolicy::PublicOnly.check(url_str)
}

fn check_public_host(url: &Url) -> Result<(), UrlValidationError> {
    let ip = match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(UrlValidationError::Localhost);
            }
            return Ok(());
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        None => return Ok(()),
    };

    if ip.is_loopback() || ip.to_canonical().is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    if is_internal(ip) {
        return Err(UrlValidationError::PrivateIp(ip));
    }
    Ok(())
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_internal_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => is_internal_v6(v6),
        },
    }
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    // 100.64.0.0/10 carrier-grade NAT
    let shared = a == 100 && (b & 0xc0) == 64;
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || shared
}

fn is_internal_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        for url in [
            "https://example.com/feed.xml",
            "http://news.example.org",
            "https://example.com:443/feed.xml",
            "http://93.184.216.34/rss",
            "http://[2606:2800:220:1::1]/rss",
        ] {
            assert!(validate_url(url).is_ok(), "{url}");
        }
    }

    #[test]
    fn test_non_http_schemes_rejected() {
        for url in ["file:///etc/passwd", "ftp://example.com", "gopher://example.com"] {
            assert!(
                matches!(
                    validate_url(url),
                    Err(UrlValidationError::UnsupportedScheme(_))
                ),
                "{url}"
            );
        }
    }

    #[test]
    fn test_loopback_rejected() {
        for url in [
            "http://localhost/feed",
            "http://LOCALHOST./feed",
            "http://feeds.localhost/rss",
            "http://127.0.0.1/feed",
            "http://127.3.2.1:8080/feed",
            "http://[::1]/feed",
            "http://[::ffff:127.0.0.1]/feed",
        ] {
            assert!(
                matches!(validate_url(url), Err(UrlValidationError::Localhost)),
                "{url}"
            );
        }
    }

    #[test]
    fn test_internal_ranges_rejected() {
        for url in [
            "http://10.0.0.1/feed",
            "http://172.16.0.1/feed",
            "http://192.168.1.1:8080/feed",
            "http://169.254.169.254/latest/meta-data",
            "http://100.64.0.1/feed",
            "http://0.0.0.0/feed",
            "http://255.255.255.255/feed",
            "http://[fe80::1]/feed",
            "http://[fd00::1]/feed",
            "http://[::ffff:10.0.0.1]/feed",
        ] {
            assert!(
                matches!(validate_url(url), Err(UrlValidationError::PrivateIp(_))),
                "{url}"
            );
        }
    }

    #[test]
    fn test_shared_space_boundaries() {
        assert!(validate_url("http://100.63.255.255/feed").is_ok());
        assert!(validate_url("http://100.128.0.1/feed").is_ok());
    }

    #[test]
    fn test_allow_private_keeps_scheme_check() {
        let policy = UrlPolicy::from_allow_private(true);
        assert!(policy.check("http://127.0.0.1:8080/feed").is_ok());
        assert!(policy.check("http://10.0.0.1/feed").is_ok());
        assert!(matches!(
            policy.check("file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_default_policy_is_public_only() {
        assert_eq!(UrlPolicy::default(), UrlPolicy::PublicOnly);
        assert_eq!(UrlPolicy::from_allow_private(false), UrlPolicy::PublicOnly);
        assert!(UrlPolicy::default().check("http://127.0.0.1/feed").is_err());
    }

    #[test]
    fn test_unparseable_url_rejected() {
        assert!(matches!(
            UrlPolicy::AllowPrivate.check("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
