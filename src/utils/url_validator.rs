//! Long URL and callback URL validation with SSRF protection.
//!
//! A URL is accepted only if it is short enough, uses HTTP(S), parses, has a
//! host, and every address the host resolves to lies outside the configured
//! [`BlockList`]. The block list and resolver are passed in explicitly so that
//! validation is deterministic per instance.

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::Arc;
use url::{Host, Url};

/// Maximum accepted URL length in bytes.
pub const MAX_URL_LENGTH: usize = 2048;

/// Reserved, private, loopback, link-local, and multicast ranges.
pub const RESERVED_CIDRS: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "0.0.0.0/8",
    "100.64.0.0/10",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
    "::/128",
    "ff00::/8",
];

/// Errors returned by [`UrlValidator`].
#[derive(Debug, thiserror::Error)]
pub enum UrlValidationError {
    #[error("URL exceeds 2048 characters")]
    TooLong,

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("Callback URL must use https")]
    InsecureCallback,

    #[error("Invalid URL format: {0}")]
    InvalidFormat(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("Failed to resolve host '{host}': {reason}")]
    Unresolvable { host: String, reason: String },

    #[error("Lookup of host '{host}' failed: {reason}")]
    LookupFailed { host: String, reason: String },

    #[error("Host '{host}' resolves to a blocked address {ip}")]
    BlockedAddress { host: String, ip: IpAddr },
}

impl UrlValidationError {
    /// True when the lookup itself failed and the same URL may pass later.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::LookupFailed { .. })
    }
}

/// Immutable set of address ranges a URL host must not resolve into.
#[derive(Debug, Clone)]
pub struct BlockList {
    networks: Vec<IpNetwork>,
}

impl BlockList {
    pub fn new(networks: Vec<IpNetwork>) -> Self {
        Self { networks }
    }

    /// Parses a list of CIDR strings.
    ///
    /// # Errors
    ///
    /// Returns the first CIDR that fails to parse.
    pub fn from_cidrs(cidrs: &[&str]) -> Result<Self, ipnetwork::IpNetworkError> {
        let networks = cidrs
            .iter()
            .map(|c| c.parse::<IpNetwork>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(networks))
    }

    /// The default list built from [`RESERVED_CIDRS`].
    pub fn reserved() -> Self {
        Self::new(
            RESERVED_CIDRS
                .iter()
                .filter_map(|c| c.parse::<IpNetwork>().ok())
                .collect(),
        )
    }

    /// An empty list that blocks nothing.
    pub fn allow_all() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Returns true if `ip` falls into any blocked range.
    ///
    /// IPv4-mapped IPv6 addresses are checked as their IPv4 form.
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        self.networks.iter().any(|net| net.contains(ip))
    }
}

impl Default for BlockList {
    fn default() -> Self {
        Self::reserved()
    }
}

/// Resolves a host name to the addresses it would connect to.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system via `tokio::net::lookup_host`.
#[derive(Debug, Default, Clone)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Fixed host table, used where DNS must not be consulted.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.hosts.insert(host.to_ascii_lowercase(), addrs.to_vec());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such host"))
    }
}

/// Validates URLs submitted for shortening and callback URLs.
#[derive(Clone)]
pub struct UrlValidator {
    block_list: Arc<BlockList>,
    resolver: Arc<dyn HostResolver>,
}

impl UrlValidator {
    pub fn new(block_list: BlockList, resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            block_list: Arc::new(block_list),
            resolver,
        }
    }

    /// Reserved block list with system DNS.
    pub fn system() -> Self {
        Self::new(BlockList::reserved(), Arc::new(SystemResolver))
    }

    /// Validates a long URL.
    ///
    /// # Errors
    ///
    /// See [`UrlValidationError`] for the individual rejection reasons.
    pub async fn validate(&self, raw: &str) -> Result<Url, UrlValidationError> {
        if raw.len() > MAX_URL_LENGTH {
            return Err(UrlValidationError::TooLong);
        }
        if !raw.starts_with("http://") && !raw.starts_with("https://") {
            return Err(UrlValidationError::UnsupportedProtocol);
        }

        let url = Url::parse(raw).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;
        self.check_host(&url).await?;

        Ok(url)
    }

    /// Validates a callback URL: same host rules, but only `https` is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`UrlValidationError::InsecureCallback`] for non-https schemes,
    /// otherwise the same errors as [`Self::validate`].
    pub async fn validate_callback(&self, raw: &str) -> Result<Url, UrlValidationError> {
        if raw.len() > MAX_URL_LENGTH {
            return Err(UrlValidationError::TooLong);
        }

        let url = Url::parse(raw).map_err(|e| UrlValidationError::InvalidFormat(e.to_string()))?;
        if url.scheme() != "https" {
            return Err(UrlValidationError::InsecureCallback);
        }
        self.check_host(&url).await?;

        Ok(url)
    }

    async fn check_host(&self, url: &Url) -> Result<(), UrlValidationError> {
        let host = url.host().ok_or(UrlValidationError::MissingHost)?;

        let (name, addrs) = match host {
            Host::Ipv4(ip) => (ip.to_string(), vec![IpAddr::V4(ip)]),
            Host::Ipv6(ip) => (ip.to_string(), vec![IpAddr::V6(ip)]),
            Host::Domain(domain) => {
                let addrs = self.resolver.resolve(domain).await.map_err(|e| {
                    let host = domain.to_string();
                    let reason = e.to_string();
                    if e.kind() == io::ErrorKind::NotFound {
                        UrlValidationError::Unresolvable { host, reason }
                    } else {
                        UrlValidationError::LookupFailed { host, reason }
                    }
                })?;
                (domain.to_string(), addrs)
            }
        };

        if addrs.is_empty() {
            return Err(UrlValidationError::Unresolvable {
                host: name,
                reason: "no addresses".to_string(),
            });
        }

        if let Some(ip) = addrs.into_iter().find(|ip| self.block_list.contains(*ip)) {
            return Err(UrlValidationError::BlockedAddress { host: name, ip });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn public_ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34))
    }

    fn validator() -> UrlValidator {
        let resolver = StaticResolver::new()
            .with_host("example.com", &[public_ip()])
            .with_host("localhost", &[IpAddr::V4(Ipv4Addr::LOCALHOST)])
            .with_host("intranet.corp", &[IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))])
            .with_host(
                "mixed.example.com",
                &[public_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            );
        UrlValidator::new(BlockList::reserved(), Arc::new(resolver))
    }

    #[test]
    fn test_reserved_block_list_parses_every_cidr() {
        assert_eq!(BlockList::reserved().len(), RESERVED_CIDRS.len());
        assert!(BlockList::from_cidrs(RESERVED_CIDRS).is_ok());
        assert!(BlockList::from_cidrs(&["not-a-cidr"]).is_err());
    }

    #[test]
    fn test_block_list_contains() {
        let list = BlockList::reserved();
        assert!(list.contains(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(list.contains(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 1))));
        assert!(list.contains(IpAddr::V4(Ipv4Addr::new(169, 254, 169, 254))));
        assert!(list.contains(IpAddr::V4(Ipv4Addr::new(224, 0, 0, 1))));
        assert!(list.contains(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert!(list.contains(IpAddr::V6("fe80::1".parse().unwrap())));
        assert!(!list.contains(public_ip()));
        assert!(!list.contains(IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))));
    }

    #[test]
    fn test_block_list_checks_ipv4_mapped() {
        let mapped: Ipv6Addr = "::ffff:127.0.0.1".parse().unwrap();
        assert!(BlockList::reserved().contains(IpAddr::V6(mapped)));
    }

    #[test]
    fn test_allow_all_blocks_nothing() {
        let list = BlockList::allow_all();
        assert!(list.is_empty());
        assert!(!list.contains(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[tokio::test]
    async fn test_accepts_public_https_url() {
        let url = validator()
            .validate("https://example.com/path")
            .await
            .unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[tokio::test]
    async fn test_rejects_too_long() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_URL_LENGTH));
        assert!(matches!(
            validator().validate(&url).await,
            Err(UrlValidationError::TooLong)
        ));
    }

    #[tokio::test]
    async fn test_accepts_url_at_length_limit() {
        let prefix = "https://example.com/";
        let url = format!("{prefix}{}", "a".repeat(MAX_URL_LENGTH - prefix.len()));
        assert_eq!(url.len(), MAX_URL_LENGTH);
        assert!(validator().validate(&url).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        for raw in [
            "ftp://example.com/file.txt",
            "javascript:alert(1)",
            "file:///etc/passwd",
            "example.com",
        ] {
            assert!(
                matches!(
                    validator().validate(raw).await,
                    Err(UrlValidationError::UnsupportedProtocol)
                ),
                "{raw} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_rejects_unparseable() {
        assert!(matches!(
            validator().validate("http://").await,
            Err(UrlValidationError::InvalidFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_loopback_and_private_hosts() {
        let v = validator();
        assert!(matches!(
            v.validate("http://localhost:3000/x").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
        assert!(matches!(
            v.validate("http://127.0.0.1/admin").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
        assert!(matches!(
            v.validate("http://192.168.1.1:8080/api").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
        assert!(matches!(
            v.validate("https://intranet.corp/").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
        assert!(matches!(
            v.validate("http://[::1]/").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_if_any_address_is_blocked() {
        assert!(matches!(
            validator().validate("https://mixed.example.com/").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_unresolvable_host() {
        assert!(matches!(
            validator().validate("https://nowhere.invalid/").await,
            Err(UrlValidationError::Unresolvable { .. })
        ));
    }

    /// Resolver whose lookups always fail with `kind`.
    struct FailingResolver(io::ErrorKind);

    #[async_trait]
    impl HostResolver for FailingResolver {
        async fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            Err(io::Error::new(self.0, "resolver unavailable"))
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_transient() {
        let v = UrlValidator::new(
            BlockList::reserved(),
            Arc::new(FailingResolver(io::ErrorKind::TimedOut)),
        );
        let err = v.validate("https://example.com/").await.unwrap_err();
        assert!(matches!(err, UrlValidationError::LookupFailed { .. }));
        assert!(err.is_transient());

        let missing = validator()
            .validate("https://nowhere.invalid/")
            .await
            .unwrap_err();
        assert!(!missing.is_transient());
        assert!(!UrlValidationError::TooLong.is_transient());
    }

    #[tokio::test]
    async fn test_callback_requires_https() {
        let v = validator();
        assert!(v.validate_callback("https://example.com/hook").await.is_ok());
        assert!(matches!(
            v.validate_callback("http://example.com/hook").await,
            Err(UrlValidationError::InsecureCallback)
        ));
        assert!(matches!(
            v.validate_callback("https://127.0.0.1/hook").await,
            Err(UrlValidationError::BlockedAddress { .. })
        ));
    }
}
