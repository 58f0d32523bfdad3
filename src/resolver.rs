//! Reverse name resolution for Kerberos service principals
//!
//! Kerberos tickets are issued for host names, not addresses, so the
//! authenticator prefers the canonical name of the server it is connected
//! to. Resolution failure is never fatal: the textual address is used
//! instead.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use tracing::debug;

/// Maps a peer address to its canonical host name
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn reverse_lookup(&self, addr: IpAddr) -> Result<String>;
}

/// Resolver that never resolves; the address is always used as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReverseLookup;

#[async_trait]
impl HostResolver for NoReverseLookup {
    async fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        Err(Error::Resolution(format!("reverse lookup disabled for {}", addr)))
    }
}

/// Fixed address to name table
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<IpAddr, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, addr: IpAddr, name: impl Into<String>) -> Self {
        self.names.insert(addr, name.into());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
        self.names
            .get(&addr)
            .cloned()
            .ok_or_else(|| Error::Resolution(format!("no entry for {}", addr)))
    }
}

/// Name to put in the service principal for `addr`.
pub async fn target_host(resolver: &dyn HostResolver, addr: IpAddr) -> String {
    match resolver.reverse_lookup(addr).await {
        Ok(name) if !name.is_empty() => name,
        Ok(_) => {
            debug!("Empty reverse lookup result for {}, using address", addr);
            addr.to_string()
        }
        Err(e) => {
            debug!("Reverse lookup of {} failed ({}), using address", addr, e);
            addr.to_string()
        }
    }
}

#[cfg(feature = "hickory-dns")]
pub use self::hickory::HickoryResolver;

#[cfg(feature = "hickory-dns")]
mod hickory {
    use super::HostResolver;
    use crate::error::{Error, Result};
    use async_trait::async_trait;
    use hickory_resolver::config::ResolverConfig;
    use hickory_resolver::name_server::TokioConnectionProvider;
    use hickory_resolver::TokioResolver;
    use std::net::IpAddr;

    /// PTR lookups through the system DNS configuration
    pub struct HickoryResolver {
        resolver: TokioResolver,
    }

    impl HickoryResolver {
        /// Use the system configuration, or public defaults if it cannot be read.
        pub fn new() -> Self {
            let resolver = match TokioResolver::builder_tokio() {
                Ok(builder) => builder.build(),
                Err(e) => {
                    tracing::debug!("System DNS configuration unavailable: {}", e);
                    TokioResolver::builder_with_config(
                        ResolverConfig::default(),
                        TokioConnectionProvider::default(),
                    )
                    .build()
                }
            };
            Self { resolver }
        }

        pub fn from_resolver(resolver: TokioResolver) -> Self {
            Self { resolver }
        }
    }

    impl Default for HickoryResolver {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HostResolver for HickoryResolver {
        async fn reverse_lookup(&self, addr: IpAddr) -> Result<String> {
            let lookup = self
                .resolver
                .reverse_lookup(addr)
                .await
                .map_err(|e| Error::Resolution(e.to_string()))?;

            lookup
                .iter()
                .next()
                .map(|ptr| ptr.to_string().trim_end_matches('.').to_string())
                .ok_or_else(|| Error::Resolution(format!("no PTR record for {}", addr)))
        }
    }
}
