// ── Bridge address resolution ──
//
// Bridges are paired by a host hint that is either a plain address or an
// mDNS `.local` name. Plain addresses are used as-is; `.local` names go
// through the bridge's cached last-good address, then a network lookup.
// The lookup itself (mDNS) is supplied by the host.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::Bridge;

const LOCAL_SUFFIX: &str = ".local";
const BRIDGE_ID_SUFFIX_LEN: usize = 6;

/// Turns a bridge host hint into a connectable address.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    async fn resolve(&self, bridge: &Bridge, host: &str) -> Result<String, CoreError>;
}

/// A bridge announced on the local network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredBridge {
    pub bridge_id: String,
    /// Announced host name, without the trailing dot.
    pub local_address: String,
    pub ipv4: Option<Ipv4Addr>,
}

/// Network discovery of bridges, typically mDNS `_hue._tcp`.
#[async_trait]
pub trait BridgeLookup: Send + Sync {
    async fn discover(&self) -> Result<Vec<DiscoveredBridge>, CoreError>;
}

// ── CachingResolver ──────────────────────────────────────────────────

/// [`AddressResolver`] preferring the bridge's last good address over a
/// fresh lookup.
pub struct CachingResolver<L> {
    lookup: L,
}

impl<L: BridgeLookup> CachingResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl<L: BridgeLookup> AddressResolver for CachingResolver<L> {
    async fn resolve(&self, bridge: &Bridge, host: &str) -> Result<String, CoreError> {
        if !host.ends_with(LOCAL_SUFFIX) {
            return Ok(host.to_owned());
        }
        if let Some(cached) = bridge.last_good_address().await {
            debug!(bridge_id = bridge.id(), address = %cached, "using cached bridge address");
            return Ok(cached);
        }

        debug!(bridge_id = bridge.id(), host, "looking up bridge address");
        let not_found = || CoreError::AddressNotFound {
            host: host.to_owned(),
        };
        let candidates = self.lookup.discover().await.map_err(|e| {
            warn!(bridge_id = bridge.id(), host, error = %e, "bridge lookup failed");
            not_found()
        })?;

        let matched = match_local_address(host, &candidates).ok_or_else(not_found)?;
        Ok(matched
            .ipv4
            .map_or_else(|| host.to_owned(), |ip| ip.to_string()))
    }
}

/// Static resolution: every hint maps to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectResolver;

#[async_trait]
impl AddressResolver for DirectResolver {
    async fn resolve(&self, _bridge: &Bridge, host: &str) -> Result<String, CoreError> {
        Ok(host.to_owned())
    }
}

// ── Matching ─────────────────────────────────────────────────────────

/// Find the announced bridge a `.local` hint refers to.
///
/// Default bridge names (`<id>[-<n>].local`) match on the last six
/// characters of the id; anything else must equal an announced host name.
pub fn match_local_address<'a>(
    local_address: &str,
    bridges: &'a [DiscoveredBridge],
) -> Option<&'a DiscoveredBridge> {
    if let Some(name) = default_bridge_name(local_address) {
        if name.len() >= BRIDGE_ID_SUFFIX_LEN {
            let suffix = &name[name.len() - BRIDGE_ID_SUFFIX_LEN..];
            if let Some(bridge) = bridges.iter().find(|b| b.bridge_id.contains(suffix)) {
                return Some(bridge);
            }
        } else {
            debug!(local_address, "bridge name too short to match by id");
            return None;
        }
    }

    if !local_address.contains(LOCAL_SUFFIX) {
        return None;
    }
    bridges
        .iter()
        .find(|b| b.local_address.eq_ignore_ascii_case(local_address))
}

/// `name` out of `name.local` or `name-<digits>.local`, where `name` is
/// lowercase alphanumeric.
fn default_bridge_name(local_address: &str) -> Option<&str> {
    let end = local_address
        .find(|c: char| !(c.is_ascii_lowercase() || c.is_ascii_digit()))
        .unwrap_or(local_address.len());
    if end == 0 {
        return None;
    }
    let (name, mut rest) = local_address.split_at(end);

    if let Some(after_dash) = rest.strip_prefix('-') {
        let digits = after_dash
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(after_dash.len());
        if digits > 0 {
            rest = &after_dash[digits..];
        }
    }
    rest.starts_with(LOCAL_SUFFIX).then_some(name)
}
