//! DNS provider trait
//!
//! Defines the interface the engine uses to talk to the hosted DNS
//! backend. Implementations are stateless wrappers around one account's
//! credentials: they never retry, never sleep, and never decide whether a
//! rotation is due. Those policies are owned by the engine.
//!
//! Errors must come back classified (see [`crate::Error`]) so the engine
//! can tell a transient backend hiccup from a dead record reference.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::config::Account;
use crate::error::Result;

/// DNS record type the engine manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    /// A record (IPv4)
    A,
    /// AAAA record (IPv6)
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl RecordKind {
    /// Whether an address belongs to this record type's family
    pub fn matches(&self, ip: IpAddr) -> bool {
        match self {
            RecordKind::A => ip.is_ipv4(),
            RecordKind::Aaaa => ip.is_ipv6(),
        }
    }

    /// Wire name as the provider spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::A => "A",
            RecordKind::Aaaa => "AAAA",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DNS zone as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Provider-assigned zone id
    pub id: String,
    /// Apex domain
    pub name: String,
}

/// A live A/AAAA record as reported by the provider
///
/// The engine never stores these; they are read just-in-time at
/// evaluation and discarded after the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    /// Provider-assigned record id
    pub id: String,
    /// FQDN
    pub name: String,
    /// Record type
    pub kind: RecordKind,
    /// Current value (dotted-quad or colon-hex)
    pub value: IpAddr,
    /// Provider-specific proxy flag, preserved verbatim on update
    pub proxied: bool,
    /// Time-to-live in seconds
    pub ttl: u32,
}

/// Result of a token verification
#[derive(Debug, Clone, Default)]
pub struct TokenCheck {
    /// Whether the token authenticates at all
    pub valid: bool,
    /// Permissions the token was found to be missing, if determinable
    pub missing_permissions: Vec<String>,
}

/// Interface over the hosted DNS backend
///
/// One instance is bound to one account credential. All operations are
/// async and may block on network I/O; the implementation owns a
/// per-request timeout but no retry policy.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// List the zones the account can see
    async fn list_zones(&self) -> Result<Vec<Zone>>;

    /// List the zone's A/AAAA records, optionally filtered by type
    ///
    /// Returns the full set; implementations paginate internally if the
    /// backend pages.
    async fn list_records(
        &self,
        zone_id: &str,
        kind: Option<RecordKind>,
    ) -> Result<Vec<DnsRecord>>;

    /// Read one record by id
    async fn get_record(&self, zone_id: &str, record_id: &str) -> Result<DnsRecord>;

    /// Update a record's value, preserving type, name, proxied, and ttl
    ///
    /// Returns the record as the provider reports it after the update.
    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        value: IpAddr,
    ) -> Result<DnsRecord>;

    /// Verify the account's token and report missing permissions
    async fn verify_token(&self) -> Result<TokenCheck>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Constructs providers from account credentials
///
/// The engine caches one provider per account; tests inject factories
/// that hand out shared mock instances.
pub trait ProviderFactory: Send + Sync {
    /// Create a provider bound to the given account
    fn create(&self, account: &Account) -> Result<std::sync::Arc<dyn DnsProvider>>;
}
