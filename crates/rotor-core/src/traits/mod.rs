//! Core traits for the rotation engine
//!
//! These are the seams the engine consumes. Implementations live in their
//! own crates (Cloudflare provider, HTTP traffic agent) or in-process
//! (state stores), and tests inject doubles through the same interfaces.
//!
//! - [`DnsProvider`]: read and update records at the hosted DNS backend
//! - [`StateStore`]: persist per-job rotation state and trigger markers
//! - [`TrafficAgent`]: read traffic totals for trigger evaluation

pub mod dns_provider;
pub mod state_store;
pub mod traffic_agent;

pub use dns_provider::{DnsProvider, DnsRecord, ProviderFactory, RecordKind, TokenCheck, Zone};
pub use state_store::{JobState, StateStore};
pub use traffic_agent::{AgentFactory, TrafficAgent, UsageTotals};
