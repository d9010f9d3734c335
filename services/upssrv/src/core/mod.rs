//! Polling engine
//!
//! - `catalogue`: the metrics the exporter can emit
//! - `family` / `oid`: per-family register maps and their decoding
//! - `transport`: session client interface, SNMP and mock implementations
//! - `poller`: one cycle against one target
//! - `coordinator`: one cycle against all targets
//! - `config` / `bootstrap`: startup plumbing

pub mod bootstrap;
pub mod catalogue;
pub mod config;
pub mod coordinator;
pub mod family;
pub mod measurement;
pub mod oid;
pub mod poller;
pub mod target;
pub mod transport;
