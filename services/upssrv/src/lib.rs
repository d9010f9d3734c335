//! UPS SNMP exporter
//!
//! Polls Eaton XUPS-MIB and MGE MG-SNMP-UPS-MIB devices on every scrape and
//! republishes their state in the Prometheus text exposition format.

pub mod api;
pub mod core;
pub mod error;

pub use crate::core::catalogue::{Catalogue, MetricKind};
pub use crate::core::coordinator::{Coordinator, ScrapeResult, ScrapeSettings};
pub use crate::core::family::{FamilyRegistry, RegisterMap};
pub use crate::core::measurement::{Measurement, PollOutcome};
pub use crate::core::target::{resolve_targets, Target, TargetConfig, TargetDefaults};
pub use error::{Result, UpsSrvError};
