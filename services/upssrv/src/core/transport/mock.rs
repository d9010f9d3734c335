//! Mock session client for testing
//!
//! Devices are scripted in memory: register values, connect failures,
//! transport failures on chosen registers, latency and hangs. The client
//! counts opened and closed sessions so tests can check session hygiene.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::traits::{RawValue, Session, SessionClient};
use crate::core::family::{CoreKey, Direction, PhaseKey, RegisterMap};
use crate::core::oid::Oid;
use crate::error::{Result, UpsSrvError};

/// Scripted device behaviour
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    registers: HashMap<Oid, i64>,
    /// Refuse the session with this reason
    connect_error: Option<String>,
    /// Any batch touching one of these registers fails at transport level
    failing: HashSet<Oid>,
    /// Required community, if any
    community: Option<String>,
    latency: Duration,
    hang: bool,
    panic_on_read: bool,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device whose session can never be opened
    pub fn unreachable(reason: impl Into<String>) -> Self {
        Self {
            connect_error: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_register(mut self, oid: Oid, value: i64) -> Self {
        self.registers.insert(oid, value);
        self
    }

    /// Set a core register of `map`
    pub fn with_core(self, map: &RegisterMap, key: CoreKey, value: i64) -> Self {
        match map.core.iter().find(|r| r.key == key) {
            Some(register) => {
                let oid = register.oid.clone();
                self.with_register(oid, value)
            },
            None => self,
        }
    }

    /// Set one cell of a phase table of `map`
    pub fn with_phase(
        self,
        map: &RegisterMap,
        direction: Direction,
        key: PhaseKey,
        phase: u32,
        value: i64,
    ) -> Self {
        match map.phase_registers(direction).iter().find(|r| r.key == key) {
            Some(register) => {
                let oid = register.column.child(phase);
                self.with_register(oid, value)
            },
            None => self,
        }
    }

    /// Make the read of one phase row fail at transport level
    pub fn failing_phase(mut self, map: &RegisterMap, direction: Direction, phase: u32) -> Self {
        self.failing.extend(map.phase_oids(direction, phase));
        self
    }

    /// Make the core batch of `map` fail at transport level
    pub fn failing_core(mut self, map: &RegisterMap) -> Self {
        self.failing.extend(map.core_oids());
        self
    }

    pub fn with_community(mut self, community: impl Into<String>) -> Self {
        self.community = Some(community.into());
        self
    }

    /// Delay every read by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Never answer; reads end when the session timeout expires
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Panic inside the first read
    pub fn panicking(mut self) -> Self {
        self.panic_on_read = true;
        self
    }
}

#[derive(Debug, Default)]
struct SessionCounters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// In-memory client mapping addresses to scripted devices
///
/// Unknown addresses are refused like an unreachable host.
#[derive(Debug, Clone, Default)]
pub struct MockClient {
    devices: Arc<HashMap<String, MockDevice>>,
    counters: Arc<SessionCounters>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, address: impl Into<String>, device: MockDevice) -> Self {
        Arc::make_mut(&mut self.devices).insert(address.into(), device);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionClient for MockClient {
    async fn open(
        &self,
        address: &str,
        community: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Session>> {
        let device = self
            .devices
            .get(address)
            .ok_or_else(|| UpsSrvError::connect(address, "no route to host"))?;

        if let Some(reason) = &device.connect_error {
            return Err(UpsSrvError::connect(address, reason.clone()));
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        debug!(address = %address, "Mock session opened");

        Ok(Box::new(MockSession {
            address: address.to_string(),
            device: device.clone(),
            community_ok: device.community.as_deref().map_or(true, |c| c == community),
            timeout,
            counters: Arc::clone(&self.counters),
            closed: false,
        }))
    }
}

struct MockSession {
    address: String,
    device: MockDevice,
    community_ok: bool,
    timeout: Duration,
    counters: Arc<SessionCounters>,
    closed: bool,
}

#[async_trait]
impl Session for MockSession {
    async fn read_registers(&mut self, oids: &[Oid]) -> Result<Vec<RawValue>> {
        if self.closed {
            return Err(UpsSrvError::transport(&self.address, "session is closed"));
        }
        if self.device.panic_on_read {
            panic!("mock device {} crashed", self.address);
        }
        if self.device.hang || self.device.latency >= self.timeout {
            tokio::time::sleep(self.timeout).await;
            return Err(UpsSrvError::transport(&self.address, "request timed out"));
        }
        if !self.device.latency.is_zero() {
            tokio::time::sleep(self.device.latency).await;
        }
        // A wrong community is silently dropped by real agents
        if !self.community_ok {
            return Err(UpsSrvError::transport(&self.address, "request timed out"));
        }
        if let Some(oid) = oids.iter().find(|oid| self.device.failing.contains(*oid)) {
            return Err(UpsSrvError::transport(
                &self.address,
                format!("malformed reply for {}", oid),
            ));
        }

        Ok(oids
            .iter()
            .map(|oid| self.device.registers.get(oid).copied())
            .collect())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
