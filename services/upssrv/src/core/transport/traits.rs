//! Session client traits
//!
//! The poller talks to devices only through these two traits. The wire
//! protocol lives behind them, in the SNMP implementation or in the scripted
//! mock used by the tests.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::core::oid::Oid;
use crate::error::Result;

/// A decoded register value, `None` when the device holds no value for it
pub type RawValue = Option<i64>;

/// Opens sessions to devices
#[async_trait]
pub trait SessionClient: Send + Sync + fmt::Debug {
    /// Open a session to `address` using `community` as the shared secret
    ///
    /// `timeout` bounds every request issued on the returned session.
    /// Fails with [`UpsSrvError::Connect`](crate::error::UpsSrvError::Connect).
    async fn open(
        &self,
        address: &str,
        community: &str,
        timeout: Duration,
    ) -> Result<Box<dyn Session>>;
}

/// An open session to one device
#[async_trait]
pub trait Session: Send {
    /// Read the given registers in one batch
    ///
    /// The reply has the same length and order as `oids`. A transport-level
    /// failure fails the whole batch with
    /// [`UpsSrvError::Transport`](crate::error::UpsSrvError::Transport).
    async fn read_registers(&mut self, oids: &[Oid]) -> Result<Vec<RawValue>>;

    /// Release the session; further reads fail
    async fn close(&mut self);
}
