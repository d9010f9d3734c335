//! Session client layer
//!
//! ```text
//! ┌──────────────────────────────┐
//! │        Device Poller         │
//! └──────────────────────────────┘
//!                │ open / read_registers / close
//!                ▼
//! ┌──────────────────────────────┐
//! │  SessionClient + Session     │
//! └──────────────────────────────┘
//!        │                 │
//!        ▼                 ▼
//! ┌─────────────┐  ┌──────────────┐
//! │ SnmpClient  │  │  MockClient  │
//! │ (UDP, v1/2c)│  │  (scripted)  │
//! └─────────────┘  └──────────────┘
//! ```

pub mod mock;
pub mod snmp_client;
pub mod traits;

pub use mock::{MockClient, MockDevice};
pub use snmp_client::{socket_address, SnmpClient, SnmpVersion, DEFAULT_SNMP_PORT};
pub use traits::{RawValue, Session, SessionClient};
