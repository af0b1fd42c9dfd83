//! seatbroker: lease-based arbitration of scarce license seats.
//!
//! Clients poll `Allocate` until a seat frees up, keep a held seat alive via
//! `Refresh`, and return it with `Release`. Seats and queue spots that stop
//! checking in are reclaimed by a background janitor.

pub mod clock;
pub mod config;
pub mod error;
pub mod pool;
pub mod prioritizer;
pub mod queue;
pub mod service;
pub mod transport;

mod invocation;

pub use error::ServiceError;
pub use invocation::{Invocation, Position};
pub use service::{
    AllocateOutcome, InvocationSpec, LicenseService, LicenseSpec, Phase, RefreshOutcome,
};
