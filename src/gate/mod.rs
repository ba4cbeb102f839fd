//! Rate gate shared by every caller that talks to one endpoint.

mod rate_gate;
mod window;

pub use rate_gate::{Permit, RateGate};
pub use window::TimeUnit;
