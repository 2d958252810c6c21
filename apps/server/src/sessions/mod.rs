pub mod manager;
pub mod rate_limit;

pub use manager::{BindOutcome, CloseReason, CloseTransport, Outbound, SessionManager};
pub use rate_limit::ConnectionLimits;
