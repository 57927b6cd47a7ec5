//! hostroute connection pool
//!
//! Provides:
//! - Candidate URL validation (missing, unparsable, non-http schemes)
//! - Liveness probes with a per-candidate UNATTEMPTED/REACHABLE/UNREACHABLE state
//! - The `Transport` seam used for probing and message dispatch, plus its HTTP implementation
//! - Prometheus metrics for routing attempts

pub mod health;
pub mod metrics;
pub mod pool;
pub mod transport;
pub mod types;

pub use health::*;
pub use metrics::*;
pub use pool::*;
pub use transport::*;
pub use types::*;
