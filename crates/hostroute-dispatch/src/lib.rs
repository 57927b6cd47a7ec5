//! Dispatch side of a routing attempt.
//!
//! [`Router`] drives one attempt end to end: registry lookup, connection
//! setup, dispatch in fan-out or first-success mode, normalization of every
//! reply and aggregation into a single answer with a diagnostic trail.

pub mod aggregate;
pub mod dispatcher;
pub mod normalize;
pub mod router;

pub use aggregate::*;
pub use dispatcher::*;
pub use normalize::*;
pub use router::*;
