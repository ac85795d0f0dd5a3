//! Strategy layer: edge arithmetic, opportunity gating, cross-book
//! validation, and Kelly stake sizing.
//!
//! Everything here is pure and synchronous. The engine composes these
//! pieces each cycle; nothing in this module touches the network.

pub mod edge;
pub mod filter;
pub mod kelly;
pub mod validation;

pub use edge::{adjust_confidence_for_round, evaluate, min_edge_for_round, EdgeEval};
pub use filter::{FilterConfig, OpportunityFilter, RejectReason};
pub use kelly::{kelly_stake, recommend, KellyConfig, StakeRecommendation};
pub use validation::{validate_edge, EdgeValidation, ValidationConfidence};
