//! # warden-core
//!
//! Shared types for the Warden control plane: the actor/context descriptor
//! consumed by policy evaluation, the structured [`Decision`] it produces,
//! and the unified [`WardenError`] type.

pub mod error;
pub mod types;

pub use error::{Result, WardenError};
pub use types::{
    ActorRef, CallContext, Decision, Environment, InvocationStatus, RiskLevel,
};
