//! Governance: policy evaluation, spend budgets, and human approval gates.
//!
//! The [`PolicyEngine`] is the front door — every tool invocation passes
//! through [`PolicyEngine::evaluate`], which consults per-tool policies,
//! rate counters, and the [`BudgetService`] before producing a
//! [`warden_core::Decision`]. Actions flagged `requires_approval` park in
//! [`ApprovalGates`] until an operator resolves them, leaving a durable
//! [`Receipt`] on disk.

pub mod budget;
pub mod gates;
pub mod policy;

pub use budget::{Budget, BudgetCheck, BudgetPeriod, BudgetService, BudgetStore, MemoryBudgetStore};
pub use gates::{ApprovalGates, ApprovalRequest, GateStatus, Receipt};
pub use policy::{
    InvocationFilter, InvocationRecord, Policy, PolicyEngine, PolicyEngineStatus,
};
