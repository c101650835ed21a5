//! Request Routing
//!
//! Backend selection and split planning. Both operate on configuration that
//! is frozen at startup, so neither needs any synchronization on the hot path.
//!
//! ```text
//! request ──> BackendPool::select ──> SplitPlanner::plan
//!                                          │
//!                         ┌────────────────┴───────────────┐
//!                         v                                v
//!               PlanDecision::Split              PlanDecision::PassThrough
//! ```

pub mod planner;
pub mod selector;

pub use planner::{
    api_from_path, windows_for, PassThroughReason, PlanDecision, SplitParams, SplitPlan,
    SplitPlanner, SplitTable, SubRequest, Window,
};
pub use selector::BackendPool;
