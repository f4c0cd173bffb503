//! Refresh orchestration and section reconciliation for chartsync.
//!
//! This crate ties together record fetching, chart rendering, image
//! rehosting, and block reconciliation into one refresh run.

pub mod pipeline;
pub mod plan;
pub mod reconcile;

pub use pipeline::{
    ProgressReporter, RefreshConfig, RefreshPipeline, RefreshReport, SilentProgress,
    may_have_mutated, refresh,
};
pub use plan::{MAX_APPEND_CHILDREN, NON_RECREATABLE_KINDS, ReconcilePlan, plan_reconcile};
pub use reconcile::{DocumentBlockReconciler, ReconcileOutcome};
