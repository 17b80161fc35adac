//! Stable event names attached to structured log records.
//!
//! Every `tracing` event emitted by the engine carries an `event` field
//! drawn from this list so JSONL consumers can filter without parsing
//! messages.

pub mod event_names {
    // Integration
    pub const INTEGRAL_RETRY: &str = "integrate.retry";
    pub const INTEGRAL_FAILED: &str = "integrate.failed";

    // Fitting
    pub const FIT_STARTED: &str = "fit.started";
    pub const FIT_SHORT_CIRCUIT: &str = "fit.short_circuit";
    pub const FIT_ITERATION: &str = "fit.iteration";
    pub const FIT_COMPONENT_PRUNED: &str = "fit.component_pruned";
    pub const FIT_CONVERGED: &str = "fit.converged";
    pub const FIT_FINISHED: &str = "fit.finished";

    // Products
    pub const PRODUCT_NORMALIZED: &str = "product.normalized";
    pub const PRODUCT_EMPTY_SUPPORT: &str = "product.empty_support";

    // Dispatch
    pub const HELPER_SELECTED: &str = "dispatch.helper_selected";
    pub const HELPER_DECLINED: &str = "dispatch.helper_declined";
    pub const HELPER_MISSING: &str = "dispatch.helper_missing";

    // Pi computation
    pub const PI_CONVOLUTION: &str = "pi.convolution";
    pub const PI_TABULATED: &str = "pi.tabulated";

    // Lambda-message computation
    pub const LAMBDA_TABULATED: &str = "lambda_message.tabulated";

    // Message slots
    pub const SLOT_INVALIDATED: &str = "slot.invalidated";
    pub const SLOT_STALE: &str = "slot.stale_reference";
    pub const EVIDENCE_SET: &str = "node.evidence_set";
}
