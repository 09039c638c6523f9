//! Shared scaffolding for the hierarchical state machines in this crate.
//! There is deliberately very little here: each FSM (`Usock`, `Astream`,
//! `Bstream`, `Cstream`) owns a concrete state enum and a concrete event
//! enum rather than implementing a generic `Fsm` trait — the state spaces
//! are different enough (and small enough) that a shared trait would buy
//! type erasure, not clarity. Dispatch by event source shows up as each
//! FSM's own method split — `bind`/`start`/`send`/`stop` for the user
//! thread, `on_worker_event` for the worker, and a child's terminal event
//! bubbling into the parent's own event enum — rather than a literal
//! `Source` parameter threaded through one generic dispatch entry point.
//! What's shared across all of them is the "can't happen" panic used at
//! unreachable `(state, event)` pairs.

/// Panics in debug builds, logs and continues in release: logic errors and
/// invariant violations are never recovered, but one endpoint's bug
/// shouldn't take down a process hosting many others.
#[macro_export]
macro_rules! unreachable_fsm {
    ($state:expr, $event:expr) => {
        spx_utils::safe_panic!(
            "unreachable fsm transition: state={:?} event={:?}",
            $state,
            $event
        )
    };
}
