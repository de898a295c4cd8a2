//! Phase implementations. Each phase exposes a `run` that may fail
//! internally but never panics, and a `fallback` that never fails at all —
//! the controller (see `crate::controller`) is the only place that decides
//! when to call `fallback` instead of using `run`'s output.

pub mod elements;
pub mod normalize;
pub mod quotes;
pub mod triage;
