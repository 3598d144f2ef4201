//! Routing and ordered fallback
//!
//! [`UniformRuntime`] resolves a router list (static or per request), picks
//! one router with [`match_router`] and tries its options in order.

pub mod attempt;
pub mod config;
pub mod matcher;
pub mod runtime;

pub use attempt::{MemoryAttemptSink, RouteAttemptResult, RouteAttemptSink};
pub use config::{RouterEntry, RouterOption, RouterOptions};
pub use matcher::match_router;
pub use runtime::{
    ModelsResolver, RequestOptions, RouteContext, RouterResolver, RouterSource, UniformRuntime,
    UniformRuntimeBuilder,
};
