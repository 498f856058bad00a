//! Read-only status API. Thin by design — §1 excludes the full CLI/report
//! surface from the core; this is just enough to exercise the node over
//! HTTP, grounded in the reference binary's `ApiResponse`/`AppState` shape.

pub mod status;

pub use status::{configure_routes, AppState};
