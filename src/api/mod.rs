//! JSON REST API over the engine.
//!
//! Routes live under `/api/`. Everything except `GET /api/health` needs the
//! shared bearer token.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod types;

pub use router::build_router;
pub use types::ApiContext;
