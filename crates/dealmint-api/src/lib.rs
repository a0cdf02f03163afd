//! # dealmint-api
//!
//! JSON-over-HTTP request surface for the settlement engine.
//!
//! Every response uses one envelope, `{ code, message, data?, reference_id? }`.
//! Successful calls carry `code: "OK"`; failures carry the engine's
//! `DM_ERR_xxx` code, and conflicts carry the id of the record they hit.

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResponse, ApiResult};
pub use routes::router;
