//! JSON-over-HTTP adapter for the cache.
//!
//! # Endpoints
//!
//! | Method | Path             | Body / query                         |
//! |--------|------------------|--------------------------------------|
//! | POST   | `/api/v1/cache`  | `{"key", "value", "ttl"?}`           |
//! | GET    | `/api/v1/cache`  | `?key=`                              |
//! | GET    | `/api/v1/nodes`  |                                      |
//! | POST   | `/api/v1/nodes`  | `{"node"}`                           |
//! | DELETE | `/api/v1/nodes`  | `{"node"}`                           |
//! | GET    | `/healthz`       |                                      |
//! | GET    | `/metrics`       | Prometheus text format               |
//!
//! Other methods on these paths answer 405; unknown paths answer 404.

mod metrics;
mod routes;
mod server;

pub use metrics::PrometheusExporter;
pub use routes::{handle, ApiResponse, ApiState, NodeRequest, SetRequest};
pub use server::{serve, serve_listener};
