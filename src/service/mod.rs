//! Revision Kernel REST Service
//!
//! Exposes page actions over HTTP with form-encoded bodies.
//!
//! ## Endpoints
//!
//! - `POST /api/sites/:site_id/pages/:slug/:action` - Run a page action
//! - `DELETE /api/sites/:site_id/pages/:slug` - Delete a page
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//!
//! The acting user is taken from the `X-Acting-User-Id` header. Errors are
//! returned as `{ message, code, data }`.

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_action_metrics};
pub use routes::{create_router, ApiError, ACTING_USER_HEADER};
pub use state::ServiceState;
