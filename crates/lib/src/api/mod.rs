//! HTTP API: one POST route per operation, JSON in and out.
//!
//! Every response body is `{ "status": "success" | "error", "message" }`.

mod protocol;
mod server;

pub use protocol::{ApiResponse, ApiStatus};
pub use server::{router, run_server, run_server_with_runner, AppState};
