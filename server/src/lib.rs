//! Fleet server: boots the worker manager against the real adapters
//! (SQLite, Redis, grammers, an OpenAI-compatible LLM endpoint) and serves
//! a small operational HTTP surface. Grounded on `web_server.rs`'s shape
//! (Axum router, `AppState` via `with_state`, bind to a
//! fixed loopback address) trimmed down to the two endpoints §6's
//! "operational signals" actually calls for — no SPA, no WebSocket, no
//! session registry, since none of that has a counterpart here.

mod boot;
mod web;

pub use boot::{boot, BootError};
pub use web::run_http_server;
