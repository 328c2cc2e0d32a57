//! Types shared between the plaza server and its clients.
//!
//! Everything that crosses the wire lives here so the browser client can
//! consume the generated TypeScript bindings.

pub mod config;
pub mod protocol;
pub mod vec3;
