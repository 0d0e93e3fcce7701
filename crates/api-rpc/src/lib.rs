//! JSON-RPC API Layer
//!
//! Job control surface of the Perfscope daemon over JSON-RPC 2.0.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig, ServerError};
