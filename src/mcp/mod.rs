//! Model Context Protocol tool server over stdio.


pub mod errors;
pub mod protocol;
pub mod server;
pub mod tools;

use std::sync::Arc;

use crate::doctors::DoctorDirectory;

pub use errors::McpError;
pub use server::{ConnectionState, McpServer, ToolHandler};
pub use tools::ListDoctorsHandler;

/// Server with every built-in tool registered
#[inline]
pub fn doctor_server(directory: Arc<DoctorDirectory>) -> McpServer {
    McpServer::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .with_instructions("Look up doctors by US state and medical specialty.")
        .with_tool(ListDoctorsHandler::new(directory))
}
