//! Inbound HTTP: the WhatsApp webhook and collaborator callbacks.

pub mod inbound;
pub mod routes;

pub use inbound::{InboundMessage, parse_inbound};
pub use routes::{AppState, router};
