//! ORB Common Protocol Types
//!
//! This crate provides the wire-level definitions shared by every component
//! of the ORB JSON-RPC bridge: the request/response envelope, the stable
//! error codes, the fixup scripts used to transmit duplicate and circular
//! references, and the ASCII-clean JSON writer.
//!
//! # Overview
//!
//! ORB ("object request broker") lets a remote JSON-RPC peer invoke methods
//! on registered server objects and receive object graphs back as JSON. The
//! pieces in this crate are deliberately transport-agnostic: a transport
//! shell decodes a request into a `serde_json::Value`, hands it to the
//! bridge, and writes the serialized envelope back.
//!
//! # Components
//!
//! - [`protocol`] - request parsing, the [`protocol::RpcResponse`] envelope,
//!   error codes, fixup scripts, and the error families used across crates
//! - [`escape`] - ASCII-clean JSON serialization for encoding-hostile
//!   transports

pub mod escape;
pub mod protocol;

pub use protocol::*;
