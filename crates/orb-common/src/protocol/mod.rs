//! ORB Protocol Definitions
//!
//! This module defines the wire protocol of the bridge:
//!
//! - **[`envelope`]**: request parsing and the [`RpcResponse`] result
//!   envelope with its stable error codes
//! - **[`fixups`]**: post-parse assignment scripts that reconstitute
//!   duplicate and circular references on the receiving side
//! - **[`error`]**: one thiserror family per failure kind (parse, marshal,
//!   unmarshal, fixup, registration, invocation)
//!
//! # Wire format
//!
//! A request is `{"id": <scalar>, "method": <string>, "params": <array>}`
//! with an optional `fixups` member. A success response is
//! `{"id": <scalar>, "result": <any>}` plus `fixups` when the marshaller
//! detected shared structure; an error response is
//! `{"id": <scalar>, "error": {"code": <int>, "msg": <string>}}` with an
//! optional `trace` for remote exceptions.

pub mod envelope;
pub mod error;
pub mod fixups;

pub use envelope::{
    parse_request, RpcRequest, RpcResponse, ResponseBody, CODE_ERR_MARSHAL, CODE_ERR_NOMETHOD,
    CODE_ERR_PARSE, CODE_ERR_TRANSPORT, CODE_ERR_UNMARSHAL, CODE_REMOTE_EXCEPTION, CODE_SUCCESS,
    MSG_ERR_NOMETHOD, MSG_ERR_PARSE,
};
pub use error::{InvokeError, MarshalError, ParseError, RegistrationError, UnmarshalError};
pub use fixups::{FixUp, FixupError, PathToken};
