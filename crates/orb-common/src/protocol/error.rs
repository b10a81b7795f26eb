use thiserror::Error;

use super::fixups::FixupError;

/// Why a request could not be read far enough to dispatch.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("request is not a JSON object")]
    NotAnObject,

    #[error("request has no method")]
    MissingMethod,

    #[error("request has no params array")]
    MissingParams,

    #[error(transparent)]
    Fixup(#[from] FixupError),
}

/// Failure while converting a native value to JSON.
#[derive(Error, Debug)]
pub enum MarshalError {
    /// The value graph contains a cycle and circular-reference fixups are
    /// disabled.
    #[error("circular reference detected")]
    CircularReference,

    #[error("no serializer for {0}")]
    Unsupported(String),

    #[error("cannot marshal {target}: {reason}")]
    BadValue { target: String, reason: String },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        source: Box<MarshalError>,
    },

    #[error("field {name}: {source}")]
    Field {
        name: String,
        source: Box<MarshalError>,
    },
}

impl MarshalError {
    pub fn unsupported(what: impl Into<String>) -> Self {
        MarshalError::Unsupported(what.into())
    }

    pub fn bad_value(target: impl Into<String>, reason: impl Into<String>) -> Self {
        MarshalError::BadValue {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an element failure with its position, like the chained
    /// `element N` messages the array serializer produces.
    pub fn element(index: usize, source: MarshalError) -> Self {
        MarshalError::Element {
            index,
            source: Box::new(source),
        }
    }

    pub fn field(name: impl Into<String>, source: MarshalError) -> Self {
        MarshalError::Field {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// Failure while converting JSON to a native value.
///
/// `Mismatch` means "this serializer does not apply" and makes overload
/// resolution discard the candidate; `BadValue` means the serializer
/// applied but the payload could not be converted.
#[derive(Error, Debug)]
pub enum UnmarshalError {
    #[error("cannot convert {shape} to {target}")]
    Mismatch { target: String, shape: String },

    #[error("cannot convert value to {target}: {reason}")]
    BadValue { target: String, reason: String },

    /// The referenced server object is no longer registered.
    #[error("stale object handle {0}")]
    StaleHandle(i64),

    #[error("arg {index}: {source}")]
    Arg {
        index: usize,
        source: Box<UnmarshalError>,
    },

    #[error("element {index}: {source}")]
    Element {
        index: usize,
        source: Box<UnmarshalError>,
    },

    #[error("field {name}: {source}")]
    Field {
        name: String,
        source: Box<UnmarshalError>,
    },
}

impl UnmarshalError {
    pub fn mismatch(target: impl Into<String>, shape: impl Into<String>) -> Self {
        UnmarshalError::Mismatch {
            target: target.into(),
            shape: shape.into(),
        }
    }

    pub fn bad_value(target: impl Into<String>, reason: impl Into<String>) -> Self {
        UnmarshalError::BadValue {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn arg(index: usize, source: UnmarshalError) -> Self {
        UnmarshalError::Arg {
            index,
            source: Box::new(source),
        }
    }

    pub fn element(index: usize, source: UnmarshalError) -> Self {
        UnmarshalError::Element {
            index,
            source: Box::new(source),
        }
    }

    pub fn field(name: impl Into<String>, source: UnmarshalError) -> Self {
        UnmarshalError::Field {
            name: name.into(),
            source: Box::new(source),
        }
    }

    /// True when any level of the chain is a mismatch rather than a
    /// conversion failure.
    pub fn is_mismatch(&self) -> bool {
        match self {
            UnmarshalError::Mismatch { .. } => true,
            UnmarshalError::Arg { source, .. }
            | UnmarshalError::Element { source, .. }
            | UnmarshalError::Field { source, .. } => source.is_mismatch(),
            _ => false,
        }
    }
}

/// Registration-time failure. Propagated to the caller of the admin API,
/// never emitted on the wire.
#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("a different class is already registered as {0}")]
    NameConflict(String),

    #[error("references cannot be registered on the global bridge")]
    GlobalScope,

    #[error("object is not an instance of the declared interface {0}")]
    InvalidInterface(String),
}

/// Error raised by an invoked method or hook: the analog of a remote
/// exception. The message and optional trace text are surfaced verbatim
/// in the code-490 error envelope.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct InvokeError {
    pub message: String,
    pub trace: Option<String>,
}

impl InvokeError {
    pub fn new(message: impl Into<String>) -> Self {
        InvokeError {
            message: message.into(),
            trace: None,
        }
    }

    pub fn with_trace(message: impl Into<String>, trace: impl Into<String>) -> Self {
        InvokeError {
            message: message.into(),
            trace: Some(trace.into()),
        }
    }
}
