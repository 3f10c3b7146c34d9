use std::time::Duration;

use thiserror::Error;

use crate::cim::CimInstance;

pub type Result<T> = std::result::Result<T, WbemError>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;
pub type XmlResult<T> = std::result::Result<T, XmlError>;
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;
pub type ValueResult<T> = std::result::Result<T, ValueError>;
pub type BuildResult<T> = std::result::Result<T, BuildError>;
pub type ParameterResult<T> = std::result::Result<T, ParameterError>;

/// Errors raised below the CIM-XML layer, by the HTTP(S) transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to reach {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("credentials rejected by {url}: {reason}")]
    Auth { url: String, reason: String },

    #[error("no response from {url} within {timeout:?}")]
    Timeout { url: String, timeout: Duration },
}

/// The response bytes could not be turned into a tuple-tree.
///
/// The three variants are deliberately distinct: a byte sequence that is not
/// UTF-8 at all, a well-formed UTF-8 code point that XML 1.0 forbids, and a
/// character stream that is not well-formed XML.
#[derive(Debug, Error)]
pub enum XmlError {
    #[error("response is not valid UTF-8: {source}")]
    Utf8 {
        #[source]
        source: std::str::Utf8Error,
    },

    #[error(
        "response contains U+{codepoint:04X} at byte offset {offset}, which is not a valid XML character"
    )]
    InvalidXmlChar { codepoint: u32, offset: usize },

    #[error("response is not well-formed XML near byte offset {offset}: {message}")]
    Syntax { message: String, offset: u64 },
}

/// The response was well-formed XML but violated the CIM-XML grammar shape
/// expected for the operation that was issued.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected element {expected} in {context}, found {found}")]
    UnexpectedElement {
        expected: &'static str,
        found: String,
        context: &'static str,
    },

    #[error("required element {expected} missing inside {context}")]
    MissingElement {
        expected: &'static str,
        context: &'static str,
    },

    #[error("required attribute {attribute} missing on element {element}")]
    MissingAttribute {
        attribute: &'static str,
        element: &'static str,
    },

    #[error("attribute {attribute} on {element} has invalid value {value:?}: {reason}")]
    InvalidAttribute {
        attribute: &'static str,
        element: &'static str,
        value: String,
        reason: String,
    },

    #[error("operation {operation} returned method name {found:?}")]
    MethodNameMismatch { operation: String, found: String },

    #[error("operation {operation} declares no {kind}, but the response carries one")]
    UnexpectedOutput {
        operation: &'static str,
        kind: &'static str,
    },

    #[error("pull response carries neither EndOfSequence nor EnumerationContext")]
    MissingPullStatus,

    #[error("pull response has EndOfSequence=false but no enumeration context")]
    MissingPullContext,

    #[error(transparent)]
    Value(#[from] ValueError),
}

/// A typed CIM value could not be decoded from (or encoded into) its
/// CIM-XML text form.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("{text:?} is out of range for {cim_type}")]
    OutOfRange { text: String, cim_type: &'static str },

    #[error("{text:?} is not a valid {cim_type} value: {reason}")]
    Malformed {
        text: String,
        cim_type: &'static str,
        reason: String,
    },

    #[error("array elements must share one type, found {found} among {expected}")]
    Heterogeneous {
        expected: &'static str,
        found: &'static str,
    },

    #[error("unknown CIM type name {name:?}")]
    UnknownType { name: String },

    #[error("cannot infer a CIM type for the value")]
    Untypable,

    #[error("string value contains U+{codepoint:04X}, which CIM-XML cannot carry")]
    ForbiddenChar { codepoint: u32 },
}

/// A CIM-XML request document could not be built.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Value(#[from] ValueError),

    #[error("failed to write request XML: {message}")]
    Write { message: String },
}

/// A caller-supplied argument violated a documented precondition. Raised
/// before any network interaction; never wraps a server response.
#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("MaxObjectCount must be greater than zero")]
    InvalidMaxObjectCount,

    #[error("{parameter} cannot be used: the server does not support pull operations")]
    FilterNotSupported { parameter: &'static str },

    #[error("instance has no path; {operation} requires one")]
    MissingInstancePath { operation: &'static str },

    #[error("path classname {path_class:?} does not match instance classname {instance_class:?}")]
    ClassNameMismatch {
        path_class: String,
        instance_class: String,
    },

    #[error("{parameter}: {reason}")]
    Invalid {
        parameter: &'static str,
        reason: String,
    },
}

/// DSP0200 status codes, as reported by a CIMOM in an ERROR element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CimStatusCode {
    Failed = 1,
    AccessDenied = 2,
    InvalidNamespace = 3,
    InvalidParameter = 4,
    InvalidClass = 5,
    NotFound = 6,
    NotSupported = 7,
    ClassHasChildren = 8,
    ClassHasInstances = 9,
    InvalidSuperclass = 10,
    AlreadyExists = 11,
    NoSuchProperty = 12,
    TypeMismatch = 13,
    QueryLanguageNotSupported = 14,
    InvalidQuery = 15,
    MethodNotAvailable = 16,
    MethodNotFound = 17,
    NamespaceNotEmpty = 20,
    InvalidEnumerationContext = 21,
    InvalidOperationTimeout = 22,
    PullHasBeenAbandoned = 23,
    PullCannotBeAbandoned = 24,
    FilteredEnumerationNotSupported = 25,
    ContinuationOnErrorNotSupported = 26,
    ServerLimitsExceeded = 27,
    ServerIsShuttingDown = 28,
}

impl CimStatusCode {
    pub fn from_u32(code: u32) -> Option<Self> {
        use CimStatusCode::*;
        Some(match code {
            1 => Failed,
            2 => AccessDenied,
            3 => InvalidNamespace,
            4 => InvalidParameter,
            5 => InvalidClass,
            6 => NotFound,
            7 => NotSupported,
            8 => ClassHasChildren,
            9 => ClassHasInstances,
            10 => InvalidSuperclass,
            11 => AlreadyExists,
            12 => NoSuchProperty,
            13 => TypeMismatch,
            14 => QueryLanguageNotSupported,
            15 => InvalidQuery,
            16 => MethodNotAvailable,
            17 => MethodNotFound,
            20 => NamespaceNotEmpty,
            21 => InvalidEnumerationContext,
            22 => InvalidOperationTimeout,
            23 => PullHasBeenAbandoned,
            24 => PullCannotBeAbandoned,
            25 => FilteredEnumerationNotSupported,
            26 => ContinuationOnErrorNotSupported,
            27 => ServerLimitsExceeded,
            28 => ServerIsShuttingDown,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        use CimStatusCode::*;
        match self {
            Failed => "CIM_ERR_FAILED",
            AccessDenied => "CIM_ERR_ACCESS_DENIED",
            InvalidNamespace => "CIM_ERR_INVALID_NAMESPACE",
            InvalidParameter => "CIM_ERR_INVALID_PARAMETER",
            InvalidClass => "CIM_ERR_INVALID_CLASS",
            NotFound => "CIM_ERR_NOT_FOUND",
            NotSupported => "CIM_ERR_NOT_SUPPORTED",
            ClassHasChildren => "CIM_ERR_CLASS_HAS_CHILDREN",
            ClassHasInstances => "CIM_ERR_CLASS_HAS_INSTANCES",
            InvalidSuperclass => "CIM_ERR_INVALID_SUPERCLASS",
            AlreadyExists => "CIM_ERR_ALREADY_EXISTS",
            NoSuchProperty => "CIM_ERR_NO_SUCH_PROPERTY",
            TypeMismatch => "CIM_ERR_TYPE_MISMATCH",
            QueryLanguageNotSupported => "CIM_ERR_QUERY_LANGUAGE_NOT_SUPPORTED",
            InvalidQuery => "CIM_ERR_INVALID_QUERY",
            MethodNotAvailable => "CIM_ERR_METHOD_NOT_AVAILABLE",
            MethodNotFound => "CIM_ERR_METHOD_NOT_FOUND",
            NamespaceNotEmpty => "CIM_ERR_NAMESPACE_NOT_EMPTY",
            InvalidEnumerationContext => "CIM_ERR_INVALID_ENUMERATION_CONTEXT",
            InvalidOperationTimeout => "CIM_ERR_INVALID_OPERATION_TIMEOUT",
            PullHasBeenAbandoned => "CIM_ERR_PULL_HAS_BEEN_ABANDONED",
            PullCannotBeAbandoned => "CIM_ERR_PULL_CANNOT_BE_ABANDONED",
            FilteredEnumerationNotSupported => "CIM_ERR_FILTERED_ENUMERATION_NOT_SUPPORTED",
            ContinuationOnErrorNotSupported => "CIM_ERR_CONTINUATION_ON_ERROR_NOT_SUPPORTED",
            ServerLimitsExceeded => "CIM_ERR_SERVER_LIMITS_EXCEEDED",
            ServerIsShuttingDown => "CIM_ERR_SERVER_IS_SHUTTINGDOWN",
        }
    }
}

/// The server affirmatively reported a CIM status code.
///
/// This is the expected channel for "not found", "not supported",
/// "already exists" and the like. The pull machinery inspects
/// [`CimError::status`] to decide on capability fallback.
#[derive(Debug)]
pub struct CimError {
    status_code: u32,
    description: Option<String>,
    instances: Vec<CimInstance>,
}

impl CimError {
    pub fn new(status_code: u32, description: Option<String>) -> Self {
        CimError {
            status_code,
            description,
            instances: Vec::new(),
        }
    }

    pub fn with_instances(mut self, instances: Vec<CimInstance>) -> Self {
        self.instances = instances;
        self
    }

    pub fn status_code(&self) -> u32 {
        self.status_code
    }

    pub fn status(&self) -> Option<CimStatusCode> {
        CimStatusCode::from_u32(self.status_code)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Server-supplied diagnostic instances, if any.
    pub fn instances(&self) -> &[CimInstance] {
        &self.instances
    }
}

impl std::fmt::Display for CimError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status() {
            Some(code) => write!(f, "{} ({})", code.name(), self.status_code)?,
            None => write!(f, "status {}", self.status_code)?,
        }
        if let Some(desc) = &self.description {
            write!(f, ": {desc}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CimError {}

/// Top-level error type returned by every connection operation.
///
/// Variants produced after a request was sent carry the raw request (and,
/// where one was received, the raw reply) for post-mortem diagnosis.
#[derive(Debug, Error)]
pub enum WbemError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("{source}")]
    Transport {
        #[source]
        source: TransportError,
        request: Option<Box<str>>,
    },

    #[error("{source}")]
    MalformedXml {
        #[source]
        source: XmlError,
        request: Option<Box<str>>,
        reply: Option<Box<str>>,
    },

    #[error("{source}")]
    Protocol {
        #[source]
        source: ProtocolError,
        request: Option<Box<str>>,
        reply: Option<Box<str>>,
    },

    #[error("{source}")]
    Cim {
        #[source]
        source: CimError,
        request: Option<Box<str>>,
        reply: Option<Box<str>>,
    },
}

impl WbemError {
    /// The raw CIM-XML request that led to this error, if one was built.
    pub fn request_xml(&self) -> Option<&str> {
        match self {
            WbemError::Transport { request, .. }
            | WbemError::MalformedXml { request, .. }
            | WbemError::Protocol { request, .. }
            | WbemError::Cim { request, .. } => request.as_deref(),
            _ => None,
        }
    }

    /// The raw reply the server sent, if one was received.
    pub fn reply_xml(&self) -> Option<&str> {
        match self {
            WbemError::MalformedXml { reply, .. }
            | WbemError::Protocol { reply, .. }
            | WbemError::Cim { reply, .. } => reply.as_deref(),
            _ => None,
        }
    }

    /// The server-reported CIM error, if this is one.
    pub fn cim_error(&self) -> Option<&CimError> {
        match self {
            WbemError::Cim { source, .. } => Some(source),
            _ => None,
        }
    }

    pub(crate) fn is_not_supported(&self) -> bool {
        self.cim_error()
            .map(|e| e.status() == Some(CimStatusCode::NotSupported))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_round_trip() {
        assert_eq!(
            CimStatusCode::from_u32(7),
            Some(CimStatusCode::NotSupported)
        );
        assert_eq!(CimStatusCode::from_u32(18), None);
        assert_eq!(CimStatusCode::from_u32(19), None);
        assert_eq!(CimStatusCode::NotSupported.name(), "CIM_ERR_NOT_SUPPORTED");
    }

    #[test]
    fn cim_error_display_names_known_codes() {
        let err = CimError::new(6, Some("no such instance".into()));
        assert_eq!(err.to_string(), "CIM_ERR_NOT_FOUND (6): no such instance");

        let err = CimError::new(99, None);
        assert_eq!(err.to_string(), "status 99");
    }
}
