use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

use parser::YamlError;

pub struct CleanError(pub Box<dyn Error>);

impl Debug for CleanError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for CleanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for CleanError {}

impl From<YamlError> for CleanError {
    fn from(e: YamlError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::io::Error> for CleanError {
    fn from(e: std::io::Error) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for CleanError {
    fn from(e: std::net::AddrParseError) -> Self {
        CleanError(Box::new(e))
    }
}

impl From<String> for CleanError {
    fn from(s: String) -> Self {
        // Use a simple custom error type to wrap the string
        CleanError(Box::new(YamlError::Generic(s)))
    }
}

impl From<&str> for CleanError {
    fn from(s: &str) -> Self {
        CleanError(Box::new(YamlError::Generic(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, CleanError>;

/// Error kinds that can surface while servicing one connection, mapped to an
/// HTTP status at the dispatcher boundary rather than propagated with `?`.
#[derive(Debug)]
pub enum LitefsError {
    HeadersIncomplete,
    MalformedRequest,
    PathTraversal,
    NotFound,
    HandlerFailure(String),
    CgiFailure(String),
    ReactorFatal(std::io::Error),
    SocketTransient(std::io::Error),
}

impl Display for LitefsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LitefsError::HeadersIncomplete => write!(f, "incomplete request headers"),
            LitefsError::MalformedRequest => write!(f, "malformed request"),
            LitefsError::PathTraversal => write!(f, "path traversal attempt"),
            LitefsError::NotFound => write!(f, "resource not found"),
            LitefsError::HandlerFailure(m) => write!(f, "handler failure: {}", m),
            LitefsError::CgiFailure(m) => write!(f, "cgi failure: {}", m),
            LitefsError::ReactorFatal(e) => write!(f, "reactor fatal: {}", e),
            LitefsError::SocketTransient(e) => write!(f, "socket transient error: {}", e),
        }
    }
}

impl Error for LitefsError {}

impl LitefsError {
    /// Maps each error kind to the HTTP status code a client should see.
    pub fn status_code(&self) -> u16 {
        match self {
            LitefsError::HeadersIncomplete | LitefsError::MalformedRequest => 400,
            LitefsError::PathTraversal => 404,
            LitefsError::NotFound => 404,
            LitefsError::HandlerFailure(_) => 500,
            LitefsError::CgiFailure(_) => 500,
            LitefsError::ReactorFatal(_) => 500,
            LitefsError::SocketTransient(_) => 500,
        }
    }
}
