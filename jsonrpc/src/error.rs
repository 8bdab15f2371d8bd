//! json-rpc error enum which contains all different errors which can happen
//! when sending request and processing reply from json-rpc server.

use std::{convert::From, fmt, io};

#[derive(Debug, PartialEq, Eq)]
pub enum RpcCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    NotFound,
    AlreadyExists,
}

#[derive(Debug)]
pub enum Error {
    InvalidVersion,
    InvalidReplyId,
    IoError(io::Error),
    ParseError(serde_json::Error),
    ConnectError { sock: String, err: io::Error },
    RpcError { code: RpcCode, msg: String },
    GenericError(String),
}

impl Error {
    /// The remote end replied with the given error code.
    pub fn rpc_code(&self) -> Option<&RpcCode> {
        match self {
            Error::RpcError {
                code, ..
            } => Some(code),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidVersion => write!(f, "Invalid json-rpc version"),
            Error::InvalidReplyId => write!(f, "Invalid ID of json-rpc reply"),
            Error::ConnectError {
                sock,
                err,
            } => write!(f, "Error connecting to {}: {}", sock, err),
            Error::IoError(err) => write!(f, "IO error: {}", err),
            Error::ParseError(err) => write!(f, "Invalid json reply: {}", err),
            Error::RpcError {
                code,
                msg,
            } => write!(f, "Json-rpc error {:?}: {}", code, msg),
            Error::GenericError(msg) => write!(f, "{}", msg),
        }
    }
}

// Automatic conversion functions for simply using .into() on various return
// types follow

impl std::error::Error for Error {
    fn cause(&self) -> Option<&dyn std::error::Error> {
        None
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ParseError(err)
    }
}

impl From<&str> for Error {
    fn from(err: &str) -> Self {
        Error::GenericError(err.to_owned())
    }
}

impl From<String> for Error {
    fn from(err: String) -> Self {
        Error::GenericError(err)
    }
}
