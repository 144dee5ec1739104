use std::fmt::Display;
use std::{fmt, io};

#[derive(Debug)]
pub enum ReError {
    /// 一定不会出现的异常。如果出现，一定是BUG
    BUG(String),
    /// The parser had an error (recoverable)
    Error(String),

    //////////////////////
    // Binlog / packet decoding
    //////////////////////
    /// Byte stream is incomplete
    /// 此错误用于数据包编解码过程中的异常处理，包含：
    ///     数据不足、格式错误等， 由 Needed 产生为具体的错误信息描述
    Incomplete(Needed),

    //////////////////////
    // IO
    //////////////////////
    IoError(io::Error),
    String(String),

    /// The parser had an unrecoverable error: we got to the right
    /// branch and we know other branches won't work, so backtrack
    /// as fast as possible
    Failure(String),

    ConfigFileParseErr(String),

    /// 上游主库返回的错误包（code + message）
    UpstreamError { code: u16, message: String },
}

impl Display for ReError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            ReError::BUG(s) | ReError::Error(s) | ReError::String(s) | ReError::Failure(s)
            | ReError::ConfigFileParseErr(s) => {
                write!(f, "{}", s)
            }
            ReError::Incomplete(n) => {
                write!(f, "{}", n)
            }
            ReError::IoError(err) => {
                write!(f, "{}", err)
            }
            ReError::UpstreamError { code, message } => {
                write!(f, "upstream error {}: {}", code, message)
            }
        }
    }
}

impl std::error::Error for ReError {}

impl From<io::Error> for ReError {
    fn from(error: io::Error) -> Self {
        ReError::IoError(error)
    }
}

impl From<toml::de::Error> for ReError {
    fn from(error: toml::de::Error) -> Self {
        ReError::ConfigFileParseErr(error.to_string())
    }
}

/// Contains information on needed data if a parser returned `Incomplete`
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Needed {
    /// Needs more data, but we do not know how much
    Unknown,

    NoEnoughData,

    /// 被忽略的异常。
    InvalidData(String),
}

impl Display for Needed {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> fmt::Result {
        match self {
            Needed::Unknown => {
                write!(f, "Unknown")
            }
            Needed::NoEnoughData => {
                write!(f, "NoEnoughData")
            }
            Needed::InvalidData(s) => {
                write!(f, "{}", s)
            }
        }
    }
}
