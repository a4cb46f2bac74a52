use thiserror::Error;

/// Failure to interpret bytes or structured data as the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed CBOR: {0}")]
    Cbor(String),

    #[error("expected {expected}, found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },

    #[error("expected constructor {expected}, found constructor {found}")]
    ConstrTag { expected: u64, found: u64 },

    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("expected {expected} bytes, found {found}")]
    ByteLength { expected: usize, found: usize },

    #[error("integer {0} is negative")]
    NegativeInteger(i128),

    #[error("integer {0} does not fit the target type")]
    IntegerOutOfRange(i128),

    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("expected a {expected} credential")]
    Credential { expected: &'static str },

    #[error("stake pointer addresses are not supported")]
    UnsupportedStakePointer,

    #[error("output carries no inline datum")]
    MissingDatum,

    #[error("invalid hex: {0}")]
    Hex(String),
}

/// Script evaluation failure, optionally enriched with a debug trace.
///
/// Displays the evaluator's message, followed by the trace on the next line
/// when one was recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub message: String,
    pub trace: Option<String>,
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.trace {
            Some(trace) => write!(f, "{}\n{trace}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Coarse classification of [`Error`] for callers that only branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Decode,
    Precondition,
    InsufficientFunds,
    Build,
    Validation,
    External,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Precondition(String),

    #[error("insufficient funds: required {required} lovelace, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    #[error("transaction build error: {0}")]
    Build(String),

    #[error("script validation failed: {0}")]
    Validation(Box<ValidationFailure>),

    #[error("value arithmetic overflow")]
    Overflow,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("chain backend error: {0}")]
    Chain(String),

    #[error("submit error: {0}")]
    Submit(String),

    #[error("signer error: {0}")]
    Signer(String),

    #[error("script VM error: {0}")]
    ScriptVm(String),

    #[error("deployment store error: {0}")]
    Store(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Decode(_) => ErrorKind::Decode,
            Error::Precondition(_) | Error::InvalidAmount(_) => ErrorKind::Precondition,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::Build(_) | Error::Overflow => ErrorKind::Build,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Chain(_)
            | Error::Submit(_)
            | Error::Signer(_)
            | Error::ScriptVm(_)
            | Error::Store(_) => ErrorKind::External,
        }
    }

    /// Lovelace missing to satisfy an [`Error::InsufficientFunds`] requirement.
    pub fn shortfall(&self) -> Option<u64> {
        match self {
            Error::InsufficientFunds {
                required,
                available,
            } => Some(required.saturating_sub(*available)),
            _ => None,
        }
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
