//! types.rs
//! Unified engine error covering stream corruption, cache addressing,
//! type resolution, hook scopes, policy rejection and transport I/O.
//!
//! Design notes:
//! - Every variant is fatal to the current session; the engine never retries.
//! - Positional context (field, element, type) is attached while unwinding via
//!   `Context`, innermost first, so callers see the full nesting trail.

use std::fmt;
use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WireError>;

#[derive(Debug, Error)]
pub enum WireError {
    /// Malformed length, tag or version.
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// Dangling, pending, invalidated or out-of-range cache index.
    #[error("invalid back-reference: index {index}, cache length {len}{}", reason_suffix(.reason))]
    InvalidBackReference {
        index: u64,
        len: u64,
        reason: &'static str,
    },

    /// A tag's shared/unshared flag disagrees with the call site.
    #[error("shared/unshared mismatch: {0}")]
    SharedUnsharedMismatch(String),

    /// The type resolver could not provide a type that is strictly required.
    #[error("unresolvable type: {name}")]
    UnresolvableType { name: String },

    /// A read was attempted past the end of an exhausted hook scope.
    #[error("no more hook data")]
    NoMoreHookData,

    /// Rejected by the unmarshalling filter or a resource limit.
    #[error("filtered out: {0}")]
    FilteredOut(String),

    /// No applicable encoding path for a value.
    #[error("not encodable: {0}")]
    NotEncodable(String),

    /// Invalid engine configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Error raised from custom hook logic.
    #[error("hook error: {0}")]
    Hook(String),

    /// Transport failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Positional context wrapped around an inner error.
    #[error("{}", render_context(.source, .detail))]
    Context {
        detail: String,
        source: Box<WireError>,
    },
}

fn reason_suffix(reason: &str) -> String {
    if reason.is_empty() {
        String::new()
    } else {
        format!(" ({})", reason)
    }
}

fn render_context(source: &WireError, detail: &str) -> String {
    let mut trail = vec![detail];
    let mut root = source;
    while let WireError::Context { detail, source } = root {
        trail.push(detail.as_str());
        root = source;
    }
    trail.reverse();
    format!("{} (in {})", root, trail.join(", in "))
}

impl WireError {
    /// Wrap with one more layer of positional context.
    pub fn with_context(self, detail: impl Into<String>) -> Self {
        WireError::Context {
            detail: detail.into(),
            source: Box::new(self),
        }
    }

    /// The innermost, non-context error.
    pub fn root(&self) -> &WireError {
        let mut e = self;
        while let WireError::Context { source, .. } = e {
            e = source;
        }
        e
    }

    /// Context details, innermost first.
    pub fn trail(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut e = self;
        while let WireError::Context { detail, source } = e {
            out.push(detail.as_str());
            e = source;
        }
        out.reverse();
        out
    }

    /// True when the root cause is an exhausted hook scope.
    pub fn is_no_more_hook_data(&self) -> bool {
        matches!(self.root(), WireError::NoMoreHookData)
    }

    /// Short variant name of the root cause, for logs.
    pub fn kind_name(&self) -> &'static str {
        match self.root() {
            WireError::CorruptStream(_) => "CorruptStream",
            WireError::InvalidBackReference { .. } => "InvalidBackReference",
            WireError::SharedUnsharedMismatch(_) => "SharedUnsharedMismatch",
            WireError::UnresolvableType { .. } => "UnresolvableType",
            WireError::NoMoreHookData => "NoMoreHookData",
            WireError::FilteredOut(_) => "FilteredOut",
            WireError::NotEncodable(_) => "NotEncodable",
            WireError::InvalidConfig(_) => "InvalidConfig",
            WireError::Hook(_) => "Hook",
            WireError::Io(_) => "Io",
            WireError::Context { .. } => "Context",
        }
    }

    /// Truncated input surfaces as `UnexpectedEof`; report it as corruption.
    pub(crate) fn from_read(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            WireError::CorruptStream("unexpected end of stream".into())
        } else {
            WireError::Io(e)
        }
    }
}

/// Attach positional context to a failing result.
pub trait ResultExt<T> {
    fn context<D, F>(self, f: F) -> Result<T>
    where
        D: fmt::Display,
        F: FnOnce() -> D;
}

impl<T> ResultExt<T> for Result<T> {
    #[inline]
    fn context<D, F>(self, f: F) -> Result<T>
    where
        D: fmt::Display,
        F: FnOnce() -> D,
    {
        self.map_err(|e| e.with_context(f().to_string()))
    }
}
