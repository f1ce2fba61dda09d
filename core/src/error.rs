use thiserror::Error;

/// Classification from the error taxonomy. Kept separate from the
/// human-readable message so callers can match on `kind()` instead of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Transport,
    Protocol,
    Upstream,
    ScriptSyntax,
    ScriptRuntime,
    ScriptTimeout,
    ScriptValidation,
    NotFound,
    Canceled,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transport => "transport",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Upstream => "upstream",
            ErrorKind::ScriptSyntax => "script.syntax",
            ErrorKind::ScriptRuntime => "script.runtime",
            ErrorKind::ScriptTimeout => "script.timeout",
            ErrorKind::ScriptValidation => "script.validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Fatal => "fatal",
        }
    }
}

/// A tagged error whose `message` has already been run through the
/// sanitizer at the point it was surfaced to a user-visible channel.
///
/// The `source` is kept for operator logs only; never serialize it onto a
/// protocol or script-visible surface.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct HubError {
    pub kind: ErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl HubError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub type HubResult<T> = Result<T, HubError>;

/// Pattern classes a raw tool-call error can fold into before it reaches a
/// script. Order matters: first match wins.
const CLASSIFIERS: &[(&str, &str)] = &[
    ("not found", "not found"),
    ("no such", "not found"),
    ("connection refused", "connection refused"),
    ("timed out", "timeout"),
    ("timeout", "timeout"),
    ("canceled", "canceled"),
    ("cancelled", "canceled"),
    ("invalid argument", "invalid argument"),
    ("permission denied", "permission denied"),
];

/// Folds a raw upstream error string into one of the fixed classes from
/// §4.6, falling back to the literal text (still subject to sanitization).
pub fn classify_tool_error(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    for (needle, class) in CLASSIFIERS {
        if lower.contains(needle) {
            return class;
        }
    }
    "error"
}
