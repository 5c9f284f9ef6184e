//! Positioned parse errors.

use std::io;

use thiserror::Error;

/// What went wrong on a pseudo-file line.
#[derive(Debug, Error)]
pub enum PseudoErrorKind {
    /// Reading the description itself failed.
    #[error("read failed: {0}")]
    Io(#[from] io::Error),
    /// The line starts with an unrecognized keyword.
    #[error("unknown keyword {0:?}")]
    UnknownKeyword(String),
    /// A required field is missing.
    #[error("missing {0}")]
    MissingField(&'static str),
    /// Tokens remained after the line was fully parsed.
    #[error("trailing tokens after {0}")]
    TrailingTokens(&'static str),
    /// A quote was opened but never closed.
    #[error("unterminated quote")]
    UnterminatedQuote,
    /// The mode field is not octal or exceeds `0o7777`.
    #[error("invalid mode {0:?}")]
    InvalidMode(String),
    /// A uid/gid field is not a decimal number that fits 32 bits.
    #[error("invalid {field} {value:?}")]
    InvalidNumber {
        /// Which field was malformed.
        field: &'static str,
        /// The offending text.
        value: String,
    },
    /// The `nod` device spec is not `c|b <major> <minor>`.
    #[error("invalid device specification")]
    InvalidDevice,
    /// A glob option is not in the accepted subset.
    #[error("unknown glob option {0:?}")]
    UnknownOption(String),
    /// A `-type` letter outside `b c d p f l s`.
    #[error("invalid -type letter {0:?}")]
    InvalidTypeLetter(char),
}

/// A parse error with its source position.
#[derive(Debug, Error)]
#[error("{file}:{line}: {kind}")]
pub struct PseudoError {
    /// Name of the description file, for diagnostics.
    pub file: String,
    /// 1-based line number.
    pub line: usize,
    /// The failure itself.
    #[source]
    pub kind: PseudoErrorKind,
}

impl PseudoError {
    pub(crate) fn new(file: &str, line: usize, kind: PseudoErrorKind) -> Self {
        Self { file: file.to_owned(), line, kind }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_file_and_line() {
        let err = PseudoError::new("fs.txt", 7, PseudoErrorKind::MissingField("path"));
        assert_eq!(err.to_string(), "fs.txt:7: missing path");
    }
}
