#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `pseudo` parses the textual filesystem description consumed alongside (or
//! instead of) a host directory scan. Each non-empty, non-comment line is
//! `<kind> <path> <mode> <uid> <gid> [extra]`, where the keyword selects one
//! of the [`PseudoOp`] variants and the extra fields depend on it.
//!
//! # Design
//!
//! The keyword table is a static, exhaustive match from keyword to a tagged
//! variant; each variant has one handler that consumes the remaining tokens.
//! Tokenization honors shell-like quoting (`"…"` and `'…'`, with `\"` and
//! `\\` inside double quotes) so names may contain spaces. Every error
//! carries `filename:line:` and parsing halts at the first one.
//!
//! # Errors
//!
//! [`PseudoError`] pairs the source position with a [`PseudoErrorKind`];
//! range violations (mode above `0o7777`, numeric overflow) are detected
//! during parsing, before any tree mutation.

mod apply;
mod error;
mod parser;
mod token;

pub use apply::apply;
pub use error::{PseudoError, PseudoErrorKind};
pub use parser::{parse, GlobSpec, PseudoOp};
