//! Line parsing into tagged operations.

use std::io::BufRead;
use std::path::PathBuf;

use fstree::NodeAttrs;
use walk::KindMask;

use crate::error::{PseudoError, PseudoErrorKind};
use crate::token::tokenize;

/// One parsed description line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PseudoOp {
    /// `dir <path> <mode> <uid> <gid>`
    Dir {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
    },
    /// `slink <path> <mode> <uid> <gid> <target>`
    Symlink {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
        /// Link target, verbatim.
        target: String,
    },
    /// `link <path> <mode> <uid> <gid> <source>` — a hard link; the stated
    /// attributes are ignored in favor of the target's.
    HardLink {
        /// Tree path of the new entry.
        path: String,
        /// Tree path of the node it aliases.
        target: String,
    },
    /// `nod <path> <mode> <uid> <gid> c|b <major> <minor>`
    Device {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
        /// True for a block device, false for character.
        block: bool,
        /// Major number.
        major: u32,
        /// Minor number.
        minor: u32,
    },
    /// `pipe <path> <mode> <uid> <gid>`
    Fifo {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
    },
    /// `sock <path> <mode> <uid> <gid>`
    Socket {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
    },
    /// `file <path> <mode> <uid> <gid> [host-path]` — the body is read from
    /// `source`, which defaults to the declared path.
    File {
        /// Tree path.
        path: String,
        /// Stated attributes.
        attrs: NodeAttrs,
        /// Host path the body is read from.
        source: PathBuf,
    },
    /// `glob <path> <mode|*> <uid|*> <gid|*> [options…] [base-dir]` — scan a
    /// host directory into `path`, filtered by `spec`.
    Glob {
        /// Tree path the scan lands under.
        path: String,
        /// Filter specification.
        spec: GlobSpec,
    },
}

/// Filter specification attached to a `glob` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GlobSpec {
    /// Mode override; `None` means `*` (keep the host value).
    pub mode: Option<u16>,
    /// Uid override; `None` keeps the host value.
    pub uid: Option<u32>,
    /// Gid override; `None` keeps the host value.
    pub gid: Option<u32>,
    /// Kind whitelist accumulated from `-type`.
    pub kinds: KindMask,
    /// `-xdev` / `-mount`.
    pub one_file_system: bool,
    /// `-keeptime`.
    pub keep_time: bool,
    /// Cleared by `-nonrecursive`.
    pub recursive: bool,
    /// `-name` / `-path` pattern and whether it applies to the full path.
    pub pattern: Option<(String, bool)>,
    /// Optional base directory; defaults to the declared tree path.
    pub base: Option<PathBuf>,
}

impl Default for GlobSpec {
    fn default() -> Self {
        Self {
            mode: None,
            uid: None,
            gid: None,
            kinds: KindMask::all(),
            one_file_system: false,
            keep_time: false,
            recursive: true,
            pattern: None,
            base: None,
        }
    }
}

/// Parses a whole description, halting on the first error.
///
/// `filename` only labels diagnostics. Comments are full-line `#`; leading
/// whitespace is trimmed and empty lines skipped.
///
/// # Errors
///
/// The first [`PseudoError`], positioned at its source line.
pub fn parse<R: BufRead>(reader: R, filename: &str) -> Result<Vec<PseudoOp>, PseudoError> {
    let mut ops = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let lineno = index + 1;
        let fail = |kind| PseudoError::new(filename, lineno, kind);
        let line = line.map_err(|e| fail(PseudoErrorKind::Io(e)))?;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tokens = tokenize(trimmed).map_err(&fail)?;
        if tokens.is_empty() {
            continue;
        }
        ops.push(parse_line(&tokens).map_err(&fail)?);
    }
    Ok(ops)
}

/// The static keyword table; every variant has exactly one handler below.
fn parse_line(tokens: &[String]) -> Result<PseudoOp, PseudoErrorKind> {
    let keyword = tokens[0].as_str();
    let mut fields = Fields::new(&tokens[1..]);
    match keyword {
        "dir" => {
            let (path, attrs) = fields.path_and_attrs()?;
            fields.done("dir line")?;
            Ok(PseudoOp::Dir { path, attrs })
        }
        "slink" => {
            let (path, attrs) = fields.path_and_attrs()?;
            let target = fields.take("symlink target")?.to_owned();
            fields.done("symlink target")?;
            Ok(PseudoOp::Symlink { path, attrs, target })
        }
        "link" => {
            let (path, _attrs) = fields.path_and_attrs()?;
            let target = fields.take("hard link source")?.to_owned();
            fields.done("hard link source")?;
            Ok(PseudoOp::HardLink { path, target })
        }
        "nod" => {
            let (path, attrs) = fields.path_and_attrs()?;
            let block = match fields.take("device type")? {
                "c" => false,
                "b" => true,
                _ => return Err(PseudoErrorKind::InvalidDevice),
            };
            let major = parse_u32(fields.take("device major")?, "major")?;
            let minor = parse_u32(fields.take("device minor")?, "minor")?;
            fields.done("device specification")?;
            Ok(PseudoOp::Device { path, attrs, block, major, minor })
        }
        "pipe" => {
            let (path, attrs) = fields.path_and_attrs()?;
            fields.done("pipe line")?;
            Ok(PseudoOp::Fifo { path, attrs })
        }
        "sock" => {
            let (path, attrs) = fields.path_and_attrs()?;
            fields.done("sock line")?;
            Ok(PseudoOp::Socket { path, attrs })
        }
        "file" => {
            let (path, attrs) = fields.path_and_attrs()?;
            let source = fields.take_optional().map_or_else(|| path.clone(), str::to_owned);
            fields.done("file source")?;
            Ok(PseudoOp::File { path, attrs, source: PathBuf::from(source) })
        }
        "glob" => {
            let path = fields.take("path")?.to_owned();
            let spec = parse_glob(&mut fields)?;
            Ok(PseudoOp::Glob { path, spec })
        }
        other => Err(PseudoErrorKind::UnknownKeyword(other.to_owned())),
    }
}

fn parse_glob(fields: &mut Fields<'_>) -> Result<GlobSpec, PseudoErrorKind> {
    let mut spec = GlobSpec {
        mode: parse_starred_mode(fields.take("mode")?)?,
        uid: parse_starred_u32(fields.take("uid")?, "uid")?,
        gid: parse_starred_u32(fields.take("gid")?, "gid")?,
        ..GlobSpec::default()
    };

    let mut first_type = true;
    let mut options_done = false;
    while let Some(token) = fields.take_optional() {
        if options_done || !token.starts_with('-') {
            spec.base = Some(PathBuf::from(token));
            fields.done("glob base directory")?;
            break;
        }
        match token {
            "--" => options_done = true,
            "-xdev" | "-mount" => spec.one_file_system = true,
            "-keeptime" => spec.keep_time = true,
            "-nonrecursive" => spec.recursive = false,
            "-type" => {
                let letters = fields.take("-type argument")?;
                // The first -type narrows from "everything" to nothing.
                if first_type {
                    spec.kinds = KindMask::none();
                    first_type = false;
                }
                for letter in letters.chars() {
                    spec.kinds = spec
                        .kinds
                        .with_letter(letter)
                        .ok_or(PseudoErrorKind::InvalidTypeLetter(letter))?;
                }
            }
            "-name" => {
                let pattern = fields.take("-name argument")?.to_owned();
                spec.pattern = Some((pattern, false));
            }
            "-path" => {
                let pattern = fields.take("-path argument")?.to_owned();
                spec.pattern = Some((pattern, true));
            }
            other => return Err(PseudoErrorKind::UnknownOption(other.to_owned())),
        }
    }
    Ok(spec)
}

struct Fields<'a> {
    tokens: &'a [String],
    next: usize,
}

impl<'a> Fields<'a> {
    fn new(tokens: &'a [String]) -> Self {
        Self { tokens, next: 0 }
    }

    fn take(&mut self, what: &'static str) -> Result<&'a str, PseudoErrorKind> {
        self.take_optional().ok_or(PseudoErrorKind::MissingField(what))
    }

    fn take_optional(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.next)?;
        self.next += 1;
        Some(token.as_str())
    }

    fn done(&self, after: &'static str) -> Result<(), PseudoErrorKind> {
        if self.next < self.tokens.len() {
            return Err(PseudoErrorKind::TrailingTokens(after));
        }
        Ok(())
    }

    fn path_and_attrs(&mut self) -> Result<(String, NodeAttrs), PseudoErrorKind> {
        let path = self.take("path")?.to_owned();
        let mode = parse_mode(self.take("mode")?)?;
        let uid = parse_u32(self.take("uid")?, "uid")?;
        let gid = parse_u32(self.take("gid")?, "gid")?;
        Ok((path, NodeAttrs { mode, uid, gid, mtime: 0 }))
    }
}

fn parse_mode(text: &str) -> Result<u16, PseudoErrorKind> {
    let mode = u32::from_str_radix(text, 8)
        .map_err(|_| PseudoErrorKind::InvalidMode(text.to_owned()))?;
    if mode > 0o7777 {
        return Err(PseudoErrorKind::InvalidMode(text.to_owned()));
    }
    Ok(mode as u16)
}

fn parse_u32(text: &str, field: &'static str) -> Result<u32, PseudoErrorKind> {
    text.parse().map_err(|_| PseudoErrorKind::InvalidNumber {
        field,
        value: text.to_owned(),
    })
}

fn parse_starred_mode(text: &str) -> Result<Option<u16>, PseudoErrorKind> {
    if text == "*" {
        return Ok(None);
    }
    parse_mode(text).map(Some)
}

fn parse_starred_u32(text: &str, field: &'static str) -> Result<Option<u32>, PseudoErrorKind> {
    if text == "*" {
        return Ok(None);
    }
    parse_u32(text, field).map(Some)
}
