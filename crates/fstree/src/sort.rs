//! Sort-file support: externally supplied packing priorities.
//!
//! A sort file holds `<path> <priority>` lines; files with higher priority
//! pack earlier. Entries with equal priority keep their insertion order —
//! the sort over the packing list is stable, so the tie break is the inode
//! order the post-processing pass produced.

use std::collections::HashMap;
use std::io::{self, BufRead};

/// Parsed sort-file priorities keyed by canonical path.
#[derive(Clone, Debug, Default)]
pub struct SortOrder {
    priorities: HashMap<String, i32>,
}

impl SortOrder {
    /// Parses `<path> <priority>` lines; `#` comments and blanks skipped.
    ///
    /// # Errors
    ///
    /// Propagates read failures; malformed lines are reported as
    /// [`io::ErrorKind::InvalidData`] with the line number.
    pub fn parse<R: BufRead>(reader: R) -> io::Result<Self> {
        let mut priorities = HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let Some((path, prio)) = trimmed.rsplit_once(char::is_whitespace) else {
                return Err(invalid(lineno + 1, "expected <path> <priority>"));
            };
            let priority: i32 = prio
                .parse()
                .map_err(|_| invalid(lineno + 1, "priority is not an integer"))?;
            priorities.insert(normalize(path.trim_end()), priority);
        }
        Ok(Self { priorities })
    }

    /// Priority for `path`; unlisted files default to 0.
    #[must_use]
    pub fn priority(&self, path: &str) -> i32 {
        self.priorities.get(path).copied().unwrap_or(0)
    }

    /// Whether no priorities were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.priorities.is_empty()
    }
}

fn invalid(line: usize, message: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("sort file line {line}: {message}"),
    )
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}
