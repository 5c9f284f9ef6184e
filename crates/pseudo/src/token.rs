//! Line tokenization with shell-like quoting.

use crate::PseudoErrorKind;

/// Splits a line into whitespace-separated tokens.
///
/// Double quotes accept `\"` and `\\` escapes; single quotes are fully
/// literal. Quotes may open mid-token, so `a"b c"d` is one token `ab cd`.
pub(crate) fn tokenize(line: &str) -> Result<Vec<String>, PseudoErrorKind> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('"' | '\\')) => current.push(escaped),
                            Some(other) => {
                                current.push('\\');
                                current.push(other);
                            }
                            None => return Err(PseudoErrorKind::UnterminatedQuote),
                        },
                        Some(other) => current.push(other),
                        None => return Err(PseudoErrorKind::UnterminatedQuote),
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(other) => current.push(other),
                        None => return Err(PseudoErrorKind::UnterminatedQuote),
                    }
                }
            }
            other => {
                in_token = true;
                current.push(other);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
