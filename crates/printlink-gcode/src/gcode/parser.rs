//! G-Code line parser
//!
//! Parsing is permissive: every line yields a [`Command`], whatever it contains.

use regex::Regex;
use std::sync::OnceLock;

use super::command::{Command, CommandKind, Word, RECOGNIZED_LETTERS};

/// Marker that starts a host directive
pub const DIRECTIVE_MARKER: &str = ";@";

/// Stateless line parser
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    /// Create a new parser
    pub fn new() -> Self {
        Self
    }

    /// Parse one line
    pub fn parse(&self, raw: &str) -> Command {
        parse_line(raw)
    }
}

/// Parse one line of G-Code into a [`Command`].
///
/// `;@` directives are captured before comments are removed. `( ... )` and
/// `;` comments and a trailing `*checksum` are stripped; a leading `N` word
/// becomes the line number. The first G/M/T word is the mnemonic, with leading
/// zeros removed. A non-empty line with nothing tokenizable keeps its trimmed
/// text as mnemonic and is flagged malformed.
pub fn parse_line(raw: &str) -> Command {
    let directive = raw
        .trim_start()
        .strip_prefix(DIRECTIVE_MARKER)
        .map(|rest| rest.trim().to_string());

    let cleaned = remove_comments(raw);
    let without_checksum = match cleaned.find('*') {
        Some(star) => &cleaned[..star],
        None => cleaned.as_str(),
    };
    let code = without_checksum.trim();

    let tokens = tokenize(code);
    let line_number = tokens
        .iter()
        .find(|t| t.word.letter == 'N')
        .and_then(|t| t.word.value)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64);

    let payload = strip_line_number(code).to_string();

    let mut mnemonic = tokens
        .iter()
        .find(|t| matches!(t.word.letter, 'G' | 'M' | 'T') && t.word.value.is_some())
        .map(|t| format!("{}{}", t.word.letter, normalize_number(&t.text)));

    let malformed = tokens.is_empty() && !code.is_empty();
    if malformed {
        mnemonic = Some(raw.trim().to_string());
    }

    let kind = if malformed {
        CommandKind::Passthrough
    } else {
        CommandKind::from_mnemonic(mnemonic.as_deref())
    };

    Command {
        raw: raw.to_string(),
        payload,
        mnemonic,
        kind,
        line_number,
        words: tokens.into_iter().map(|t| t.word).collect(),
        directive,
        malformed,
        passive: false,
        annotation: None,
    }
}

/// Remove `( ... )` block comments and `;` end-of-line comments
fn remove_comments(line: &str) -> String {
    static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex =
        COMMENT_REGEX.get_or_init(|| Regex::new(r"\([^)]*\)?|;.*").expect("invalid regex pattern"));
    regex.replace_all(line, "").to_string()
}

fn strip_line_number(code: &str) -> &str {
    static LINE_NUMBER_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = LINE_NUMBER_REGEX
        .get_or_init(|| Regex::new(r"^[Nn]\s*\d+\s*").expect("invalid regex pattern"));
    match regex.find(code) {
        Some(m) => code[m.end()..].trim(),
        None => code,
    }
}

struct Token {
    word: Word,
    text: String,
}

fn tokenize(code: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        if !c.is_ascii_alphabetic() {
            continue;
        }
        let letter = c.to_ascii_uppercase();

        let mut text = String::new();
        while let Some(&next) = chars.peek() {
            let sign_allowed = text.is_empty() && (next == '-' || next == '+');
            if next.is_ascii_digit() || next == '.' || sign_allowed {
                text.push(next);
                chars.next();
            } else {
                break;
            }
        }

        if !RECOGNIZED_LETTERS.contains(&letter) {
            continue;
        }

        let value = text.parse::<f64>().ok();
        if value.is_none() && matches!(letter, 'G' | 'M' | 'T' | 'N') {
            continue;
        }
        tokens.push(Token {
            word: Word { letter, value },
            text,
        });
    }

    tokens
}

/// `01` -> `1`, `0` -> `0`, `29.1` -> `29.1`
fn normalize_number(text: &str) -> String {
    let text = text.trim_start_matches('+');
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (text, None),
    };
    let trimmed = int_part.trim_start_matches('0');
    let int_part = if trimmed.is_empty() { "0" } else { trimmed };
    match frac_part {
        Some(frac) if !frac.is_empty() => format!("{}.{}", int_part, frac),
        _ => int_part.to_string(),
    }
}
