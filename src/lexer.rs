//! Line-oriented tokenizer for the cel-position DSL (spec.md §4.1).
//!
//! Mirrors the teacher's low-level `AseReader` read-primitives layer: this
//! module only knows how to turn source text into tokens; it has no
//! knowledge of what a `frame` or `strip` directive means. That's
//! `parser.rs`'s job.

use crate::error::CrunchError;

/// One non-blank, non-comment source line, whitespace-split into tokens.
#[derive(Debug, Clone)]
pub struct Line {
    pub number: usize,
    pub tokens: Vec<String>,
}

/// Strip a `#`-prefixed comment (leading whitespace before `#` is allowed),
/// then split on whitespace. Blank lines (after comment removal) are
/// dropped entirely, so `lex()` only ever returns lines with >= 1 token.
pub fn lex(input: &str) -> Vec<Line> {
    let mut lines = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let trimmed = raw.trim();
        let without_comment = match trimmed.find('#') {
            Some(pos) => &trimmed[..pos],
            None => trimmed,
        };
        let tokens: Vec<String> = without_comment
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        if !tokens.is_empty() {
            lines.push(Line {
                number: idx + 1,
                tokens,
            });
        }
    }
    lines
}

/// Parse an integer token: decimal, `$HEX`, or `0xHEX`.
pub fn parse_int(line: usize, token: &str) -> Result<i64, CrunchError> {
    let bad = || CrunchError::parse(line, format!("malformed number: '{}'", token));
    if let Some(hex) = token.strip_prefix('$') {
        i64::from_str_radix(hex, 16).map_err(|_| bad())
    } else if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).map_err(|_| bad())
    } else {
        token.parse::<i64>().map_err(|_| bad())
    }
}

/// Parse a `#RGB` or `#RRGGBB` color token. `#RGB` nybbles are doubled to
/// expand to 8 bits per channel (spec.md §4.1).
pub fn parse_color(line: usize, token: &str) -> Result<crate::color::Color, CrunchError> {
    let bad = || CrunchError::parse(line, format!("malformed color: '{}'", token));
    let hex = token.strip_prefix('#').ok_or_else(bad)?;
    match hex.len() {
        3 => {
            let mut channels = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let nybble = c.to_digit(16).ok_or_else(bad)? as u8;
                channels[i] = nybble * 16 + nybble;
            }
            Ok(crate::color::Color::new(channels[0], channels[1], channels[2]))
        }
        6 => {
            let v = u32::from_str_radix(hex, 16).map_err(|_| bad())?;
            Ok(crate::color::Color::new(
                ((v >> 16) & 0xFF) as u8,
                ((v >> 8) & 0xFF) as u8,
                (v & 0xFF) as u8,
            ))
        }
        _ => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lex_drops_comments_and_blank_lines() {
        let src = "frame foo\n  # comment only\n\nstrip 0 # trailing\n";
        let lines = lex(src);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].number, 1);
        assert_eq!(lines[0].tokens, vec!["frame", "foo"]);
        assert_eq!(lines[1].number, 4);
        assert_eq!(lines[1].tokens, vec!["strip", "0"]);
    }

    #[test]
    fn parse_int_supports_all_bases() {
        assert_eq!(parse_int(1, "42").unwrap(), 42);
        assert_eq!(parse_int(1, "$2A").unwrap(), 42);
        assert_eq!(parse_int(1, "0x2A").unwrap(), 42);
        assert!(parse_int(1, "nope").is_err());
    }

    #[test]
    fn parse_color_expands_short_form() {
        let c = parse_color(1, "#F00").unwrap();
        assert_eq!(c, crate::color::Color::new(0xFF, 0, 0));
        let c2 = parse_color(1, "#FF0000").unwrap();
        assert_eq!(c2, c);
    }
}
