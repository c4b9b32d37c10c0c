//! Tokeniser for the dotted/bracketed JSON-path grammar used by rule
//! actions (`override_json`/`remove_json`).
//!
//! Grammar: `segment (. segment | [ digits ])*` where a segment is a
//! non-empty run of characters excluding `.` and `[`. A bare segment that
//! parses as a non-negative integer is promoted to an index token, matching
//! `choices.1.delta` producing the same token sequence as `choices[1].delta`.

use crate::error::GatewayError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Key(String),
    Index(usize),
}

/// Parse a path like `messages[0].role` into an ordered token sequence.
pub fn parse(path: &str) -> Result<Vec<Token>, GatewayError> {
    if path.is_empty() {
        return Err(GatewayError::InvalidInput("invalid-path: empty input".into()));
    }

    let mut tokens = Vec::new();
    let bytes = path.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                let close = path[i..]
                    .find(']')
                    .map(|off| i + off)
                    .ok_or_else(|| GatewayError::InvalidInput("invalid-path: unmatched bracket".into()))?;
                let inner = &path[i + 1..close];
                if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(GatewayError::InvalidInput(
                        "invalid-path: empty or non-numeric bracket contents".into(),
                    ));
                }
                let idx: usize = inner
                    .parse()
                    .map_err(|_| GatewayError::InvalidInput("invalid-path: bad index".into()))?;
                tokens.push(Token::Index(idx));
                i = close + 1;
                // `]` followed by `.` is legal; consume the dot on the next pass.
                if i < bytes.len() && bytes[i] == b'.' {
                    i += 1;
                }
            }
            b'.' => {
                return Err(GatewayError::InvalidInput("invalid-path: empty segment".into()));
            }
            _ => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'.' && bytes[i] != b'[' {
                    i += 1;
                }
                let seg = &path[start..i];
                if seg.is_empty() {
                    return Err(GatewayError::InvalidInput("invalid-path: empty segment".into()));
                }
                tokens.push(match seg.parse::<usize>() {
                    Ok(n) => Token::Index(n),
                    Err(_) => Token::Key(seg.to_string()),
                });
                if i < bytes.len() && bytes[i] == b'.' {
                    i += 1;
                }
            }
        }
    }

    Ok(tokens)
}

/// Re-render a token sequence back into dotted/bracketed path form.
/// Used by the idempotence test for parse-then-serialise round-trips.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    for (i, tok) in tokens.iter().enumerate() {
        match tok {
            Token::Key(k) => {
                if i > 0 {
                    out.push('.');
                }
                out.push_str(k);
            }
            Token::Index(idx) => {
                out.push('[');
                out.push_str(&idx.to_string());
                out.push(']');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── basic segments ──
    #[test]
    fn single_key() {
        assert_eq!(parse("role").unwrap(), vec![Token::Key("role".into())]);
    }

    #[test]
    fn dotted_keys() {
        assert_eq!(
            parse("metadata.debug").unwrap(),
            vec![Token::Key("metadata".into()), Token::Key("debug".into())]
        );
    }

    // ── bracket indices ──
    #[test]
    fn bracket_index() {
        assert_eq!(
            parse("messages[0].role").unwrap(),
            vec![
                Token::Key("messages".into()),
                Token::Index(0),
                Token::Key("role".into())
            ]
        );
    }

    #[test]
    fn consecutive_indices() {
        assert_eq!(
            parse("matrix[0][1]").unwrap(),
            vec![Token::Key("matrix".into()), Token::Index(0), Token::Index(1)]
        );
    }

    // ── bare-integer promotion ──
    #[test]
    fn bare_integer_segment_promoted_to_index() {
        assert_eq!(
            parse("choices.1.delta").unwrap(),
            vec![Token::Key("choices".into()), Token::Index(1), Token::Key("delta".into())]
        );
    }

    // ── failure cases ──
    #[test]
    fn empty_input_fails() {
        assert!(parse("").is_err());
    }

    #[test]
    fn empty_segment_fails() {
        assert!(parse("a..b").is_err());
        assert!(parse(".a").is_err());
    }

    #[test]
    fn empty_brackets_fail() {
        assert!(parse("a[]").is_err());
    }

    #[test]
    fn non_numeric_bracket_fails() {
        assert!(parse("a[x]").is_err());
    }

    #[test]
    fn unmatched_bracket_fails() {
        assert!(parse("a[0").is_err());
    }

    // ── round-trip ──
    #[test]
    fn parse_then_render_round_trips() {
        for path in ["messages[0].role", "choices[1].delta", "a.b.c", "x[0][1]"] {
            let tokens = parse(path).unwrap();
            let rendered = render(&tokens);
            assert_eq!(parse(&rendered).unwrap(), tokens);
        }
    }
}
