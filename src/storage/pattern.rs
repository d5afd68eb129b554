//! Glob matching with Redis `KEYS` semantics.
//!
//! Supported syntax: `*` (any run), `?` (one char), `[abc]`, `[^abc]`,
//! `[a-z]` and `\` to escape the next character. Used by the in-memory
//! store; the Redis store delegates matching to the server.

use super::traits::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassItem {
    Char(char),
    Range(char, char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
    Class { negated: bool, items: Vec<ClassItem> },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyOne => true,
            Token::AnyRun => false,
            Token::Class { negated, items } => {
                let hit = items.iter().any(|item| match *item {
                    ClassItem::Char(x) => x == c,
                    ClassItem::Range(lo, hi) => lo <= c && c <= hi,
                });
                hit != *negated
            }
        }
    }
}

/// A compiled key pattern.
#[derive(Debug, Clone)]
pub struct KeyPattern {
    tokens: Vec<Token>,
}

impl KeyPattern {
    pub fn compile(pattern: &str) -> Result<Self, StorageError> {
        let invalid = |reason: &str| StorageError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '*' => {
                    // Collapse runs of stars
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                '?' => tokens.push(Token::AnyOne),
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| invalid("trailing escape"))?;
                    tokens.push(Token::Literal(escaped));
                }
                '[' => {
                    let negated = chars.next_if_eq(&'^').is_some();
                    let mut items = Vec::new();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        match c {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '\\' => {
                                let escaped =
                                    chars.next().ok_or_else(|| invalid("trailing escape"))?;
                                items.push(ClassItem::Char(escaped));
                            }
                            lo => {
                                if chars.next_if_eq(&'-').is_some() {
                                    match chars.next() {
                                        Some(']') | None => {
                                            return Err(invalid("unterminated range"));
                                        }
                                        Some(hi) if lo <= hi => items.push(ClassItem::Range(lo, hi)),
                                        Some(hi) => items.push(ClassItem::Range(hi, lo)),
                                    }
                                } else {
                                    items.push(ClassItem::Char(lo));
                                }
                            }
                        }
                    }
                    if !closed {
                        return Err(invalid("unterminated character class"));
                    }
                    tokens.push(Token::Class { negated, items });
                }
                other => tokens.push(Token::Literal(other)),
            }
        }
        Ok(Self { tokens })
    }

    pub fn matches(&self, key: &str) -> bool {
        let text: Vec<char> = key.chars().collect();
        let tokens = &self.tokens;
        let (mut p, mut s) = (0usize, 0usize);
        // (token index of last star, text index it currently absorbs up to)
        let mut backtrack: Option<(usize, usize)> = None;

        while s < text.len() {
            if p < tokens.len() {
                if tokens[p] == Token::AnyRun {
                    backtrack = Some((p, s));
                    p += 1;
                    continue;
                }
                if tokens[p].matches(text[s]) {
                    p += 1;
                    s += 1;
                    continue;
                }
            }
            match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    s = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            }
        }
        while p < tokens.len() && tokens[p] == Token::AnyRun {
            p += 1;
        }
        p == tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(pattern: &str, key: &str) -> bool {
        KeyPattern::compile(pattern).unwrap().matches(key)
    }

    #[test]
    fn test_literal_and_star() {
        assert!(m("user:1", "user:1"));
        assert!(!m("user:1", "user:10"));
        assert!(m("user:*", "user:10"));
        assert!(m("user:*", "user:"));
        assert!(m("*", ""));
        assert!(m("*:profile", "user:42:profile"));
        assert!(!m("*:profile", "user:42:profiles"));
        assert!(m("a*b*c", "axxbyyc"));
        assert!(!m("a*b*c", "axxbyy"));
    }

    #[test]
    fn test_question_mark() {
        assert!(m("h?llo", "hello"));
        assert!(m("h?llo", "hallo"));
        assert!(!m("h?llo", "hllo"));
    }

    #[test]
    fn test_character_classes() {
        assert!(m("h[ae]llo", "hello"));
        assert!(m("h[ae]llo", "hallo"));
        assert!(!m("h[ae]llo", "hillo"));
        assert!(m("h[^e]llo", "hallo"));
        assert!(!m("h[^e]llo", "hello"));
        assert!(m("h[a-b]llo", "hbllo"));
        assert!(m("h[b-a]llo", "hallo"));
        assert!(!m("h[a-b]llo", "hcllo"));
    }

    #[test]
    fn test_escapes() {
        assert!(m("a\\*b", "a*b"));
        assert!(!m("a\\*b", "axb"));
        assert!(m("[\\]]", "]"));
    }

    #[test]
    fn test_malformed_patterns_are_rejected() {
        assert!(matches!(
            KeyPattern::compile("user:["),
            Err(StorageError::InvalidPattern { .. })
        ));
        assert!(matches!(
            KeyPattern::compile("user\\"),
            Err(StorageError::InvalidPattern { .. })
        ));
        assert!(matches!(
            KeyPattern::compile("[a-]"),
            Err(StorageError::InvalidPattern { .. })
        ));
    }
}
