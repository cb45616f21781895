//! Inbound protocol lines, tokenized on whitespace.

use std::fmt;

use crate::error::ClientError;

/// One received line split into whitespace-separated tokens.
///
/// A line like `:nick!user@host PRIVMSG #chan :!ping now` becomes
/// `[":nick!user@host", "PRIVMSG", "#chan", ":!ping", "now"]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: String,
    tokens: Vec<String>,
}

impl Line {
    /// Decode and tokenize one frame (without its terminator).
    ///
    /// Fails with [`ClientError::MalformedLine`] when the bytes are not UTF-8
    /// or the line holds no tokens at all.
    pub fn parse(frame: &[u8]) -> Result<Self, ClientError> {
        let text = std::str::from_utf8(frame).map_err(|e| ClientError::MalformedLine {
            reason: format!("invalid utf-8 at byte {}", e.valid_up_to()),
        })?;
        let raw = text.trim().to_string();
        let tokens: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        if tokens.is_empty() {
            return Err(ClientError::MalformedLine {
                reason: "empty line".to_string(),
            });
        }
        Ok(Self { raw, tokens })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn token(&self, index: usize) -> Option<&str> {
        self.tokens.get(index).map(String::as_str)
    }

    /// The source prefix without its leading `:`, if the line has one.
    pub fn prefix(&self) -> Option<&str> {
        self.tokens.first().and_then(|t| t.strip_prefix(':'))
    }

    /// The command or numeric, skipping the prefix when present.
    pub fn command(&self) -> Option<&str> {
        let index = usize::from(self.prefix().is_some());
        self.token(index)
    }

    /// Parameters after the command, still tokenized.
    pub fn params(&self) -> &[String] {
        let start = usize::from(self.prefix().is_some()) + 1;
        self.tokens.get(start..).unwrap_or(&[])
    }

    /// The nick part of the prefix (`nick` in `nick!user@host`).
    pub fn sender(&self) -> Option<&str> {
        self.prefix()
            .and_then(|p| p.split('!').next())
            .filter(|n| !n.is_empty())
    }

    /// Tokens from `index` on, rejoined with single spaces, with a leading
    /// `:` on the first token removed.
    pub fn text_from(&self, index: usize) -> Option<String> {
        let rest = self.tokens.get(index..).filter(|r| !r.is_empty())?;
        let joined = rest.join(" ");
        Some(joined.strip_prefix(':').map(str::to_string).unwrap_or(joined))
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_privmsg_with_prefix() {
        let line = Line::parse(b":alice!a@host PRIVMSG #rust :!ping  now").unwrap();
        assert_eq!(line.prefix(), Some("alice!a@host"));
        assert_eq!(line.sender(), Some("alice"));
        assert_eq!(line.command(), Some("PRIVMSG"));
        assert_eq!(line.params(), ["#rust", ":!ping", "now"]);
        assert_eq!(line.text_from(3).as_deref(), Some("!ping now"));
    }

    #[test]
    fn parses_line_without_prefix() {
        let line = Line::parse(b"PING :server1").unwrap();
        assert_eq!(line.prefix(), None);
        assert_eq!(line.command(), Some("PING"));
        assert_eq!(line.params(), [":server1"]);
        assert_eq!(line.sender(), None);
    }

    #[test]
    fn rejects_empty_and_invalid_utf8() {
        assert!(matches!(
            Line::parse(b"   \t "),
            Err(ClientError::MalformedLine { .. })
        ));
        assert!(matches!(
            Line::parse(&[0x50, 0xff, 0xfe]),
            Err(ClientError::MalformedLine { .. })
        ));
    }

    #[test]
    fn text_from_out_of_range() {
        let line = Line::parse(b"NOTICE * :hello").unwrap();
        assert_eq!(line.text_from(2).as_deref(), Some("hello"));
        assert_eq!(line.text_from(3), None);
    }
}
