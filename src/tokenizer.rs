//! Lexical scanner over the nightly feed's angle-bracket grammar.
//!
//! The feed mixes markup and literal data in one stream: some bracketed
//! runs are real tags, others are HTML or plain text pasted into a field.
//! Whether `<name ...>` is a tag is decided by taxonomy membership, not by
//! syntax alone. Tokenization is total: any input, including mismatched
//! brackets, produces a complete token sequence without errors.

use crate::taxonomy::Taxonomy;

/// One lexical event in the dump stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `<name ...>` for a taxonomy-known name. `attrs` is the raw,
    /// uninterpreted text after the name.
    Open { name: String, attrs: String },

    /// `</name>` for a taxonomy-known name.
    Close { name: String },

    /// A maximal run of non-tag text, including bracketed runs that
    /// failed tag syntax or named an unknown tag.
    Literal(String),
}

impl Token {
    /// Text content of the token with tag markup stripped.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Token::Literal(text) => text,
            _ => "",
        }
    }
}

/// Lazy tokenizer over a decoded dump. Restartable only by constructing a
/// new instance over the same input.
pub struct Tokenizer<'a> {
    input: &'a str,
    taxonomy: &'a Taxonomy,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    /// Create a tokenizer over `input` using `taxonomy` to separate tags
    /// from tag-shaped data.
    #[must_use]
    pub fn new(input: &'a str, taxonomy: &'a Taxonomy) -> Self {
        Self {
            input,
            taxonomy,
            pos: 0,
        }
    }

    /// Try to parse a tag starting at byte offset `start` (which must hold
    /// `<`). Returns the token and the offset just past the closing `>`.
    ///
    /// Fails (returning `None`, so the bytes stay literal) on unterminated
    /// brackets, malformed names, or names the taxonomy does not know.
    fn try_tag_at(&self, start: usize) -> Option<(Token, usize)> {
        let bytes = self.input.as_bytes();
        let mut i = start + 1;

        let closing = bytes.get(i) == Some(&b'/');
        if closing {
            i += 1;
        }

        let name_start = i;
        while i < bytes.len() && is_name_byte(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            return None;
        }
        let name = &self.input[name_start..i];

        // Whatever follows the name must be whitespace-separated attribute
        // text ending at `>`; a second `<` first means unterminated.
        let attrs_start = i;
        while i < bytes.len() && bytes[i] != b'>' && bytes[i] != b'<' {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'>' {
            return None;
        }
        let raw_attrs = &self.input[attrs_start..i];
        if !raw_attrs.is_empty() {
            if closing {
                return None;
            }
            if !bytes[attrs_start].is_ascii_whitespace() {
                // e.g. `<weird/>`, not tag syntax
                return None;
            }
        }

        if !self.taxonomy.is_known(name) {
            return None;
        }

        let name = name.to_ascii_lowercase();
        let token = if closing {
            Token::Close { name }
        } else {
            Token::Open {
                name,
                attrs: raw_attrs.trim().to_string(),
            }
        };
        Some((token, i + 1))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.pos >= self.input.len() {
            return None;
        }

        let bytes = self.input.as_bytes();
        let start = self.pos;
        let mut i = self.pos;

        while i < bytes.len() {
            if bytes[i] == b'<' {
                if let Some((token, end)) = self.try_tag_at(i) {
                    if i > start {
                        // Flush the literal run first; the tag is
                        // re-scanned on the next call.
                        self.pos = i;
                        return Some(Token::Literal(self.input[start..i].to_string()));
                    }
                    self.pos = end;
                    return Some(token);
                }
            }
            i += 1;
        }

        self.pos = i;
        Some(Token::Literal(self.input[start..].to_string()))
    }
}

/// Bytes allowed in a tag name.
fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{TagSpec, Taxonomy};
    use pretty_assertions::assert_eq;

    fn taxonomy() -> Taxonomy {
        let mut taxonomy = Taxonomy::new();
        taxonomy.register(TagSpec::record("RECORD").with_text_bearing());
        taxonomy.register(TagSpec::record("EXCLUDED").with_text_bearing());
        taxonomy.register(TagSpec::field("FIELD").with_text_bearing());
        taxonomy
    }

    fn tokens(input: &str) -> Vec<Token> {
        let taxonomy = taxonomy();
        Tokenizer::new(input, &taxonomy).collect()
    }

    fn open(name: &str) -> Token {
        Token::Open {
            name: name.to_string(),
            attrs: String::new(),
        }
    }

    fn close(name: &str) -> Token {
        Token::Close {
            name: name.to_string(),
        }
    }

    fn literal(text: &str) -> Token {
        Token::Literal(text.to_string())
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(tokens(""), vec![]);
    }

    #[test]
    fn test_plain_literal() {
        assert_eq!(tokens("just some text"), vec![literal("just some text")]);
    }

    #[test]
    fn test_open_close() {
        assert_eq!(
            tokens("<RECORD>hi</RECORD>"),
            vec![open("record"), literal("hi"), close("record")]
        );
    }

    #[test]
    fn test_tag_name_case_insensitive() {
        assert_eq!(tokens("<Record>"), vec![open("record")]);
    }

    #[test]
    fn test_unknown_tag_is_literal() {
        assert_eq!(
            tokens("<EXCLUDED>NotATag<weird/></EXCLUDED>"),
            vec![
                open("excluded"),
                literal("NotATag<weird/>"),
                close("excluded"),
            ]
        );
    }

    #[test]
    fn test_unknown_tag_name_is_literal() {
        assert_eq!(tokens("<html>"), vec![literal("<html>")]);
    }

    #[test]
    fn test_open_tag_with_attrs() {
        assert_eq!(
            tokens("<RECORD foo=bar>"),
            vec![Token::Open {
                name: "record".to_string(),
                attrs: "foo=bar".to_string(),
            }]
        );
    }

    #[test]
    fn test_unterminated_bracket_is_literal() {
        assert_eq!(tokens("text <RECORD"), vec![literal("text <RECORD")]);
    }

    #[test]
    fn test_unterminated_before_next_tag() {
        assert_eq!(
            tokens("<RECORD<FIELD>"),
            vec![literal("<RECORD"), open("field")]
        );
    }

    #[test]
    fn test_stray_gt_is_literal() {
        assert_eq!(tokens("a > b"), vec![literal("a > b")]);
    }

    #[test]
    fn test_lone_brackets() {
        assert_eq!(tokens("<"), vec![literal("<")]);
        assert_eq!(tokens(">"), vec![literal(">")]);
        assert_eq!(tokens("<>"), vec![literal("<>")]);
    }

    #[test]
    fn test_close_with_attrs_is_literal() {
        assert_eq!(tokens("</RECORD x>"), vec![literal("</RECORD x>")]);
    }

    #[test]
    fn test_consecutive_literals_coalesce() {
        // Unknown tags and surrounding text form one literal run.
        assert_eq!(
            tokens("a <b> c <i>d</i>"),
            vec![literal("a <b> c <i>d</i>")]
        );
    }

    #[test]
    fn test_projection_reconstructs_input() {
        // Concatenating literal text plus re-rendered tags gives back a
        // deterministic projection of the input.
        let input = "<RECORD>text <odd> more</RECORD>\n trailing <";
        let taxonomy = taxonomy();
        let mut projected = String::new();
        for token in Tokenizer::new(input, &taxonomy) {
            match token {
                Token::Open { ref name, ref attrs } if attrs.is_empty() => {
                    projected.push_str(&format!("<{}>", name.to_uppercase()));
                }
                Token::Open { ref name, ref attrs } => {
                    projected.push_str(&format!("<{} {}>", name.to_uppercase(), attrs));
                }
                Token::Close { ref name } => {
                    projected.push_str(&format!("</{}>", name.to_uppercase()));
                }
                Token::Literal(ref text) => projected.push_str(text),
            }
        }
        assert_eq!(projected, input);
    }

    #[test]
    fn test_totality_on_arbitrary_bytes() {
        // Latin-1 artifacts and bracket noise terminate cleanly.
        let input = "caf\u{e9} <<RECORD>> <FIELD</FIELD> <1>";
        let taxonomy = taxonomy();
        let collected: Vec<Token> = Tokenizer::new(input, &taxonomy).collect();
        assert!(!collected.is_empty());
        let text_len: usize = collected.iter().map(|t| t.text().len()).sum();
        assert!(text_len > 0);
    }
}
