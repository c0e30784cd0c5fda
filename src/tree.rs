//! Structural reconstruction: token stream to record forest.
//!
//! The feed mostly omits closing tags, so nesting is inferred from the
//! taxonomy's containment table: an opener that is illegal under the
//! current tag implicitly closes open tags until it finds a legal parent.
//! Reconstruction is deterministic and total: it never fails, and stray
//! or duplicate closers are ignored.

use tracing::debug;

use crate::taxonomy::Taxonomy;
use crate::tokenizer::Token;

/// A reconstructed tree element: tag name (lowercase), accumulated literal
/// text, and ordered children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub tag: String,
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    /// Create an empty node for a tag.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    /// First child with the given tag name.
    #[must_use]
    pub fn find_child(&self, tag: &str) -> Option<&Node> {
        self.children
            .iter()
            .find(|c| c.tag.eq_ignore_ascii_case(tag))
    }

    /// Resolve a slash-separated path of tag names, e.g. `"link/url"`.
    #[must_use]
    pub fn find_by_path(&self, path: &str) -> Option<&Node> {
        let mut current = self;
        for part in path.split('/') {
            current = current.find_child(part)?;
        }
        Some(current)
    }

    /// Trimmed text content of the node.
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

/// Pop the top node and attach it to its parent, or to the forest when it
/// was a top-level node.
fn close_top(stack: &mut Vec<Node>, forest: &mut Vec<Node>) {
    if let Some(node) = stack.pop() {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None => forest.push(node),
        }
    }
}

/// Consume a token sequence and reconstruct the forest of record subtrees.
///
/// Literal text outside any open tag has no node to attach to and is
/// discarded after a debug log, so input containing no known tags yields
/// an empty forest rather than a text-only root node.
pub fn reconstruct<I>(tokens: I, taxonomy: &Taxonomy) -> Vec<Node>
where
    I: IntoIterator<Item = Token>,
{
    let mut forest: Vec<Node> = Vec::new();
    let mut stack: Vec<Node> = Vec::new();

    for token in tokens {
        match token {
            Token::Open { name, .. } => {
                let repeat = stack
                    .last()
                    .is_some_and(|top| top.tag == name && taxonomy.is_repeatable(&name));
                if repeat {
                    // New sibling instance of a repeatable tag.
                    close_top(&mut stack, &mut forest);
                } else {
                    while let Some(top) = stack.last() {
                        if taxonomy.can_contain(Some(&top.tag), &name) {
                            break;
                        }
                        debug!(tag = %top.tag, opener = %name, "implicit close");
                        close_top(&mut stack, &mut forest);
                    }
                    if stack.is_empty() && !taxonomy.can_contain(None, &name) {
                        debug!(tag = %name, "no legal parent; keeping at top level");
                    }
                }
                stack.push(Node::new(name));
            }
            Token::Close { name } => {
                if stack.iter().any(|n| n.tag == name) {
                    loop {
                        let found = stack.last().is_some_and(|n| n.tag == name);
                        close_top(&mut stack, &mut forest);
                        if found {
                            break;
                        }
                    }
                } else {
                    debug!(tag = %name, "ignoring unmatched closing tag");
                }
            }
            Token::Literal(text) => match stack.last_mut() {
                Some(top) => {
                    if taxonomy.is_text_bearing(&top.tag) || !text.trim().is_empty() {
                        top.text.push_str(&text);
                    }
                }
                None => {
                    if !text.trim().is_empty() {
                        debug!(len = text.len(), "discarding text outside any record");
                    }
                }
            },
        }
    }

    // End of stream closes everything still open, deepest first.
    while !stack.is_empty() {
        close_top(&mut stack, &mut forest);
    }

    forest
}
