//! CSS selector subset.
//!
//! Supports type and universal selectors, `#id`, `.class`, `[attr]`,
//! `[attr=value]` (value bare or quoted), descendant and child (`>`)
//! combinators, and comma-separated alternatives.

use std::iter::Peekable;
use std::str::Chars;

use super::document::{Document, NodeId};
use crate::error::BindError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        if let Some(tag) = &self.tag
            && doc.tag(node).as_deref() != Some(tag.as_str())
        {
            return false;
        }
        if let Some(id) = &self.id
            && doc.attr(node, "id").as_deref() != Some(id.as_str())
        {
            return false;
        }
        if !self.classes.iter().all(|c| doc.has_class(node, c)) {
            return false;
        }
        self.attrs.iter().all(|(name, expected)| {
            let actual = doc.attr(node, name);
            match expected {
                None => actual.is_some(),
                Some(value) => actual.as_deref() == Some(value.as_str()),
            }
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// `compounds[i]` is joined to `compounds[i + 1]` by `combinators[i]`.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Complex {
    compounds: Vec<Compound>,
    combinators: Vec<Combinator>,
}

impl Complex {
    fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.matches_at(doc, node, self.compounds.len() - 1)
    }

    fn matches_at(&self, doc: &Document, node: NodeId, idx: usize) -> bool {
        if !self.compounds[idx].matches(doc, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => doc
                .parent(node)
                .is_some_and(|p| self.matches_at(doc, p, idx - 1)),
            Combinator::Descendant => std::iter::successors(doc.parent(node), |n| doc.parent(*n))
                .any(|ancestor| self.matches_at(doc, ancestor, idx - 1)),
        }
    }
}

/// A parsed selector list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CssSelector {
    alternatives: Vec<Complex>,
}

impl CssSelector {
    pub fn parse(text: &str) -> Result<Self, BindError> {
        Parser {
            chars: text.chars().peekable(),
            source: text,
        }
        .selector_list()
    }

    pub fn matches(&self, doc: &Document, node: NodeId) -> bool {
        self.alternatives.iter().any(|c| c.matches(doc, node))
    }
}

impl Document {
    /// Descendants of `scope` matching `selector`, in document order.
    pub fn query_all(&self, scope: NodeId, selector: &CssSelector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|n| selector.matches(self, *n))
            .collect()
    }
}

// =============================================================================
// Parser
// =============================================================================

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self) -> BindError {
        BindError::InvalidSelector(self.source.to_string())
    }

    fn skip_ws(&mut self) -> bool {
        let mut skipped = false;
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {
            skipped = true;
        }
        skipped
    }

    fn selector_list(mut self) -> Result<CssSelector, BindError> {
        let mut alternatives = Vec::new();
        loop {
            self.skip_ws();
            alternatives.push(self.complex()?);
            self.skip_ws();
            match self.chars.next() {
                Some(',') => continue,
                None => break,
                Some(_) => return Err(self.error()),
            }
        }
        Ok(CssSelector { alternatives })
    }

    fn complex(&mut self) -> Result<Complex, BindError> {
        let mut compounds = vec![self.compound()?];
        let mut combinators = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = match self.chars.peek() {
                Some('>') => {
                    self.chars.next();
                    self.skip_ws();
                    Combinator::Child
                }
                Some(',') | None => break,
                Some(_) if had_ws => Combinator::Descendant,
                Some(_) => return Err(self.error()),
            };
            combinators.push(combinator);
            compounds.push(self.compound()?);
        }
        Ok(Complex {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Result<Compound, BindError> {
        let mut compound = Compound::default();
        let mut any = false;
        match self.chars.peek() {
            Some('*') => {
                self.chars.next();
                any = true;
            }
            Some(c) if is_ident_char(*c) => {
                compound.tag = Some(self.ident()?.to_ascii_lowercase());
                any = true;
            }
            _ => {}
        }
        loop {
            match self.chars.peek() {
                Some('#') => {
                    self.chars.next();
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.chars.next();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.chars.next();
                    compound.attrs.push(self.attribute()?);
                }
                _ => break,
            }
            any = true;
        }
        if any { Ok(compound) } else { Err(self.error()) }
    }

    fn ident(&mut self) -> Result<String, BindError> {
        let mut out = String::new();
        while let Some(c) = self.chars.next_if(|c| is_ident_char(*c)) {
            out.push(c);
        }
        if out.is_empty() {
            Err(self.error())
        } else {
            Ok(out)
        }
    }

    fn attribute(&mut self) -> Result<(String, Option<String>), BindError> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        match self.chars.next() {
            Some(']') => Ok((name, None)),
            Some('=') => {
                self.skip_ws();
                let value = match self.chars.peek().copied() {
                    Some(quote @ ('"' | '\'')) => {
                        self.chars.next();
                        let mut value = String::new();
                        loop {
                            match self.chars.next() {
                                Some(c) if c == quote => break,
                                Some(c) => value.push(c),
                                None => return Err(self.error()),
                            }
                        }
                        value
                    }
                    _ => {
                        let mut value = String::new();
                        while let Some(c) =
                            self.chars.next_if(|c| *c != ']' && !c.is_whitespace())
                        {
                            value.push(c);
                        }
                        value
                    }
                };
                self.skip_ws();
                match self.chars.next() {
                    Some(']') => Ok((name, Some(value))),
                    _ => Err(self.error()),
                }
            }
            _ => Err(self.error()),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Document, NodeId, Vec<NodeId>) {
        // <div id=root><ul class=book><li class="level bid" data-side=buy><span/></li>
        //   <li class="level ask" data-side="sell"/></ul><p/></div>
        let doc = Document::new();
        let root = doc.create_element("div");
        doc.set_attr(root, "id", "root").unwrap();
        let ul = doc.create_element("ul");
        doc.set_attr(ul, "class", "book").unwrap();
        let bid = doc.create_element("li");
        doc.set_attr(bid, "class", "level bid").unwrap();
        doc.set_attr(bid, "data-side", "buy").unwrap();
        let span = doc.create_element("span");
        let ask = doc.create_element("li");
        doc.set_attr(ask, "class", "level ask").unwrap();
        doc.set_attr(ask, "data-side", "sell").unwrap();
        let p = doc.create_element("p");

        doc.append_child(root, ul).unwrap();
        doc.append_child(ul, bid).unwrap();
        doc.append_child(bid, span).unwrap();
        doc.append_child(ul, ask).unwrap();
        doc.append_child(root, p).unwrap();
        (doc, root, vec![ul, bid, span, ask, p])
    }

    fn query(doc: &Document, scope: NodeId, text: &str) -> Vec<NodeId> {
        doc.query_all(scope, &CssSelector::parse(text).unwrap())
    }

    #[test]
    fn test_simple_selectors() {
        let (doc, root, n) = fixture();
        assert_eq!(query(&doc, root, "li"), vec![n[1], n[3]]);
        assert_eq!(query(&doc, root, ".level.ask"), vec![n[3]]);
        assert_eq!(query(&doc, root, "[data-side]"), vec![n[1], n[3]]);
        assert_eq!(query(&doc, root, "[data-side=\"sell\"]"), vec![n[3]]);
        assert_eq!(query(&doc, root, "li[data-side=buy]"), vec![n[1]]);
        assert_eq!(query(&doc, doc.body(), "#root"), vec![]);
        assert_eq!(query(&doc, root, "*").len(), 5);
    }

    #[test]
    fn test_combinators_and_lists() {
        let (doc, root, n) = fixture();
        assert_eq!(query(&doc, root, "ul span"), vec![n[2]]);
        assert_eq!(query(&doc, root, "ul > span"), vec![]);
        assert_eq!(query(&doc, root, ".book > .bid > span"), vec![n[2]]);
        assert_eq!(query(&doc, root, "p, .ask"), vec![n[3], n[4]]);
    }

    #[test]
    fn test_invalid_selectors() {
        for bad in ["", "li >", "[data", ".", "li,", "a!b"] {
            assert!(CssSelector::parse(bad).is_err(), "{bad:?} should not parse");
        }
    }
}
