//! Structural CSS parser.
//!
//! Produces a flat map from (at-rule context, selector) to declarations.
//! This is deliberately not a full CSS parser: it understands blocks,
//! declarations, strings, escapes and comments, which is all a comparison of
//! generated stylesheets needs.

use std::collections::BTreeMap;

use super::normalize::{normalize, TextKind};
use super::shorthand::fold_box_shorthands;
use super::{Declarations, RuleKey, Stylesheet};
use crate::error::{Error, Result};

pub(super) fn parse(source: &str) -> Result<Stylesheet> {
    let stripped = strip_comments(source)?;
    let mut parser = Parser {
        src: &stripped,
        pos: 0,
        rules: BTreeMap::new(),
    };
    parser.parse_items(&[], &[], 0)?;

    let mut rules = parser.rules;
    for declarations in rules.values_mut() {
        fold_box_shorthands(declarations);
    }
    Ok(Stylesheet { rules })
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    rules: BTreeMap<RuleKey, Declarations>,
}

impl<'a> Parser<'a> {
    /// Parse block items until the matching `}` (or end of input at depth 0).
    ///
    /// `owners` are the selectors receiving declarations found directly in
    /// this block; at the top level it is empty.
    fn parse_items(&mut self, context: &[String], owners: &[String], depth: usize) -> Result<()> {
        let src = self.src;
        loop {
            self.skip_whitespace();
            match self.peek() {
                None if depth > 0 => return Err(Error::css(self.pos, "unclosed block")),
                None => return Ok(()),
                Some(b'}') if depth == 0 => return Err(Error::css(self.pos, "unexpected `}`")),
                Some(b'}') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b';') => {
                    self.pos += 1;
                    continue;
                }
                Some(_) => {}
            }

            let start = self.pos;
            let (end, stop) = scan(src, start, b"{;}")?;
            let prelude = src[start..end].trim();

            if stop == Some(b'{') {
                self.pos = end + 1;
                if prelude.starts_with('@') {
                    let mut nested = context.to_vec();
                    nested.push(normalize(prelude, TextKind::Prelude));
                    // A conditional rule inside a style rule still styles the parent.
                    let inner = if is_conditional_group(prelude) && owners.iter().any(|o| !o.is_empty()) {
                        owners.to_vec()
                    } else {
                        vec![String::new()]
                    };
                    self.parse_items(&nested, &inner, depth + 1)?;
                } else {
                    let selectors = nest_selectors(owners, &split_selectors(prelude));
                    if selectors.is_empty() {
                        return Err(Error::css(start, "rule without selector"));
                    }
                    for selector in &selectors {
                        self.rules
                            .entry(RuleKey::new(context.to_vec(), selector.clone()))
                            .or_default();
                    }
                    self.parse_items(context, &selectors, depth + 1)?;
                }
                continue;
            }

            // Statement: `;` is consumed, `}` is left for the loop.
            self.pos = if stop == Some(b';') { end + 1 } else { end };
            if prelude.is_empty() || prelude.starts_with('@') {
                continue;
            }
            if owners.is_empty() {
                return Err(Error::css(start, "declaration outside of a rule"));
            }
            self.declare(context, owners, prelude, start)?;
        }
    }

    fn declare(&mut self, context: &[String], owners: &[String], text: &str, offset: usize) -> Result<()> {
        let (colon, stop) = scan(text, 0, b":")?;
        if stop.is_none() {
            return Err(Error::css(offset, format!("declaration without `:`: {}", text)));
        }

        let raw_name = text[..colon].trim();
        if raw_name.is_empty() {
            return Err(Error::css(offset, "declaration without property name"));
        }
        // Custom properties are case-sensitive.
        let name = if raw_name.starts_with("--") {
            raw_name.to_string()
        } else {
            raw_name.to_ascii_lowercase()
        };
        let value = normalize(&text[colon + 1..], TextKind::Value);

        for owner in owners {
            self.rules
                .entry(RuleKey::new(context.to_vec(), owner.clone()))
                .or_default()
                .insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }
}

/// Find the first top-level byte out of `stops`, skipping strings, escapes
/// and parenthesized groups. Braces stop the scan at any nesting depth.
fn scan(src: &str, from: usize, stops: &[u8]) -> Result<(usize, Option<u8>)> {
    let bytes = src.as_bytes();
    let mut i = from;
    let mut depth = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b'\\' => {
                i += 2;
                continue;
            }
            b'"' | b'\'' => {
                i = skip_string(bytes, i)?;
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if stops.contains(&b) && (depth == 0 || b == b'{' || b == b'}') {
            return Ok((i, Some(b)));
        }
        i += 1;
    }
    Ok((bytes.len(), None))
}

/// Index just past the string starting at `start`
fn skip_string(bytes: &[u8], start: usize) -> Result<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err(Error::css(start, "unterminated string"))
}

/// Replace every comment with a single space
fn strip_comments(src: &str) -> Result<String> {
    let bytes = src.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let close = src[i + 2..]
                    .find("*/")
                    .ok_or_else(|| Error::css(i, "unterminated comment"))?;
                out.push(b' ');
                i += 2 + close + 2;
            }
            b'"' | b'\'' => {
                let end = skip_string(bytes, i)?.min(bytes.len());
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b'\\' => {
                let end = (i + 2).min(bytes.len());
                out.extend_from_slice(&bytes[i..end]);
                i = end;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).map_err(|e| Error::css(e.utf8_error().valid_up_to(), "invalid UTF-8 after comment removal"))
}

/// `@media`, `@supports`, `@container` and `@layer` wrap rules without
/// starting a new declaration target
fn is_conditional_group(prelude: &str) -> bool {
    let keyword = prelude[1..]
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    ["media", "supports", "container", "layer"]
        .iter()
        .any(|k| keyword.eq_ignore_ascii_case(k))
}

/// Split a selector list on top-level commas
fn split_selectors(prelude: &str) -> Vec<String> {
    let mut selectors = Vec::new();
    let mut rest = prelude;
    loop {
        let (comma, stop) = match scan(rest, 0, b",") {
            Ok(found) => found,
            Err(_) => (rest.len(), None),
        };
        let part = normalize(&rest[..comma], TextKind::Selector);
        if !part.is_empty() {
            selectors.push(part);
        }
        if stop.is_none() {
            return selectors;
        }
        rest = &rest[comma + 1..];
    }
}

/// Resolve nested selectors against their parent rule
fn nest_selectors(parents: &[String], children: &[String]) -> Vec<String> {
    let parents: Vec<&String> = parents.iter().filter(|p| !p.is_empty()).collect();
    if parents.is_empty() {
        return children.to_vec();
    }

    let mut out = Vec::with_capacity(parents.len() * children.len());
    for parent in parents {
        for child in children {
            if child.contains('&') {
                out.push(child.replace('&', parent));
            } else {
                out.push(format!("{} {}", parent, child));
            }
        }
    }
    out
}
