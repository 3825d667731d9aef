//! Whitespace canonicalization for selectors, at-rule preludes and values

/// What kind of CSS text is being normalized.
///
/// Each kind has its own set of punctuation around which whitespace carries
/// no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Selector,
    Prelude,
    Value,
}

impl TextKind {
    /// No space is kept after `c`
    fn tight_after(self, c: char) -> bool {
        match c {
            ',' | '(' => true,
            '>' | '+' | '~' => self == TextKind::Selector,
            ':' => self == TextKind::Prelude,
            '/' => self == TextKind::Value,
            _ => false,
        }
    }

    /// No space is kept before `c`
    fn tight_before(self, c: char) -> bool {
        match c {
            ',' | ')' => true,
            '>' | '+' | '~' => self == TextKind::Selector,
            ':' => self == TextKind::Prelude,
            '/' | '!' => self == TextKind::Value,
            _ => false,
        }
    }
}

/// Collapse insignificant whitespace.
///
/// Quoted strings are copied verbatim and an escaped character never counts
/// as punctuation, so `.a\+ .b` keeps its descendant combinator.
pub fn normalize(text: &str, kind: TextKind) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.trim().chars();
    let mut pending_space = false;
    // Last emitted character and whether it came from an escape sequence.
    let mut prev: Option<(char, bool)> = None;

    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        let escaped = c == '\\';
        if pending_space {
            let after_ok = prev.is_some_and(|(p, esc)| esc || !kind.tight_after(p));
            if after_ok && !kind.tight_before(c) {
                out.push(' ');
            }
            pending_space = false;
        }

        if escaped {
            out.push('\\');
            match chars.next() {
                Some(next) => {
                    out.push(next);
                    prev = Some((next, true));
                }
                None => prev = Some(('\\', true)),
            }
            continue;
        }

        out.push(c);
        prev = Some((c, false));

        if c == '"' || c == '\'' {
            while let Some(inner) = chars.next() {
                out.push(inner);
                if inner == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else if inner == c {
                    break;
                }
            }
            prev = Some((c, false));
        }
    }

    if kind == TextKind::Prelude {
        lowercase_at_keyword(&mut out);
    }
    out
}

/// `@MEDIA` and `@media` are the same rule
fn lowercase_at_keyword(prelude: &mut String) {
    let end = prelude
        .char_indices()
        .skip(1)
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '-'))
        .map(|(i, _)| i)
        .unwrap_or(prelude.len());
    let keyword = prelude[..end].to_ascii_lowercase();
    prelude.replace_range(..end, &keyword);
}
