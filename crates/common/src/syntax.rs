//! Helpers for embedding fixture text in Rust source.
//!
//! Fixtures are written as indented raw strings; these strip the leading
//! newline and the common indentation so the file on disk looks like
//! hand-written source.

/// Dedent a CSS fixture
pub fn css(source: &str) -> String {
    dedent(source)
}

/// Dedent an HTML fixture
pub fn html(source: &str) -> String {
    dedent(source)
}

/// Dedent a JavaScript or TypeScript fixture
pub fn javascript(source: &str) -> String {
    dedent(source)
}

/// Remove the common leading whitespace of all non-blank lines
pub fn dedent(source: &str) -> String {
    let body = source.strip_prefix('\n').unwrap_or(source);
    let indent = body
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(body.len());
    for line in body.lines() {
        if line.trim().is_empty() {
            out.push('\n');
            continue;
        }
        out.push_str(line.get(indent..).unwrap_or_else(|| line.trim_start()));
        out.push('\n');
    }

    let trimmed = out.trim_end_matches(['\n', ' ']);
    format!("{}\n", trimmed)
}
