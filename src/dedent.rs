//! Common-indentation removal so snippets copy-pasted with surrounding
//! indentation still parse.

/// Strip the longest leading-whitespace prefix shared by all non-blank lines.
/// Blank lines do not contribute to the margin and come out empty.
pub(crate) fn dedent(code: &str) -> String {
    let margin = code
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_whitespace)
        .reduce(common_prefix)
        .unwrap_or("");

    let mut out = String::with_capacity(code.len());
    for line in code.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(line.strip_prefix(margin).unwrap_or(line));
            out.push('\n');
        }
    }
    out
}

fn leading_whitespace(line: &str) -> &str {
    let end = line
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    &line[..end]
}

fn common_prefix<'a>(a: &'a str, b: &'a str) -> &'a str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, ca), cb)| ca == cb)
        .map(|((i, ca), _)| i + ca.len_utf8())
        .last()
        .unwrap_or(0);
    &a[..end]
}
