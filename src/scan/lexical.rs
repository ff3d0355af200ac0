//! Literal-aware helpers over JVM source text.
//!
//! All offsets are byte offsets into the text they were computed from;
//! [`strip_comments`] preserves offsets so later passes can report them.

/// Blank out `//` and `/* */` comments, keeping newlines and byte offsets.
pub(super) fn strip_comments(src: &str) -> String {
    #[derive(PartialEq)]
    enum State {
        Code,
        Str,
        Char,
        Line,
        Block
    }
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut state = State::Code;
    let mut chars = src.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = bytes.get(i + 1).copied();
        match state {
            State::Code => match (c, next) {
                ('/', Some(b'/')) => {
                    state = State::Line;
                    out.push(' ');
                }
                ('/', Some(b'*')) => {
                    state = State::Block;
                    out.push(' ');
                    chars.next();
                    out.push(' ');
                }
                ('"', _) => {
                    state = State::Str;
                    out.push(c);
                }
                ('\'', _) => {
                    state = State::Char;
                    out.push(c);
                }
                _ => out.push(c)
            },
            State::Str | State::Char => {
                out.push(c);
                if c == '\\' {
                    if let Some((_, escaped)) = chars.next() {
                        out.push(escaped);
                    }
                } else if (c == '"' && state == State::Str) || (c == '\'' && state == State::Char) {
                    state = State::Code;
                }
            }
            State::Line => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    blank(&mut out, c);
                }
            }
            State::Block => {
                if c == '*' && next == Some(b'/') {
                    state = State::Code;
                    out.push(' ');
                    chars.next();
                    out.push(' ');
                } else if c == '\n' {
                    out.push('\n');
                } else {
                    blank(&mut out, c);
                }
            }
        }
    }
    out
}

/// Replace a character by as many spaces as it has bytes.
fn blank(out: &mut String, c: char) {
    for _ in 0..c.len_utf8() {
        out.push(' ');
    }
}

/// Walk `src` from `start`, calling `visit` with every byte offset and
/// character outside string and char literals. Stops when `visit` returns
/// `true`, yielding that offset.
fn scan_code(src: &str, start: usize, mut visit: impl FnMut(usize, char) -> bool) -> Option<usize> {
    let mut in_literal: Option<char> = None;
    let mut escaped = false;
    for (offset, c) in src.get(start..)?.char_indices() {
        let at = start + offset;
        if let Some(quote) = in_literal {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_literal = None;
            }
            continue;
        }
        if c == '"' || c == '\'' {
            in_literal = Some(c);
            continue;
        }
        if visit(at, c) {
            return Some(at);
        }
    }
    None
}

/// Offset of the bracket closing the one at `open` (`(`, `{` or `[`).
pub(super) fn matching_close(src: &str, open: usize) -> Option<usize> {
    let opener = src[open..].chars().next()?;
    let closer = match opener {
        '(' => ')',
        '{' => '}',
        '[' => ']',
        _ => return None
    };
    let mut depth = 0usize;
    scan_code(src, open, |_, c| {
        if c == opener {
            depth += 1;
        } else if c == closer {
            depth -= 1;
            return depth == 0;
        }
        false
    })
}

/// Offset of the `;` ending the statement that starts at `start`.
pub(super) fn statement_end(src: &str, start: usize) -> Option<usize> {
    let mut depth = 0i32;
    scan_code(src, start, |_, c| {
        match c {
            '(' | '{' | '[' => depth += 1,
            ')' | '}' | ']' => depth -= 1,
            ';' if depth <= 0 => return true,
            _ => {}
        }
        false
    })
}

/// Split `expr` on `delimiter` at bracket depth zero, outside literals.
pub(super) fn split_top_level(expr: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut last = 0;
    scan_code(expr, 0, |at, c| {
        match c {
            '(' | '{' | '[' | '<' if c != '<' || delimiter == ',' => depth += 1,
            ')' | '}' | ']' | '>' if c != '>' || delimiter == ',' => depth -= 1,
            _ if c == delimiter && depth == 0 => {
                parts.push(expr[last..at].trim());
                last = at + c.len_utf8();
            }
            _ => {}
        }
        false
    });
    parts.push(expr[last..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Decode a double-quoted string literal, quotes included.
pub(super) fn string_literal(token: &str) -> Option<String> {
    let inner = token.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            other => out.push(other)
        }
    }
    Some(out)
}
