//! Transit-safe encoding of session-description bodies.
//!
//! ICE credentials are the only SDP values the signaling path damages:
//! query encoding collapses or strips the whitespace that may surround or
//! split them. On those lines a space becomes `~` and a tab becomes `^`;
//! no other whitespace is touched (`\r` and `\n` stay line structure).
//! Sentinels already present on such a line, and the `!` escape itself,
//! are written as `!~`, `!^` and `!!` so the mapping stays reversible.
//! Every other line is left alone.

const ICE_ATTRIBUTES: [&str; 2] = ["a=ice-pwd:", "a=ice-ufrag:"];

const SPACE_SENTINEL: char = '~';
const TAB_SENTINEL: char = '^';
const ESCAPE: char = '!';

/// Replaces spaces and tabs on ICE credential lines with sentinels.
pub fn sanitize(text: &str) -> String {
    map_ice_lines(text, |line, out| {
        for c in line.chars() {
            match c {
                ' ' => out.push(SPACE_SENTINEL),
                '\t' => out.push(TAB_SENTINEL),
                SPACE_SENTINEL | TAB_SENTINEL | ESCAPE => {
                    out.push(ESCAPE);
                    out.push(c);
                }
                other => out.push(other),
            }
        }
    })
}

/// Exact inverse of [`sanitize`]. An unknown escape pair or a trailing `!`
/// is kept as written.
pub fn desanitize(text: &str) -> String {
    map_ice_lines(text, |line, out| {
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                ESCAPE => match chars.peek().copied() {
                    Some(next @ (SPACE_SENTINEL | TAB_SENTINEL | ESCAPE)) => {
                        chars.next();
                        out.push(next);
                    }
                    _ => out.push(ESCAPE),
                },
                SPACE_SENTINEL => out.push(' '),
                TAB_SENTINEL => out.push('\t'),
                other => out.push(other),
            }
        }
    })
}

fn is_ice_line(line: &str) -> bool {
    ICE_ATTRIBUTES.iter().any(|attr| line.contains(attr))
}

fn map_ice_lines(text: &str, map: impl Fn(&str, &mut String)) -> String {
    let mut out = String::with_capacity(text.len());
    for segment in text.split_inclusive('\n') {
        let (body, terminator) = split_terminator(segment);
        if is_ice_line(body) {
            map(body, &mut out);
        } else {
            out.push_str(body);
        }
        out.push_str(terminator);
    }
    out
}

fn split_terminator(segment: &str) -> (&str, &str) {
    if let Some(body) = segment.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = segment.strip_suffix('\n') {
        (body, "\n")
    } else {
        (segment, "")
    }
}
