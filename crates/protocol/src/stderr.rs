//! Decoding of the remote error stream.
//!
//! Script stderr may arrive wrapped in the shell's structured stream
//! format: a `#< ... >` header line followed by markup where error text
//! lives in `<S S="Error">...</S>` segments. Characters outside the
//! printable range are escaped as `_xHHHH_` (code point in hex). This
//! module unwraps all of that back to plain text for display.

/// Decodes raw stderr into plain text.
///
/// Plain (unwrapped) stderr passes through with only escape decoding.
pub fn decode_error_stream(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let body = match trimmed.strip_prefix("#<") {
        Some(_) => trimmed
            .split_once('\n')
            .map(|(_, rest)| rest)
            .unwrap_or(""),
        None => trimmed,
    };

    let text = if body.contains("<S S=\"Error\">") {
        extract_error_segments(body)
    } else {
        body.to_string()
    };

    unescape(&text).trim().to_string()
}

/// Collects the inner text of every `<S S="Error">...</S>` segment.
fn extract_error_segments(body: &str) -> String {
    const OPEN: &str = "<S S=\"Error\">";
    const CLOSE: &str = "</S>";

    let mut out = String::new();
    let mut rest = body;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(end) = after.find(CLOSE) else { break };
        out.push_str(&after[..end]);
        rest = &after[end + CLOSE.len()..];
    }
    out
}

/// Replaces `_xHHHH_` escapes with the character at code point `HHHH`.
///
/// Sequences that do not decode to a valid character are left verbatim.
fn unescape(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if let Some(c) = escape_at(text, i) {
            out.push(c);
            i += 7; // "_xHHHH_"
        } else {
            let c = text[i..].chars().next().unwrap();
            out.push(c);
            i += c.len_utf8();
        }
    }
    out
}

fn escape_at(text: &str, i: usize) -> Option<char> {
    let candidate = text.get(i..i + 7)?;
    let hex = candidate.strip_prefix("_x")?.strip_suffix('_')?;
    if hex.len() != 4 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(hex, 16).ok()?;
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_error_stream("Oh noes"), "Oh noes");
    }

    #[test]
    fn empty_input_stays_empty() {
        assert_eq!(decode_error_stream(""), "");
        assert_eq!(decode_error_stream("   \n"), "");
    }

    #[test]
    fn escapes_decode_to_characters() {
        assert_eq!(decode_error_stream("line1_x000A_line2"), "line1\nline2");
        assert_eq!(decode_error_stream("tab_x0009_here"), "tab\there");
    }

    #[test]
    fn invalid_escape_left_verbatim() {
        assert_eq!(decode_error_stream("_xZZZZ_ stays"), "_xZZZZ_ stays");
        assert_eq!(decode_error_stream("_x12_ stays"), "_x12_ stays");
    }

    #[test]
    fn wrapped_stream_is_unwrapped() {
        let raw = "#< CLIXML\n<Objs><S S=\"Error\">Access denied_x000A_</S><S S=\"Error\">at line 3</S></Objs>";
        assert_eq!(decode_error_stream(raw), "Access denied\nat line 3");
    }

    #[test]
    fn header_without_segments_yields_markup_text() {
        let raw = "#< CLIXML\nplain failure text";
        assert_eq!(decode_error_stream(raw), "plain failure text");
    }

    #[test]
    fn non_error_segments_ignored() {
        let raw = "#< CLIXML\n<S S=\"Info\">noise</S><S S=\"Error\">real</S>";
        assert_eq!(decode_error_stream(raw), "real");
    }
}
