//! Evidence text sanitization
//!
//! Excerpts shown to humans must not leak usernames or URLs. The scanner
//! replaces `http(s)://...` runs with a placeholder, rewrites `u/name`
//! mentions, and collapses excessive blank lines. Meaning and tone are
//! preserved.

/// Produce a display-safe version of evidence text.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let t = text.trim();

    let mut chars = t.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        // URL runs.
        if c == 'h' && (t[i..].starts_with("http://") || t[i..].starts_with("https://")) {
            out.push_str("[link removed]");
            // Skip to the next whitespace.
            while let Some(&(_, nc)) = chars.peek() {
                if nc.is_whitespace() {
                    break;
                }
                chars.next();
            }
            continue;
        }

        // u/username mentions, only on a word boundary.
        if c == 'u' && t[i..].starts_with("u/") {
            let boundary_before = i == 0
                || !t[..i]
                    .chars()
                    .next_back()
                    .is_some_and(|p| p.is_alphanumeric());
            let after = &t[i + 2..];
            let name_len = after
                .chars()
                .take_while(|&nc| nc.is_alphanumeric() || nc == '_' || nc == '-')
                .count();
            if boundary_before && name_len > 0 {
                out.push_str("u/[user]");
                chars.next(); // consume '/'
                for _ in 0..name_len {
                    chars.next();
                }
                continue;
            }
        }

        out.push(c);
    }

    collapse_newlines(&out)
}

/// Collapse runs of three or more newlines into a paragraph break.
fn collapse_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newline_run = 0;
    for c in text.chars() {
        if c == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                out.push(c);
            }
        } else {
            newline_run = 0;
            out.push(c);
        }
    }
    out.trim().to_string()
}

/// Clip a string to at most `n` characters, appending an ellipsis when
/// something was cut.
pub fn clip(text: &str, n: usize) -> String {
    if text.chars().count() <= n {
        return text.to_string();
    }
    let mut out: String = text.chars().take(n.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_removed() {
        let s = sanitize_text("check this https://example.com/x?y=1 now");
        assert_eq!(s, "check this [link removed] now");
        let s = sanitize_text("plain http://a.b/c");
        assert_eq!(s, "plain [link removed]");
    }

    #[test]
    fn usernames_are_masked() {
        assert_eq!(
            sanitize_text("thanks u/runner_42 for the tip"),
            "thanks u/[user] for the tip"
        );
    }

    #[test]
    fn username_mask_requires_word_boundary() {
        assert_eq!(sanitize_text("in situ/context here"), "in situ/context here");
    }

    #[test]
    fn plain_text_passes_through() {
        let text = "Switched from Nike to Hoka, way more comfortable.";
        assert_eq!(sanitize_text(text), text);
    }

    #[test]
    fn excessive_newlines_collapse() {
        assert_eq!(sanitize_text("a\n\n\n\n\nb"), "a\n\nb");
    }

    #[test]
    fn clip_respects_char_budget() {
        assert_eq!(clip("short", 10), "short");
        let clipped = clip(&"x".repeat(500), 400);
        assert_eq!(clipped.chars().count(), 400);
        assert!(clipped.ends_with('…'));
    }
}
