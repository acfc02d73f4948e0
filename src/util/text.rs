use std::borrow::Cow;

/// Maximum description length in characters, truncation marker included.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// Marker appended when text is cut short.
pub const TRUNCATION_MARKER: &str = "...";

/// Turns a feed summary or post body into a plain-text description.
///
/// Pipeline: strip tags, decode entities, drop control characters, collapse
/// whitespace, then cap at [`MAX_DESCRIPTION_CHARS`].
///
/// # Examples
///
/// ```
/// use newsdigest::util::normalize_description;
///
/// let html = "<p>Rust &amp; <b>WebAssembly</b></p>\n\n<p>ship it</p>";
/// assert_eq!(normalize_description(html), "Rust & WebAssembly ship it");
/// ```
pub fn normalize_description(input: &str) -> String {
    let without_tags = strip_html_tags(input);
    let decoded = html_escape::decode_html_entities(&without_tags);
    let collapsed = collapse_whitespace(&strip_control_chars(&decoded));
    truncate_with_marker(&collapsed, MAX_DESCRIPTION_CHARS).into_owned()
}

/// Removes markup, keeping the text between tags.
///
/// Block-level boundaries become a space so adjacent paragraphs don't fuse.
/// `<script>` and `<style>` bodies are dropped entirely.
pub fn strip_html_tags(input: &str) -> Cow<'_, str> {
    if !input.contains('<') {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];

        // A '<' that never closes is literal text (e.g. "a < b")
        let Some(close) = after.find('>') else {
            out.push_str(after);
            rest = "";
            break;
        };

        let tag = after[1..close].trim_start_matches('/').to_ascii_lowercase();
        let name: String = tag
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();

        rest = &after[close + 1..];

        if (name == "script" || name == "style") && !after[1..].starts_with('/') {
            let end_tag = format!("</{name}");
            match find_ascii_case_insensitive(rest, &end_tag) {
                Some(end) => {
                    let tail = &rest[end..];
                    rest = tail.find('>').map_or("", |gt| &tail[gt + 1..]);
                }
                None => rest = "",
            }
        }

        out.push(' ');
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle.as_bytes()))
}

/// Drops control characters other than whitespace.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !is_stripped_control(*c)).collect())
}

fn is_stripped_control(c: char) -> bool {
    c.is_control() && !c.is_whitespace()
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Caps `s` at `max_chars` characters, counting the marker.
///
/// Counts `char`s, never bytes, so multi-byte text is never split mid-codepoint.
pub fn truncate_with_marker(s: &str, max_chars: usize) -> Cow<'_, str> {
    let Some((cut, _)) = s.char_indices().nth(max_chars) else {
        return Cow::Borrowed(s);
    };
    let marker_len = TRUNCATION_MARKER.chars().count();
    if max_chars <= marker_len {
        return Cow::Owned(s[..cut].to_string());
    }

    let keep = max_chars - marker_len;
    let end = s.char_indices().nth(keep).map_or(cut, |(i, _)| i);
    Cow::Owned(format!("{}{}", s[..end].trim_end(), TRUNCATION_MARKER))
}
