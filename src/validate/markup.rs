//! Lenient HTML balance check.
//!
//! Not a parser: it only confirms that non-void elements open and close in
//! nesting order, so that splicing a fragment into a page cannot swallow or
//! orphan the surrounding markup. Elements whose end tag HTML allows to be
//! omitted are closed implicitly.

use regex::Regex;
use std::sync::LazyLock;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|<(/?)([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#,
    )
    .unwrap()
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const OPTIONAL_END: &[&str] = &[
    "html", "head", "body", "p", "li", "dt", "dd", "tr", "td", "th", "thead", "tbody", "tfoot",
    "option", "optgroup", "colgroup", "caption", "rb", "rt", "rp", "rtc",
];

const RAW_TEXT: &[&str] = &["script", "style", "textarea", "title"];

/// Check that `html` is balanced; returns a reason on failure.
pub fn check_balanced(html: &str) -> Result<(), String> {
    let mut stack: Vec<String> = Vec::new();
    let mut raw_text: Option<String> = None;

    for caps in TOKEN_REGEX.captures_iter(html) {
        let Some(name) = caps.get(2) else { continue };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());

        if let Some(raw) = &raw_text {
            if closing && *raw == name {
                raw_text = None;
                stack.pop();
            }
            continue;
        }

        let self_closing = caps
            .get(3)
            .is_some_and(|m| m.as_str().trim_end().ends_with('/'));
        if VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }

        if !closing {
            if self_closing {
                continue;
            }
            if RAW_TEXT.contains(&name.as_str()) {
                raw_text = Some(name.clone());
            }
            stack.push(name);
            continue;
        }

        match stack.iter().rposition(|open| *open == name) {
            Some(index) => {
                if let Some(blocking) = stack[index + 1..]
                    .iter()
                    .find(|open| !OPTIONAL_END.contains(&open.as_str()))
                {
                    return Err(format!("</{}> closes <{}> before <{}> is closed", name, name, blocking));
                }
                stack.truncate(index);
            }
            None if OPTIONAL_END.contains(&name.as_str()) => {}
            None => return Err(format!("</{}> has no matching opening tag", name)),
        }
    }

    if let Some(raw) = raw_text {
        return Err(format!("<{}> is never closed", raw));
    }
    match stack.iter().find(|open| !OPTIONAL_END.contains(&open.as_str())) {
        Some(open) => Err(format!("<{}> is never closed", open)),
        None => Ok(()),
    }
}
