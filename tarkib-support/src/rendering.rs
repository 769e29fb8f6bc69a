//! Text rendering utilities for human-friendly composition errors.
//!
//! Provides helpers to shorten fully qualified type names and to render
//! the "required by" chain that accompanies every fatal resolution error.

/// Shortens a fully qualified type name for display.
///
/// ```
/// use tarkib_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("my_app::services::user::UserService");
/// assert_eq!(short, "UserService");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>");
/// assert_eq!(short, "Arc<dyn Logger>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    // Take the last segment of each path component:
    // "my_app::services::UserService" → "UserService"
    // "Arc<dyn my_app::Logger>" → "Arc<dyn Logger>"
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next(); // consume second ':'
                current_segment.clear(); // discard path prefix
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => {
                current_segment.push(ch);
            }
        }
    }

    result.push_str(&current_segment);
    result
}

/// Renders the dependency chain that led to a composition failure.
///
/// Each frame is a `(site, part)` pair and becomes one line reading
/// ` -> required by import '<site>' of part '<part>'`. When the chain
/// bottoms out at a top-level request, `initial_request` names the
/// contract and contributes the final
/// ` -> required by initial request for contract '<contract>'` line.
///
/// The returned string starts with a newline when non-empty, so it can be
/// appended directly after the primary cause. No trailing period is added;
/// the caller terminates the full message.
pub fn render_required_by_chain(frames: &[(String, String)], initial_request: Option<&str>) -> String {
    let mut out = String::new();

    for (site, part) in frames {
        out.push_str(&format!("\n -> required by import '{site}' of part '{part}'"));
    }

    if let Some(contract) = initial_request {
        out.push_str(&format!("\n -> required by initial request for contract '{contract}'"));
    }

    out
}

/// Renders a list of part origins for cardinality errors: `'A', 'B'`.
///
/// The caller is expected to pass the origins in a deterministic order.
pub fn render_origin_list(origins: &[impl AsRef<str>]) -> String {
    origins
        .iter()
        .map(|o| format!("'{}'", o.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shorten_simple_path() {
        assert_eq!(
            shorten_type_name("my_app::services::UserService"),
            "UserService"
        );
    }

    #[test]
    fn shorten_with_generics() {
        assert_eq!(
            shorten_type_name("alloc::sync::Arc<dyn my_app::traits::Logger>"),
            "Arc<dyn Logger>"
        );
    }

    #[test]
    fn shorten_no_path() {
        assert_eq!(shorten_type_name("String"), "String");
    }

    #[test]
    fn shorten_tuple() {
        assert_eq!(
            shorten_type_name("(alloc::string::String, core::primitive::u32)"),
            "(String, u32)"
        );
    }

    #[test]
    fn empty_chain_renders_empty() {
        assert_eq!(render_required_by_chain(&[], None), "");
    }

    #[test]
    fn chain_without_frames_still_names_initial_request() {
        assert_eq!(
            render_required_by_chain(&[], Some("Widget")),
            "\n -> required by initial request for contract 'Widget'"
        );
    }

    #[test]
    fn chain_renders_one_line_per_frame() {
        let frames = vec![
            ("logger".to_string(), "Service".to_string()),
            ("service".to_string(), "App".to_string()),
        ];
        let chain = render_required_by_chain(&frames, Some("App"));
        assert_eq!(
            chain,
            "\n -> required by import 'logger' of part 'Service'\
             \n -> required by import 'service' of part 'App'\
             \n -> required by initial request for contract 'App'"
        );
    }

    #[test]
    fn origin_list() {
        assert_eq!(render_origin_list(&["A", "B"]), "'A', 'B'");
        assert_eq!(render_origin_list(&["Solo"]), "'Solo'");
    }
}
