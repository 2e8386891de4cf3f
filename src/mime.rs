/// Placeholder shown for a message whose HTML body is empty.
pub const NO_CONTENT: &str = "(No content)";

/// Render a stored HTML body to sanitized plain text for display.
pub fn render_html_body(html: &str) -> String {
    if html.trim().is_empty() {
        return NO_CONTENT.to_string();
    }
    html_safe_md::render_email_plain(None, Some(html))
}

/// Render a stored HTML body as Markdown for a preview widget.
pub fn render_html_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return NO_CONTENT.to_string();
    }
    html_safe_md::render_email(None, Some(html))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_is_rendered_without_tags() {
        let result = render_html_body("<p>Hello</p>");
        assert!(result.contains("Hello"));
        assert!(!result.contains("<p>"));
    }

    #[test]
    fn empty_body_gets_placeholder() {
        assert_eq!(render_html_body(""), NO_CONTENT);
        assert_eq!(render_html_markdown("  \n"), NO_CONTENT);
    }

    #[test]
    fn markdown_keeps_content() {
        let result = render_html_markdown("<p>This is the <strong>real</strong> content.</p>");
        assert!(result.contains("real"));
        assert!(!result.contains("<strong>"));
    }
}
