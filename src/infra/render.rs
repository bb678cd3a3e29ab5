//! Markdown rendering and the default page template.

use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::options::Options;
use comrak::{Arena, format_html, parse_document};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::application::content::{RenderError, Renderer, TemplateContext, TemplateEngine};

pub const DEFAULT_STYLE: &str = "default";
const KNOWN_STYLES: &[&str] = &[DEFAULT_STYLE, "classic", "futuristic"];
const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[month repr:long] [day padding:none], [year]");

/// GitHub-flavoured markdown through comrak, sanitized with ammonia.
pub struct ComrakRenderer {
    options: Options<'static>,
    sanitizer: AmmoniaBuilder<'static>,
}

impl Default for ComrakRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ComrakRenderer {
    pub fn new() -> Self {
        Self {
            options: default_options(),
            sanitizer: build_sanitizer(),
        }
    }
}

impl Renderer for ComrakRenderer {
    fn convert(&self, markdown: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, markdown, &self.options);
        let mut html = String::new();
        format_html(root, &self.options, &mut html).map_err(|err| RenderError {
            message: err.to_string(),
        })?;
        Ok(self.sanitizer.clean(&html).to_string())
    }
}

fn default_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.tagfilter = false;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.superscript = true;
    ext.footnotes = true;
    ext.description_lists = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.tasklist_classes = true;
    render.r#unsafe = true;

    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();
    builder.add_tags(&["input", "section", "sup", "sub", "dl", "dt", "dd"]);
    builder.generic_attributes(HashSet::from(["class", "id", "title", "lang"]));
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);
    builder.add_tag_attributes("code", &["class"]);
    builder.add_tag_attributes("pre", &["lang"]);
    builder.set_tag_attribute_value("a", "target", "_blank");
    builder
}

/// Wraps a post body in a minimal document carrying the author's style.
#[derive(Debug, Clone, Default)]
pub struct StyledTemplate;

impl StyledTemplate {
    /// Unknown style names fall back to [`DEFAULT_STYLE`].
    pub fn resolve_style(style: &str) -> &str {
        KNOWN_STYLES
            .iter()
            .copied()
            .find(|known| *known == style)
            .unwrap_or(DEFAULT_STYLE)
    }
}

impl TemplateEngine for StyledTemplate {
    fn apply(&self, html: &str, context: &TemplateContext<'_>) -> String {
        let style = Self::resolve_style(context.style);
        let owner = escape_text(context.owner);
        let display_name = escape_text(context.display_name);
        let date = context.date.format(DATE_FORMAT).unwrap_or_default();

        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
             <link rel=\"stylesheet\" href=\"/styles/{style}.css\">\n</head>\n\
             <body class=\"style-{style}\">\n<header class=\"byline\">\n\
             <span class=\"author\">{display_name}</span> \
             <a class=\"handle\" href=\"/{owner}\">@{owner}</a> \
             <time>{date}</time>\n</header>\n\
             <article class=\"content-container\">\n{html}\n</article>\n</body>\n</html>\n"
        )
    }
}

/// Escapes byline text for element and attribute positions, leaving spaces intact.
fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn renders_gfm_tables_and_strikethrough() {
        let html = ComrakRenderer::new()
            .convert("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~")
            .expect("render");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn strips_scripts_and_targets_links() {
        let html = ComrakRenderer::new()
            .convert("<script>alert(1)</script>\n\n[site](https://example.com)")
            .expect("render");
        assert!(!html.contains("<script>"));
        assert!(html.contains("target=\"_blank\""));
    }

    #[test]
    fn template_places_body_and_byline() {
        let page = StyledTemplate.apply(
            "<p>body</p>",
            &TemplateContext {
                style: "classic",
                owner: "alice",
                display_name: "Alice <A>",
                date: datetime!(2024-07-04 12:00 UTC),
            },
        );
        assert!(page.contains("<p>body</p>"));
        assert!(page.contains("/styles/classic.css"));
        assert!(page.contains("Alice &lt;A&gt;"));
        assert!(!page.contains("&#32;"));
        assert!(page.contains("July 4, 2024"));
    }

    #[test]
    fn byline_text_escapes_markup_but_keeps_spaces() {
        assert_eq!(escape_text("Alice Liddell"), "Alice Liddell");
        assert_eq!(
            escape_text("Tom & \"Jerry\" <b>'s</b>"),
            "Tom &amp; &quot;Jerry&quot; &lt;b&gt;&#39;s&lt;/b&gt;"
        );
    }

    #[test]
    fn unknown_style_falls_back_to_default() {
        assert_eq!(StyledTemplate::resolve_style("neon"), DEFAULT_STYLE);
        assert_eq!(StyledTemplate::resolve_style("futuristic"), "futuristic");
    }
}
