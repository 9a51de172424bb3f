//! Markdown to HTML rendering for release notes.

use pulldown_cmark::{html, Options, Parser};

/// Turns markdown release notes into HTML.
pub trait Renderer: Send + Sync {
    fn render(&self, markdown: &str) -> String;
}

/// GitHub-flavoured markdown via `pulldown-cmark`.
#[derive(Debug, Clone, Default)]
pub struct MarkdownRenderer;

impl Renderer for MarkdownRenderer {
    fn render(&self, markdown: &str) -> String {
        if markdown.trim().is_empty() {
            return String::new();
        }

        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_HEADING_ATTRIBUTES;
        let parser = Parser::new_ext(markdown, options);

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// Leaves the text untouched.
#[derive(Debug, Clone, Default)]
pub struct Passthrough;

impl Renderer for Passthrough {
    fn render(&self, markdown: &str) -> String {
        markdown.to_string()
    }
}
