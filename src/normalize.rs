//! Readable-text extraction from article markup.
//!
//! Favors recall over precision: the whole `<body>` is kept except for
//! non-content elements (scripts, styles, embedded frames), and link targets
//! are preserved inline as `text (href)` so the extractor can report
//! external links.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContentError {
    #[error("content does not look like markup")]
    NotMarkup,
    #[error("no readable text found")]
    Empty,
}

const SKIPPED: &[&str] = &[
    "script", "style", "noscript", "iframe", "svg", "template", "head",
];

const BLOCKS: &[&str] = &[
    "p", "div", "section", "article", "main", "header", "footer", "aside", "nav", "li", "ul",
    "ol", "table", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "figure",
    "figcaption", "dd", "dt",
];

/// Extract readable text from HTML.
pub fn extract_readable_text(raw: &str) -> Result<String, ContentError> {
    if !raw.contains('<') {
        return Err(ContentError::NotMarkup);
    }

    let document = Html::parse_document(raw);
    let root = Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
        .unwrap_or_else(|| document.root_element());

    let mut out = String::new();
    visit(root, &mut out, false);

    let text = collapse_whitespace(&out);
    if text.is_empty() {
        return Err(ContentError::Empty);
    }
    Ok(text)
}

/// Readable text when extraction succeeds, the raw input unchanged otherwise.
pub fn normalize_content(raw: &str) -> String {
    match extract_readable_text(raw) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(reason = %e, "using raw content");
            raw.to_string()
        }
    }
}

/// Only block boundaries and `<br>` break lines. Source newlines survive
/// inside `<pre>` alone.
fn visit(element: ElementRef<'_>, out: &mut String, preformatted: bool) {
    let name = element.value().name();
    if SKIPPED.contains(&name) {
        return;
    }
    let preformatted = preformatted || name == "pre";

    let block = BLOCKS.contains(&name);
    if block {
        out.push('\n');
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) if preformatted => out.push_str(text),
            Node::Text(text) => push_inline(out, text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    visit(child, out, preformatted);
                }
            }
            _ => {}
        }
    }

    match name {
        "a" => {
            if let Some(href) = element.value().attr("href").filter(|h| is_followable(h)) {
                out.push_str(" (");
                out.push_str(href.trim());
                out.push(')');
            }
        }
        "br" => out.push('\n'),
        "td" | "th" => out.push(' '),
        _ => {}
    }

    if block {
        out.push('\n');
    }
}

fn push_inline(out: &mut String, text: &str) {
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
}

fn is_followable(href: &str) -> bool {
    let href = href.trim();
    !(href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:"))
}

/// Collapse runs of whitespace within lines and drop blank lines.
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
