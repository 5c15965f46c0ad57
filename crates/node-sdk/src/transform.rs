//! HTML to Markdown conversion.
//!
//! The conversion itself is a collaborator boundary: hosts may plug their
//! own [`HtmlTransformer`]. The built-in [`MarkdownTransformer`] is a
//! single-pass tag walker, not a DOM parser. It emits ATX headings, fenced
//! code blocks, and `*` bullets; it skips script/style/noscript/svg
//! content, decodes the common entities, and collapses whitespace outside
//! code fences. Good enough for harvest artifacts and cheap enough to run
//! on every task.

use std::sync::Arc;

/// Pluggable HTML-to-Markdown boundary.
pub trait HtmlTransformer: Send + Sync {
    fn transform(&self, html: &str) -> String;
}

impl<T: HtmlTransformer + ?Sized> HtmlTransformer for Arc<T> {
    fn transform(&self, html: &str) -> String {
        (**self).transform(html)
    }
}

/// Built-in single-pass converter.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownTransformer;

impl HtmlTransformer for MarkdownTransformer {
    fn transform(&self, html: &str) -> String {
        let raw = walk(html);
        let decoded = decode_entities(&raw);
        collapse_whitespace(&decoded)
    }
}

fn walk(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 2);
    let mut tag_buf = String::new();
    let mut in_tag = false;
    let mut skip_depth = 0usize; // script/style/noscript/svg nesting
    let mut in_pre = false;
    let mut link_hrefs: Vec<String> = Vec::new();
    let mut list_ordered: Vec<bool> = Vec::new();

    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag_buf.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                handle_tag(
                    &tag_buf,
                    &mut out,
                    &mut skip_depth,
                    &mut in_pre,
                    &mut link_hrefs,
                    &mut list_ordered,
                );
                tag_buf.clear();
            }
            _ if in_tag => tag_buf.push(ch),
            _ if skip_depth > 0 => {}
            _ => out.push(ch),
        }
    }

    out
}

fn handle_tag(
    tag_buf: &str,
    out: &mut String,
    skip_depth: &mut usize,
    in_pre: &mut bool,
    link_hrefs: &mut Vec<String>,
    list_ordered: &mut Vec<bool>,
) {
    let tag_lower = tag_buf.to_ascii_lowercase();
    let closing = tag_lower.starts_with('/');
    let name = tag_lower
        .trim_start_matches('/')
        .split([' ', '\t', '\n', '/'])
        .next()
        .unwrap_or("");

    // Content-free subtrees.
    if matches!(name, "script" | "style" | "noscript" | "svg") {
        if closing {
            *skip_depth = skip_depth.saturating_sub(1);
        } else if !tag_lower.ends_with('/') {
            *skip_depth += 1;
        }
        return;
    }
    if *skip_depth > 0 {
        return;
    }

    match (name, closing) {
        ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", false) => {
            ensure_blank_line(out);
            let level = name[1..].parse::<usize>().unwrap_or(1);
            out.push_str(&"#".repeat(level));
            out.push(' ');
        }
        ("h1" | "h2" | "h3" | "h4" | "h5" | "h6", true) => ensure_blank_line(out),

        ("p" | "div" | "article" | "section" | "header" | "footer" | "blockquote" | "tr", true) => {
            ensure_newline(out);
        }
        ("br", _) => out.push('\n'),

        ("ul", false) => list_ordered.push(false),
        ("ol", false) => list_ordered.push(true),
        ("ul" | "ol", true) => {
            list_ordered.pop();
            ensure_newline(out);
        }
        ("li", false) => {
            ensure_newline(out);
            out.push_str(if list_ordered.last().copied().unwrap_or(false) {
                "1. "
            } else {
                "* "
            });
        }
        ("li", true) => ensure_newline(out),

        ("pre", false) => {
            ensure_newline(out);
            out.push_str("```\n");
            *in_pre = true;
        }
        ("pre", true) => {
            ensure_newline(out);
            out.push_str("```\n");
            *in_pre = false;
        }
        ("code", _) if !*in_pre => out.push('`'),

        ("strong" | "b", _) => out.push_str("**"),
        ("em" | "i", _) => out.push('*'),

        ("a", false) => {
            if let Some(href) = extract_attr(tag_buf, "href") {
                link_hrefs.push(href);
                out.push('[');
            }
        }
        ("a", true) => {
            if let Some(href) = link_hrefs.pop() {
                out.push_str("](");
                out.push_str(&href);
                out.push(')');
            }
        }

        ("img", false) => {
            let alt = extract_attr(tag_buf, "alt").unwrap_or_default();
            if let Some(src) = extract_attr(tag_buf, "src") {
                out.push_str(&format!("![{alt}]({src})"));
            }
        }

        _ => {}
    }
}

fn ensure_newline(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn ensure_blank_line(out: &mut String) {
    if out.is_empty() {
        return;
    }
    while !out.ends_with("\n\n") {
        out.push('\n');
    }
}

/// Pull an attribute value out of a raw tag, preserving its case. ASCII
/// lowercasing keeps byte offsets aligned with the original.
fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    for quote in ['"', '\''] {
        let needle = format!("{attr}={quote}");
        if let Some(start) = lower.find(&needle) {
            let rest = &tag[start + needle.len()..];
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].to_string());
            }
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Collapse runs of whitespace outside code fences; keep fence content
/// verbatim.
fn collapse_whitespace(text: &str) -> String {
    let mut result = String::new();
    let mut prev_blank = false;
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            result.push_str(line.trim_start());
            result.push('\n');
            prev_blank = false;
            continue;
        }
        if in_fence {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !prev_blank {
                result.push('\n');
                prev_blank = true;
            }
        } else {
            result.push_str(&collapsed);
            result.push('\n');
            prev_blank = false;
        }
    }

    result.trim().to_string()
}
