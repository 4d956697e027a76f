//! Raw-text transforms that run before the CommonMark parser sees a
//! document: wikilinks, Obsidian embeds, callouts, and inline/display math.
//! Fenced code blocks are left untouched so mermaid sources survive intact
//! for the post-render pass in [`super::mermaid`].

use regex::Regex;
use std::sync::OnceLock;

use super::ReferenceResolver;

pub enum Segment {
    Prose(String),
    Code(String),
}

/// Splits `raw` into alternating prose/fenced-code segments on lines that
/// open or close a ``` fence. Indentation before the fence marker is
/// tolerated; the fence lines themselves are kept with the code segment.
pub fn segment_by_fences(raw: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut in_code = false;
    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            if in_code {
                current.push_str(line);
                segments.push(Segment::Code(std::mem::take(&mut current)));
                in_code = false;
            } else {
                if !current.is_empty() {
                    segments.push(Segment::Prose(std::mem::take(&mut current)));
                }
                current.push_str(line);
                in_code = true;
            }
            continue;
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        if in_code {
            segments.push(Segment::Code(current));
        } else {
            segments.push(Segment::Prose(current));
        }
    }
    segments
}

fn embed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"!\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").unwrap())
}

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[([^\]|]+)(?:\|([^\]]+))?\]\]").unwrap())
}

fn callout_header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[!([a-zA-Z][\w-]*)\]\s*(.*)$").unwrap())
}

fn display_math_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)\$\$(.+?)\$\$").unwrap())
}

fn inline_math_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$([^\n$]+)\$").unwrap())
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Rewrites `![[media]]` embeds and `[[target]]`/`[[target|alias]]` wikilinks
/// into standard Markdown image/link syntax, resolved against the current
/// document's sibling notes and media (spec §4.5 three-pass resolution).
pub fn transform_links_and_embeds(prose: &str, resolver: &impl ReferenceResolver) -> String {
    let after_embeds = embed_pattern().replace_all(prose, |caps: &regex::Captures| {
        let target = caps.get(1).unwrap().as_str().trim();
        let alias = caps.get(2).map(|m| m.as_str().trim());
        match resolver.resolve_media(target) {
            Some(url) => format!("![{}]({})", alias.unwrap_or(target), url),
            None => {
                resolver.record_unresolved("media-embed", target);
                format!("![{}]()", alias.unwrap_or(target))
            }
        }
    });

    link_pattern()
        .replace_all(&after_embeds, |caps: &regex::Captures| {
            let target = caps.get(1).unwrap().as_str().trim();
            let alias = caps.get(2).map(|m| m.as_str().trim());
            let label = alias.unwrap_or(target);
            match resolver.resolve_note(target) {
                Some(url) => format!("[{}]({})", label, url),
                None => {
                    resolver.record_unresolved("wikilink", target);
                    if resolver.remove_dead_links() {
                        label.to_string()
                    } else {
                        format!("[{}](#)", label)
                    }
                }
            }
        })
        .into_owned()
}

/// Rewrites Obsidian callouts (`> [!type] Header?`) into a `<div>` block so
/// the renderer passes them through as raw HTML rather than a plain
/// blockquote.
pub fn transform_callouts(prose: &str) -> String {
    let mut out = String::with_capacity(prose.len());
    let mut lines = prose.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(rest) = line.trim_start().strip_prefix('>') else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        let Some(caps) = callout_header_pattern().captures(rest) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let kind = caps.get(1).unwrap().as_str().to_ascii_lowercase();
        let header = caps.get(2).unwrap().as_str().trim();

        let mut body_lines = Vec::new();
        while let Some(next) = lines.peek() {
            let Some(next_rest) = next.trim_start().strip_prefix('>') else {
                break;
            };
            let next_rest = next_rest.strip_prefix(' ').unwrap_or(next_rest);
            body_lines.push(next_rest.to_string());
            lines.next();
        }

        out.push_str(&format!("\n<div class=\"callout callout-{kind}\">\n"));
        if !header.is_empty() {
            out.push_str(&format!("<p class=\"callout-title\">{}</p>\n", html_escape(header)));
        }
        if !body_lines.is_empty() {
            out.push_str(&format!("\n{}\n", body_lines.join("\n")));
        }
        out.push_str("\n</div>\n\n");
    }
    out
}

/// Wraps `$$...$$` and `$...$` math spans in raw HTML containers that keep
/// the original delimiters intact for a client-side renderer (spec §4.5).
/// No-op when `parse_formulas` is disabled.
pub fn transform_math(prose: &str, parse_formulas: bool) -> String {
    if !parse_formulas {
        return prose.to_string();
    }

    let after_display = display_math_pattern().replace_all(prose, |caps: &regex::Captures| {
        let body = caps.get(1).unwrap().as_str();
        format!("\n<div class=\"math-display\">$${}$$</div>\n", html_escape(body))
    });

    inline_math_pattern()
        .replace_all(&after_display, |caps: &regex::Captures| {
            let body = caps.get(1).unwrap().as_str();
            format!("<span class=\"math-inline\">${}$</span>", html_escape(body))
        })
        .into_owned()
}
