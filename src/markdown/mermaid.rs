//! Post-processes rendered HTML to apply the configured mermaid strategy
//! (spec §4.5) to any `<pre><code class="language-mermaid">` block emitted
//! by pulldown-cmark for a ```mermaid fenced code block.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;

use crate::config::MermaidStrategy;

fn mermaid_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<pre><code class="language-mermaid">(.*?)</code></pre>"#).unwrap()
    })
}

fn html_unescape(input: &str) -> String {
    input
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&gt;", ">")
        .replace("&lt;", "<")
        .replace("&amp;", "&")
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// A deterministic placeholder diagram: no JS engine runs client-side
/// mermaid rendering here, so `inline-svg`/`img-svg` emit a stable SVG
/// shell carrying the source as a data attribute for a client-side
/// renderer to pick up, rather than attempting to lay out the graph.
fn placeholder_svg(source: &str) -> String {
    format!(
        "<svg class=\"mermaid\" xmlns=\"http://www.w3.org/2000/svg\" data-mermaid-source=\"{}\"></svg>",
        base64::engine::general_purpose::STANDARD.encode(source)
    )
}

pub fn apply_strategy(html: &str, strategy: MermaidStrategy) -> String {
    mermaid_block_pattern()
        .replace_all(html, |caps: &regex::Captures| {
            let escaped_source = caps.get(1).unwrap().as_str();
            let source = html_unescape(escaped_source);
            match strategy {
                MermaidStrategy::InlineSvg => placeholder_svg(&source),
                MermaidStrategy::ImgSvg => {
                    let encoded_svg =
                        base64::engine::general_purpose::STANDARD.encode(placeholder_svg(&source));
                    format!(
                        "<img class=\"mermaid\" src=\"data:image/svg+xml;base64,{}\" alt=\"mermaid diagram\" />",
                        encoded_svg
                    )
                }
                MermaidStrategy::PreMermaid => {
                    format!("<pre class=\"mermaid\">{}</pre>", html_escape(&source))
                }
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_svg_strategy_emits_bare_svg_element() {
        let html = "<p>diagram</p><pre><code class=\"language-mermaid\">graph TD;\nA--&gt;B;\n</code></pre>";
        let out = apply_strategy(html, MermaidStrategy::InlineSvg);
        assert!(out.contains("<svg class=\"mermaid\""));
        assert!(!out.contains("<code"));
        assert!(!out.contains("<pre>"));
    }

    #[test]
    fn img_svg_strategy_emits_data_uri_image() {
        let html = "<pre><code class=\"language-mermaid\">graph TD;\n</code></pre>";
        let out = apply_strategy(html, MermaidStrategy::ImgSvg);
        assert!(out.starts_with("<img class=\"mermaid\" src=\"data:image/svg+xml;base64,"));
    }

    #[test]
    fn pre_mermaid_strategy_keeps_raw_source_without_code_wrapper() {
        let html = "<pre><code class=\"language-mermaid\">graph TD;\nA--&gt;B;\n</code></pre>";
        let out = apply_strategy(html, MermaidStrategy::PreMermaid);
        assert!(out.starts_with("<pre class=\"mermaid\">graph TD;"));
        assert!(!out.contains("<code"));
    }

    #[test]
    fn leaves_non_mermaid_code_blocks_untouched() {
        let html = "<pre><code class=\"language-rust\">fn main() {}</code></pre>";
        let out = apply_strategy(html, MermaidStrategy::PreMermaid);
        assert_eq!(out, html);
    }
}
