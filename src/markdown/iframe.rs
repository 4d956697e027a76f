//! Post-processes rendered HTML, replacing fenced code blocks tagged as
//! video/midi/3d-model sources, or plain code/markdown blocks when their
//! category is enabled, with an `<iframe>` pointing at the embed service
//! (spec §4.5). Block content is base64-encoded (standard alphabet, not
//! URL-safe, per the resolved Open Question) into the iframe `src` query
//! string; a bare URL on its own line is passed through unencoded instead.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;

use crate::config::{IframeCategoryConfig, IframeEmbedConfig};

fn code_block_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?s)<pre><code class="language-([\w-]+)">(.*?)</code></pre>"#).unwrap()
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

fn category_for(lang: &str) -> Category {
    match lang {
        "video" => Category::Video,
        "midi" => Category::Midi,
        "3d" | "model3d" => Category::Model3d,
        "markdown" | "md" => Category::Markdown,
        "mermaid" => Category::None,
        _ => Category::Code,
    }
}

enum Category {
    Video,
    Midi,
    Model3d,
    Markdown,
    Code,
    None,
}

fn category_config<'a>(config: &'a IframeEmbedConfig, category: &Category) -> Option<&'a IframeCategoryConfig> {
    match category {
        Category::Video => Some(&config.video),
        Category::Midi => Some(&config.midi),
        Category::Model3d => Some(&config.model3d),
        Category::Markdown => Some(&config.markdown),
        Category::Code => Some(&config.code),
        Category::None => None,
    }
}

fn category_name(category: &Category) -> &'static str {
    match category {
        Category::Video => "video",
        Category::Midi => "midi",
        Category::Model3d => "model3d",
        Category::Markdown => "markdown",
        Category::Code => "code",
        Category::None => "",
    }
}

fn make_iframe(config: &IframeEmbedConfig, category_name: &str, source: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(source);
    format!(
        "<iframe class=\"embed embed-{category}\" src=\"{base}?type={category}&data={data}\" loading=\"lazy\"></iframe>",
        category = category_name,
        base = config.service_base_url,
        data = encoded,
    )
}

pub fn apply_embeds(html: &str, config: &IframeEmbedConfig) -> String {
    code_block_pattern()
        .replace_all(html, |caps: &regex::Captures| {
            let lang = caps.get(1).unwrap().as_str();
            let body_escaped = caps.get(2).unwrap().as_str();
            let whole = caps.get(0).unwrap().as_str();

            let category = category_for(lang);
            let Some(cat_config) = category_config(config, &category) else {
                return whole.to_string();
            };
            if !cat_config.enabled {
                return whole.to_string();
            }

            let source = html_unescape(body_escaped);
            let line_count = source.lines().count();
            if line_count < cat_config.min_lines {
                return whole.to_string();
            }
            if !cat_config.language_allowlist.is_empty()
                && !cat_config.language_allowlist.iter().any(|l| l == lang)
            {
                return whole.to_string();
            }

            make_iframe(config, category_name(&category), source.trim_end())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> IframeEmbedConfig {
        IframeEmbedConfig {
            code: IframeCategoryConfig {
                enabled: true,
                min_lines: 0,
                language_allowlist: Vec::new(),
            },
            ..IframeEmbedConfig::default()
        }
    }

    #[test]
    fn video_block_becomes_iframe_by_default() {
        let html = "<pre><code class=\"language-video\">https://example.com/clip.mp4</code></pre>";
        let out = apply_embeds(html, &IframeEmbedConfig::default());
        assert!(out.starts_with("<iframe class=\"embed embed-video\""));
    }

    #[test]
    fn code_block_untouched_when_category_disabled() {
        let html = "<pre><code class=\"language-rust\">fn main() {}</code></pre>";
        let out = apply_embeds(html, &IframeEmbedConfig::default());
        assert_eq!(out, html);
    }

    #[test]
    fn code_block_becomes_iframe_when_enabled() {
        let html = "<pre><code class=\"language-rust\">fn main() {}</code></pre>";
        let out = apply_embeds(html, &enabled_config());
        assert!(out.contains("embed-code"));
    }

    #[test]
    fn mermaid_block_is_never_touched_by_iframe_pass() {
        let html = "<pre><code class=\"language-mermaid\">graph TD;</code></pre>";
        let out = apply_embeds(html, &enabled_config());
        assert_eq!(out, html);
    }
}
