//! Drives pulldown-cmark over a preprocessed document body, assigning
//! heading ids, collecting the table of contents, plaintext, word count,
//! first paragraph/image, and outgoing links, then hands the HTML to the
//! mermaid and iframe-embed post-processing passes.

use std::collections::HashSet;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd, html};

use super::slug::slugify;
use super::types::TocEntry;
use crate::config::MarkdownConfig;

pub struct RenderedBody {
    pub html: String,
    pub plaintext: String,
    pub first_paragraph_text: Option<String>,
    pub first_image: Option<String>,
    pub word_count: u32,
    pub toc: Vec<TocEntry>,
}

fn parser_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
}

pub fn render_body(body: &str, config: &MarkdownConfig) -> RenderedBody {
    let mut events: Vec<Event> = Parser::new_ext(body, parser_options()).collect();

    let mut toc = Vec::new();
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut plaintext = String::new();
    let mut first_paragraph_text: Option<String> = None;
    let mut first_image: Option<String> = None;

    let mut heading_depth: Option<u8> = None;
    let mut heading_text = String::new();
    let mut in_first_paragraph = false;
    let mut paragraph_text = String::new();
    let mut seen_first_paragraph = false;
    let mut heading_ids: Vec<String> = Vec::new();

    for event in &events {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                heading_depth = Some(heading_level_to_u8(*level));
                heading_text.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(depth) = heading_depth.take() {
                    let id = unique_id(&slugify(&heading_text), &mut used_ids);
                    toc.push(TocEntry {
                        id: id.clone(),
                        title: heading_text.clone(),
                        depth,
                    });
                    heading_ids.push(id);
                }
            }
            Event::Start(Tag::Paragraph) => {
                if !seen_first_paragraph {
                    in_first_paragraph = true;
                    paragraph_text.clear();
                }
            }
            Event::End(TagEnd::Paragraph) => {
                if in_first_paragraph {
                    first_paragraph_text = Some(paragraph_text.trim().to_string());
                    seen_first_paragraph = true;
                    in_first_paragraph = false;
                }
            }
            Event::Start(Tag::Image { dest_url, .. }) => {
                if first_image.is_none() {
                    first_image = Some(dest_url.to_string());
                }
            }
            Event::Text(text) => {
                if heading_depth.is_some() {
                    heading_text.push_str(text);
                }
                if in_first_paragraph {
                    paragraph_text.push_str(text);
                }
                plaintext.push_str(text);
                plaintext.push(' ');
            }
            Event::Code(text) => {
                plaintext.push_str(text);
                plaintext.push(' ');
            }
            _ => {}
        }
    }

    let word_count = plaintext.split_whitespace().count() as u32;

    // Second pass: assign the computed ids back onto heading start events.
    let mut heading_iter = heading_ids.into_iter();
    for event in events.iter_mut() {
        if let Event::Start(Tag::Heading { id, .. }) = event {
            if let Some(next_id) = heading_iter.next() {
                *id = Some(next_id.into());
            }
        }
    }

    let mut html_out = String::new();
    html::push_html(&mut html_out, events.into_iter());

    let html_out = super::mermaid::apply_strategy(&html_out, config.mermaid_strategy);
    let html_out = super::iframe::apply_embeds(&html_out, &config.iframe_embeds);

    RenderedBody {
        html: html_out,
        plaintext: plaintext.trim().to_string(),
        first_paragraph_text,
        first_image,
        word_count,
        toc,
    }
}

fn heading_level_to_u8(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn unique_id(candidate: &str, used: &mut HashSet<String>) -> String {
    let base = if candidate.is_empty() { "section".to_string() } else { candidate.to_string() };
    let mut id = base.clone();
    let mut suffix = 2;
    while !used.insert(id.clone()) {
        id = format!("{base}-{suffix}");
        suffix += 1;
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_config() -> MarkdownConfig {
        MarkdownConfig::default()
    }

    #[test]
    fn extracts_toc_with_unique_ids() {
        let body = "# Intro\n\ntext\n\n## Intro\n\nmore text\n";
        let rendered = render_body(body, &default_config());
        assert_eq!(rendered.toc.len(), 2);
        assert_eq!(rendered.toc[0].id, "intro");
        assert_eq!(rendered.toc[1].id, "intro-2");
    }

    #[test]
    fn captures_first_paragraph_and_image() {
        let body = "![alt](pic.png)\n\nFirst paragraph text.\n\nSecond paragraph.\n";
        let rendered = render_body(body, &default_config());
        assert_eq!(rendered.first_image.as_deref(), Some("pic.png"));
        assert_eq!(rendered.first_paragraph_text.as_deref(), Some("alt"));
    }

    #[test]
    fn word_count_counts_plaintext_words() {
        let body = "one two three\n";
        let rendered = render_body(body, &default_config());
        assert_eq!(rendered.word_count, 3);
    }
}
