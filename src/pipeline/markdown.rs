//! HTML to markdown conversion and the text cleanup applied to every block.

use htmd::options::{BulletListMarker, HeadingStyle, Options};
use htmd::{Element, HtmlToMarkdown};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::Result;

static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());

fn text_only(element: Element) -> Option<String> {
    Some(element.content.to_string())
}

/// Converts an HTML fragment to markdown with ATX headings and `-` bullets.
/// Tags in `strip` are rendered as their text content only.
pub fn html_to_markdown(html: &str, strip: &[String]) -> Result<String> {
    let mut builder = HtmlToMarkdown::builder()
        .options(Options {
            heading_style: HeadingStyle::Atx,
            bullet_list_marker: BulletListMarker::Dash,
            ..Default::default()
        })
        .skip_tags(vec!["script", "style"]);
    if !strip.is_empty() {
        builder = builder.add_handler(strip.iter().map(String::as_str).collect(), text_only);
    }
    Ok(builder.build().convert(html)?)
}

/// Applies `remove` in order, collapses runs of blank lines, right-trims every
/// line and terminates the text with one newline. Blank results become `None`.
pub fn clean_markdown(text: &str, remove: &[Regex]) -> Option<String> {
    let mut text = text.to_string();
    for pattern in remove {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let text = BLANK_RUN.replace_all(&text, "\n\n");
    let text = text
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(format!("{}\n", text))
    }
}
