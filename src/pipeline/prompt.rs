use askama::Template;

use crate::error::Result;
use crate::types::{ContentBlock, ExtractionMode};

#[derive(Template)]
#[template(path = "extraction_system.txt", escape = "none")]
struct SystemPrompt {
    current_year: i32,
    multiple: bool,
}

struct PromptBlock<'a> {
    relevant: &'a str,
    irrelevant: &'a str,
    content: &'a str,
}

#[derive(Template)]
#[template(path = "extraction_user.txt", escape = "none")]
struct UserPrompt<'a> {
    blocks: Vec<PromptBlock<'a>>,
}

pub fn system_prompt(mode: ExtractionMode, current_year: i32) -> Result<String> {
    Ok(SystemPrompt {
        current_year,
        multiple: mode == ExtractionMode::Multiple,
    }
    .render()?)
}

/// One `<block>` per block with content, in order.
pub fn user_prompt(blocks: &[ContentBlock]) -> Result<String> {
    let blocks = blocks
        .iter()
        .filter_map(|b| {
            b.content.as_deref().map(|content| PromptBlock {
                relevant: &b.relevant,
                irrelevant: b.irrelevant.as_deref().unwrap_or(""),
                content,
            })
        })
        .collect();
    Ok(UserPrompt { blocks }.render()?)
}
