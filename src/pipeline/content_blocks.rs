use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::app::cache_json::{get_json, set_json};
use crate::app::ports::{Cache, Fetcher};
use crate::constants::{cache_key, CONTENT_BLOCKS_CACHE_NS, NOISE_ELEMENTS};
use crate::error::{ExtractorError, Result};
use crate::pipeline::markdown::{clean_markdown, html_to_markdown};
use crate::types::{ContentBlock, ContentBlockSpec, SourcedContentBlocks, VenueExtractionSpec};

static NOISE: Lazy<Selector> = Lazy::new(|| Selector::parse(NOISE_ELEMENTS).unwrap());

struct CompiledBlock {
    spec: ContentBlockSpec,
    selector: Selector,
    remove: Vec<Regex>,
}

impl CompiledBlock {
    fn compile(spec: &ContentBlockSpec) -> Result<Self> {
        let selector = Selector::parse(&spec.selector).map_err(|e| {
            ExtractorError::config(format!("invalid selector `{}`: {:?}", spec.selector, e))
        })?;
        let remove = spec
            .remove_regex
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| ExtractorError::config(format!("invalid remove_regex `{}`: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            spec: spec.clone(),
            selector,
            remove,
        })
    }

    fn clean(&self, raw: ContentBlock) -> Result<ContentBlock> {
        let mut block = raw.relabel(&self.spec);
        block.content = match block.content.take() {
            Some(html) if !block.is_markdown => {
                let markdown = html_to_markdown(&html, &self.spec.strip_elements)?;
                clean_markdown(&markdown, &self.remove)
            }
            Some(text) => clean_markdown(&text, &self.remove),
            None => None,
        };
        block.is_markdown = true;
        Ok(block)
    }
}

/// Outer HTML of the first match of each selector, after noise removal.
fn select_blocks(html: &str, url: &Url, blocks: &[CompiledBlock]) -> Vec<ContentBlock> {
    let mut document = Html::parse_document(html);
    let noise: Vec<_> = document.select(&NOISE).map(|el| el.id()).collect();
    for id in noise {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
    // Detached nodes stay in the tree's arena, so select from the live root.
    let root = document.root_element();
    blocks
        .iter()
        .map(|block| {
            let mut matches = root.select(&block.selector);
            let first = matches.next();
            let extra = matches.count();
            match (&first, extra) {
                (None, _) => warn!(url = %url, selector = %block.spec.selector, "Selector matched nothing"),
                (Some(_), n) if n > 0 => warn!(
                    url = %url,
                    selector = %block.spec.selector,
                    matches = n + 1,
                    "Selector matched several elements, using the first"
                ),
                _ => {}
            }
            ContentBlock::new(&block.spec, first.map(|el| el.html()))
        })
        .collect()
}

/// Scrapes a venue's configured content blocks from event pages.
pub struct ContentBlockScraper {
    venue_id: Uuid,
    blocks: Vec<CompiledBlock>,
    fetcher: Arc<dyn Fetcher>,
    cache: Arc<dyn Cache>,
}

impl ContentBlockScraper {
    pub fn new(spec: &VenueExtractionSpec, fetcher: Arc<dyn Fetcher>, cache: Arc<dyn Cache>) -> Result<Self> {
        let blocks = spec
            .blocks
            .iter()
            .map(CompiledBlock::compile)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| ExtractorError::config(format!("venue {}: {}", spec.label(), e)))?;
        Ok(Self {
            venue_id: spec.venue_id,
            blocks,
            fetcher,
            cache,
        })
    }

    /// Cleaned markdown blocks of `url`, one per configured block, in order.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn extract(&self, url: &Url) -> Result<Vec<ContentBlock>> {
        let raw = self.raw_blocks(url).await?;
        raw.into_iter()
            .zip(&self.blocks)
            .map(|(block, compiled)| compiled.clean(block))
            .collect()
    }

    pub async fn scrape(&self, url: &Url) -> Result<SourcedContentBlocks> {
        Ok(SourcedContentBlocks {
            url: url.clone(),
            venue_id: self.venue_id,
            blocks: self.extract(url).await?,
        })
    }

    async fn raw_blocks(&self, url: &Url) -> Result<Vec<ContentBlock>> {
        let key = cache_key(CONTENT_BLOCKS_CACHE_NS, &self.venue_id.to_string(), url);
        if let Some(cached) = get_json::<Vec<ContentBlock>>(self.cache.as_ref(), CONTENT_BLOCKS_CACHE_NS, &key).await {
            if cached.len() == self.blocks.len() {
                return Ok(cached);
            }
            debug!(key = %key, "Cached block count differs from configuration, refetching");
        }
        let body = self.fetcher.get(url).await?.into_body(url)?;
        let raw = select_blocks(&body, url, &self.blocks);
        set_json(self.cache.as_ref(), &key, &raw).await;
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(selector: &str) -> CompiledBlock {
        CompiledBlock::compile(&ContentBlockSpec {
            selector: selector.to_string(),
            relevant: "event".to_string(),
            irrelevant: None,
            remove_regex: vec![],
            strip_elements: vec!["a".to_string(), "img".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn noise_is_removed_before_selection() {
        let url = Url::parse("https://example.org/e/1").unwrap();
        let html = r#"<html><body>
            <header><div class="info">cabecera</div></header>
            <div class="info">Sesión <script>track()</script>21:00</div>
        </body></html>"#;
        let blocks = select_blocks(html, &url, &[compiled(".info")]);
        let content = blocks[0].content.as_deref().unwrap();
        assert!(content.contains("21:00"));
        assert!(!content.contains("cabecera"));
        assert!(!content.contains("track()"));
        assert!(!blocks[0].is_markdown);
    }

    #[test]
    fn matches_inside_removed_elements_are_not_selected() {
        let url = Url::parse("https://example.org/e/1").unwrap();
        let html = r#"<html><body>
            <header><p class="fecha">menú fecha</p></header>
            <nav><p class="fecha">otra fecha</p></nav>
            <main><p class="fecha">real 20:00</p></main>
            <footer><p class="fecha">pie</p></footer>
        </body></html>"#;
        let blocks = select_blocks(html, &url, &[compiled("p.fecha")]);
        assert_eq!(blocks[0].content.as_deref(), Some(r#"<p class="fecha">real 20:00</p>"#));
    }

    #[test]
    fn unmatched_selector_keeps_its_position() {
        let url = Url::parse("https://example.org/e/1").unwrap();
        let html = "<main><h1>Título</h1><p>Texto</p></main>";
        let blocks = select_blocks(html, &url, &[compiled("h1"), compiled(".missing"), compiled("p")]);
        assert_eq!(blocks.len(), 3);
        assert!(blocks[0].content.is_some());
        assert!(blocks[1].is_empty());
        assert!(blocks[2].content.as_deref().unwrap().contains("Texto"));
    }

    #[test]
    fn cleaning_converts_once_and_marks_markdown() {
        let block = compiled("h1");
        let raw = ContentBlock::new(&block.spec, Some("<h1>Título   </h1>".to_string()));
        let cleaned = block.clean(raw).unwrap();
        assert!(cleaned.is_markdown);
        assert_eq!(cleaned.content.as_deref(), Some("# Título\n"));
        let again = block.clean(cleaned.clone()).unwrap();
        assert_eq!(again, cleaned);
    }
}
