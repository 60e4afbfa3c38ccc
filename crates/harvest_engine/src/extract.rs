use scraper::{ElementRef, Html, Selector};

use crate::dom::{collapse_whitespace, descendant_texts, direct_texts};

/// Chapter title: the first direct text child of `node` that is not blank.
///
/// Whitespace runs inside the title become one space instead of being
/// removed, so `第一章&nbsp;开始` reads `第一章 开始`. A leading child that
/// holds only whitespace is passed over. Empty when no text child remains.
pub fn extract_first_text(node: ElementRef<'_>) -> String {
    direct_texts(node)
        .map(collapse_whitespace)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

/// Chapter body: every descendant text node in document order, one line
/// each, with whitespace runs collapsed to a single space and trimmed.
///
/// Nodes holding only whitespace (indentation between tags, `<br>` gaps)
/// produce no line at all rather than a blank one.
pub fn extract_all_text(node: ElementRef<'_>) -> String {
    let mut body = String::new();
    for text in descendant_texts(node) {
        let line = collapse_whitespace(text);
        if line.is_empty() {
            continue;
        }
        body.push_str(&line);
        body.push('\n');
    }
    body
}

pub fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|err| err.to_string())
}

/// Outcome of looking for a chapter body on a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyExtraction {
    Found(String),
    /// The content selector matched nothing.
    NoMatch,
}

/// Locate `content_selector` in `html` and pull its full text.
pub fn extract_chapter_body(html: &str, content_selector: &str) -> Result<BodyExtraction, String> {
    let selector = parse_selector(content_selector)?;
    let document = Html::parse_document(html);
    Ok(match document.select(&selector).next() {
        Some(scope) => BodyExtraction::Found(extract_all_text(scope)),
        None => BodyExtraction::NoMatch,
    })
}
