use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::AssemblyError;

/// One entry of a book's table of contents.
///
/// `index` is the discovery position across all root pages and is never
/// renumbered after range selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chapter {
    pub name: String,
    pub url: String,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterContent {
    pub index: usize,
    pub title: String,
    pub body: String,
}

impl ChapterContent {
    /// Titles are numbered `last_chapter + index + 1`.
    pub fn new(chapter: &Chapter, last_chapter: usize, body: String) -> Self {
        let number = last_chapter + chapter.index + 1;
        Self {
            index: chapter.index,
            title: format_chapter_title(number, &chapter.name),
            body,
        }
    }
}

pub fn format_chapter_title(number: usize, name: &str) -> String {
    format!("第{number}章 {name}")
}

/// Build the file chunks in index order: a title line then the body for each
/// chapter. Content for an index outside `requested` is rejected.
pub fn assemble_book(
    results: &BTreeMap<usize, ChapterContent>,
    requested: &[usize],
) -> Result<Vec<String>, AssemblyError> {
    let requested: BTreeSet<usize> = requested.iter().copied().collect();
    let mut chunks = Vec::with_capacity(results.len() * 2);
    for (index, content) in results {
        if !requested.contains(index) {
            return Err(AssemblyError::UnrequestedChapter(*index));
        }
        chunks.push(format!("{}\n", content.title));
        let mut body = content.body.clone();
        if !body.ends_with('\n') {
            body.push('\n');
        }
        chunks.push(body);
    }
    Ok(chunks)
}
