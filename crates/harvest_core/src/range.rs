use std::ops::Range;

use crate::RangeError;

/// Slice of the chapter list to fetch in this run: `start..end`, `count` long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    pub start: usize,
    pub end: usize,
    pub count: usize,
}

impl ChapterRange {
    /// `start = last_chapter`; `end` is capped by `chapter_length` when it is
    /// positive, otherwise runs to `total`.
    pub fn select(
        total: usize,
        last_chapter: i64,
        chapter_length: Option<i64>,
    ) -> Result<Self, RangeError> {
        if last_chapter < 0 {
            return Err(RangeError::NegativeLastChapter(last_chapter));
        }
        let start = usize::try_from(last_chapter).unwrap_or(usize::MAX);
        if start > total {
            return Err(RangeError::LastChapterBeyondTotal {
                last: last_chapter,
                total,
            });
        }
        let end = match chapter_length {
            Some(length) if length < 0 => return Err(RangeError::NegativeLength(length)),
            Some(length) if length > 0 => {
                let length = usize::try_from(length).unwrap_or(usize::MAX);
                start.saturating_add(length).min(total)
            }
            _ => total,
        };
        Ok(Self {
            start,
            end,
            count: end.saturating_sub(start),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn indices(&self) -> Range<usize> {
        self.start..self.end
    }
}
