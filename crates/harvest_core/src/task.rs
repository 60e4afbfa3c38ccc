use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::ConfigError;

/// One text-extraction run, as loaded from the user's task file.
///
/// ```json
/// {"model": "biquge", "rootpage": ["http://x/list.html"], "store": "book.txt",
///  "lastchap": 0, "chaperlength": 10}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub model: String,
    #[serde(rename = "rootpage", deserialize_with = "one_or_many")]
    pub root_pages: Vec<String>,
    pub store: String,
    #[serde(rename = "lastchap")]
    pub last_chapter: i64,
    #[serde(
        rename = "chaperlength",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub chapter_length: Option<i64>,
    /// Charset label forced onto every page of this task (e.g. `gbk`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encode: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(page) => vec![page],
        OneOrMany::Many(pages) => pages,
    })
}

impl TaskConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let task: TaskConfig =
            serde_json::from_str(text).map_err(|err| ConfigError::MalformedTask(err.to_string()))?;
        task.validate()?;
        Ok(task)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingField("model"));
        }
        if self.root_pages.is_empty() || self.root_pages.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::MissingField("rootpage"));
        }
        if self.store.trim().is_empty() {
            return Err(ConfigError::MissingField("store"));
        }
        if self.last_chapter < 0 {
            return Err(ConfigError::NegativeField {
                field: "lastchap",
                value: self.last_chapter,
            });
        }
        if let Some(length) = self.chapter_length.filter(|len| *len < 0) {
            return Err(ConfigError::NegativeField {
                field: "chaperlength",
                value: length,
            });
        }
        Ok(())
    }

    /// Copy of this task that resumes after `last_chapter` saved chapters.
    pub fn advanced_to(&self, last_chapter: usize) -> Self {
        Self {
            last_chapter: last_chapter as i64,
            ..self.clone()
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
