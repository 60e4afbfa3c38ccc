use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// An image found while scanning pages. Zero width/height means unknown
/// (e.g. CSS background images or probed links).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub content_type: Option<String>,
}

impl ImageDescriptor {
    pub fn embedded(url: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            url: url.into(),
            width,
            height,
            size: None,
            content_type: None,
        }
    }

    pub fn has_dimensions(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    /// Declared content type, or one guessed from the URL extension.
    pub fn effective_type(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .or_else(|| guess_image_type(&self.url).map(str::to_string))
    }
}

/// How far the image collector follows links off the seed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SearchDepth {
    /// Images embedded in the seed page only.
    PageOnly,
    /// Also probe the page's links for being images themselves.
    ProbeLinks,
    /// Also fetch linked HTML pages and take their embedded images.
    ParseLinkedPages,
}

impl SearchDepth {
    pub fn level(self) -> u8 {
        match self {
            SearchDepth::PageOnly => 0,
            SearchDepth::ProbeLinks => 1,
            SearchDepth::ParseLinkedPages => 2,
        }
    }

    pub fn follows_links(self) -> bool {
        self >= SearchDepth::ProbeLinks
    }

    pub fn parses_linked_pages(self) -> bool {
        self == SearchDepth::ParseLinkedPages
    }
}

impl TryFrom<u8> for SearchDepth {
    type Error = ConfigError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(SearchDepth::PageOnly),
            1 => Ok(SearchDepth::ProbeLinks),
            2 => Ok(SearchDepth::ParseLinkedPages),
            other => Err(ConfigError::InvalidDepth(other)),
        }
    }
}

impl From<SearchDepth> for u8 {
    fn from(depth: SearchDepth) -> Self {
        depth.level()
    }
}

/// MIME type implied by a URL's file extension, if it names a known image format.
pub fn guess_image_type(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let last = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
