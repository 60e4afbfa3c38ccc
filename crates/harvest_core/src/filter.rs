use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{same_origin, ConfigError, ImageDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnknownAction {
    Skip,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoExtensionAction {
    /// Treat an image of unknown type as a JPEG.
    AssumeJpeg,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl ImageKind {
    fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageKind::Jpeg),
            "image/png" => Some(ImageKind::Png),
            "image/gif" => Some(ImageKind::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageKind::Bmp),
            _ => None,
        }
    }
}

/// User-facing image selection options. Zero maxima mean "no limit";
/// an empty `allowed_types` means every type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFilter {
    pub size_min: u64,
    pub size_max: u64,
    pub unknown_size: UnknownAction,
    pub width_min: u32,
    pub width_max: u32,
    pub height_min: u32,
    pub height_max: u32,
    pub unknown_dimension: UnknownAction,
    pub allowed_types: Vec<ImageKind>,
    pub no_extension: NoExtensionAction,
    pub url_pattern: Option<String>,
    pub same_origin_only: bool,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self {
            size_min: 4000,
            size_max: 0,
            unknown_size: UnknownAction::Save,
            width_min: 200,
            width_max: 0,
            height_min: 200,
            height_max: 0,
            unknown_dimension: UnknownAction::Save,
            allowed_types: Vec::new(),
            no_extension: NoExtensionAction::AssumeJpeg,
            url_pattern: None,
            same_origin_only: false,
        }
    }
}

impl ImageFilter {
    /// Filter that lets everything through.
    pub fn accept_all() -> Self {
        Self {
            size_min: 0,
            width_min: 0,
            height_min: 0,
            ..Self::default()
        }
    }

    pub fn compile(&self) -> Result<ImageMatcher, ConfigError> {
        let pattern = self
            .url_pattern
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(Regex::new)
            .transpose()
            .map_err(|err| ConfigError::InvalidFilterPattern(err.to_string()))?;
        Ok(ImageMatcher {
            filter: self.clone(),
            pattern,
        })
    }
}

/// A compiled [`ImageFilter`].
#[derive(Debug, Clone)]
pub struct ImageMatcher {
    filter: ImageFilter,
    pattern: Option<Regex>,
}

impl ImageMatcher {
    /// `page` is the page the image was found on; needed for same-origin checks.
    pub fn accepts(&self, image: &ImageDescriptor, page: Option<&Url>) -> bool {
        self.origin_ok(image, page)
            && self.pattern_ok(image)
            && self.size_ok(image)
            && self.dimensions_ok(image)
            && self.type_ok(image)
    }

    fn origin_ok(&self, image: &ImageDescriptor, page: Option<&Url>) -> bool {
        if !self.filter.same_origin_only {
            return true;
        }
        match (Url::parse(&image.url), page) {
            (Ok(url), Some(page)) => same_origin(&url, page),
            _ => false,
        }
    }

    fn pattern_ok(&self, image: &ImageDescriptor) -> bool {
        self.pattern
            .as_ref()
            .map_or(true, |re| re.is_match(&image.url))
    }

    fn size_ok(&self, image: &ImageDescriptor) -> bool {
        let f = &self.filter;
        match image.size {
            None => f.unknown_size == UnknownAction::Save,
            Some(size) => size >= f.size_min && (f.size_max == 0 || size <= f.size_max),
        }
    }

    fn dimensions_ok(&self, image: &ImageDescriptor) -> bool {
        let f = &self.filter;
        if !image.has_dimensions() {
            return f.unknown_dimension == UnknownAction::Save;
        }
        within(image.width, f.width_min, f.width_max) && within(image.height, f.height_min, f.height_max)
    }

    fn type_ok(&self, image: &ImageDescriptor) -> bool {
        let f = &self.filter;
        if f.allowed_types.is_empty() {
            return true;
        }
        let kind = match image.effective_type() {
            Some(mime) => ImageKind::from_mime(&mime),
            None => match f.no_extension {
                NoExtensionAction::AssumeJpeg => Some(ImageKind::Jpeg),
                NoExtensionAction::Skip => None,
            },
        };
        kind.is_some_and(|kind| f.allowed_types.contains(&kind))
    }
}

fn within(value: u32, min: u32, max: u32) -> bool {
    value >= min && (max == 0 || value <= max)
}
