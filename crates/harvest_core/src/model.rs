use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ConfigError;

/// Declarative profile as written in a model file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteModelSpec {
    #[serde(rename = "web")]
    pub base_url: String,
    #[serde(rename = "chapscope")]
    pub chapter_list_selector: String,
    #[serde(rename = "chapurl")]
    pub chapter_link_pattern: String,
    #[serde(rename = "content")]
    pub content_selector: String,
}

/// How to find the chapter list and chapter text on one family of sites.
///
/// The link pattern is kept as source text and compiled on first use.
#[derive(Debug, Clone)]
pub struct SiteModel {
    name: String,
    spec: SiteModelSpec,
    link_pattern: OnceLock<Regex>,
}

impl SiteModel {
    pub fn new(name: impl Into<String>, spec: SiteModelSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            link_pattern: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.spec.base_url
    }

    pub fn chapter_list_selector(&self) -> &str {
        &self.spec.chapter_list_selector
    }

    pub fn content_selector(&self) -> &str {
        &self.spec.content_selector
    }

    pub fn spec(&self) -> &SiteModelSpec {
        &self.spec
    }

    pub fn link_pattern(&self) -> Result<&Regex, ConfigError> {
        if let Some(re) = self.link_pattern.get() {
            return Ok(re);
        }
        let compiled =
            Regex::new(&self.spec.chapter_link_pattern).map_err(|err| ConfigError::InvalidPattern {
                model: self.name.clone(),
                message: err.to_string(),
            })?;
        // A concurrent initializer may have won; either value is the same pattern.
        Ok(self.link_pattern.get_or_init(|| compiled))
    }

    /// Turn a chapter-list href into an absolute chapter URL.
    ///
    /// Absolute `http(s):` hrefs are kept, `/`-rooted hrefs are prefixed with the
    /// model base URL, anything else is resolved against the root page's directory.
    pub fn resolve_chapter_url(&self, href: &str, root_page: &str) -> String {
        if is_absolute_http(href) {
            return href.to_string();
        }
        if href.starts_with("//") {
            if let Some(url) = Url::parse(&self.spec.base_url)
                .ok()
                .and_then(|base| base.join(href).ok())
            {
                return url.into();
            }
        }
        if href.starts_with('/') {
            return format!("{}{}", self.spec.base_url.trim_end_matches('/'), href);
        }
        match Url::parse(root_page).and_then(|root| root.join(href)) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{}", page_directory(root_page), href),
        }
    }
}

fn is_absolute_http(href: &str) -> bool {
    let lower = href.get(..8).unwrap_or(href).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn page_directory(page: &str) -> &str {
    let without_query = page.split(['?', '#']).next().unwrap_or(page);
    match without_query.rfind('/') {
        Some(pos) => &without_query[..=pos],
        None => "",
    }
}

/// Site profiles shipped with the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    Biquge,
    Biquge2,
    U3344,
}

impl BuiltinModel {
    pub const ALL: [BuiltinModel; 3] = [Self::Biquge, Self::Biquge2, Self::U3344];

    pub fn name(self) -> &'static str {
        match self {
            Self::Biquge => "biquge",
            Self::Biquge2 => "biquge2",
            Self::U3344 => "3344ui",
        }
    }

    pub fn spec(self) -> SiteModelSpec {
        let (web, scope, content) = match self {
            Self::Biquge => ("http://www.biquge.com.tw", "#list", "#content"),
            Self::Biquge2 => ("http://www.biquge.cm", "#list", "#content"),
            Self::U3344 => ("https://www.3344ui.com", "ul.news_list", "div.news"),
        };
        SiteModelSpec {
            base_url: web.to_string(),
            chapter_list_selector: scope.to_string(),
            chapter_link_pattern: r"\d+\.html".to_string(),
            content_selector: content.to_string(),
        }
    }
}

/// Name -> model lookup. Unknown names are a [`ConfigError`], never a panic.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, Arc<SiteModel>>,
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for model in BuiltinModel::ALL {
            registry.insert(SiteModel::new(model.name(), model.spec()));
        }
        registry
    }

    /// Parse `{"name": {"web", "chapscope", "chapurl", "content"}}`.
    ///
    /// Every link pattern is checked here so a bad file fails before any fetch.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let specs: BTreeMap<String, SiteModelSpec> =
            serde_json::from_str(json).map_err(|err| ConfigError::MalformedModels(err.to_string()))?;
        let mut registry = Self::empty();
        for (name, spec) in specs {
            let model = SiteModel::new(name, spec);
            model.link_pattern()?;
            registry.insert(model);
        }
        Ok(registry)
    }

    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Models in `other` replace same-named models in `self`.
    pub fn merge(&mut self, other: ModelRegistry) {
        self.models.extend(other.models);
    }

    pub fn insert(&mut self, model: SiteModel) {
        self.models.insert(model.name().to_string(), Arc::new(model));
    }

    pub fn get(&self, name: &str) -> Result<Arc<SiteModel>, ConfigError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
