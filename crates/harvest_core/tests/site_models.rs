use harvest_core::{BuiltinModel, ConfigError, ModelRegistry, SiteModel, SiteModelSpec};

fn model(base: &str) -> SiteModel {
    SiteModel::new(
        "m",
        SiteModelSpec {
            base_url: base.to_string(),
            chapter_list_selector: "#list".to_string(),
            chapter_link_pattern: r"\d+\.html".to_string(),
            content_selector: "#content".to_string(),
        },
    )
}

#[test]
fn resolves_relative_root_and_absolute_hrefs() {
    let model = model("http://x.com");
    let root = "http://x.com/list/page.html";
    assert_eq!(model.resolve_chapter_url("5.html", root), "http://x.com/list/5.html");
    assert_eq!(model.resolve_chapter_url("/book/5.html", root), "http://x.com/book/5.html");
    assert_eq!(
        model.resolve_chapter_url("http://y.com/5.html", root),
        "http://y.com/5.html"
    );
}

#[test]
fn base_url_trailing_slash_is_not_doubled() {
    let model = model("http://x.com/");
    assert_eq!(
        model.resolve_chapter_url("/book/5.html", "http://x.com/list.html"),
        "http://x.com/book/5.html"
    );
}

#[test]
fn builtin_registry_contains_known_profiles() {
    let registry = ModelRegistry::builtin();
    let names: Vec<_> = registry.names().collect();
    assert_eq!(names, vec!["3344ui", "biquge", "biquge2"]);

    let biquge = registry.get("biquge").unwrap();
    assert_eq!(biquge.base_url(), "http://www.biquge.com.tw");
    assert_eq!(biquge.chapter_list_selector(), "#list");
    assert!(biquge.link_pattern().unwrap().is_match("123.html"));
    assert_eq!(BuiltinModel::U3344.spec().content_selector, "div.news");
}

#[test]
fn unknown_model_is_an_error() {
    let err = ModelRegistry::builtin().get("nope").unwrap_err();
    assert_eq!(err, ConfigError::UnknownModel("nope".to_string()));
}

#[test]
fn model_file_is_validated_on_load() {
    let good = r##"{"site":{"web":"http://s.com","chapscope":"dl","chapurl":"^/b/\\d+","content":"#c"}}"##;
    let mut registry = ModelRegistry::builtin();
    registry.merge(ModelRegistry::from_json_str(good).unwrap());
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.get("site").unwrap().content_selector(), "#c");

    let bad = r##"{"broken":{"web":"http://s.com","chapscope":"dl","chapurl":"(unclosed","content":"#c"}}"##;
    let err = ModelRegistry::from_json_str(bad).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPattern { ref model, .. } if model == "broken"));

    let err = ModelRegistry::from_json_str("[]").unwrap_err();
    assert!(matches!(err, ConfigError::MalformedModels(_)));
}

#[test]
fn invalid_pattern_surfaces_on_first_use() {
    let model = SiteModel::new(
        "lazy",
        SiteModelSpec {
            base_url: "http://x".into(),
            chapter_list_selector: "#l".into(),
            chapter_link_pattern: "[".into(),
            content_selector: "#c".into(),
        },
    );
    assert!(model.link_pattern().is_err());
}
