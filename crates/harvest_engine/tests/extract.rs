use harvest_engine::{extract_all_text, extract_chapter_body, extract_first_text, BodyExtraction};
use pretty_assertions::assert_eq;
use scraper::{Html, Selector};

fn all_text(html: &str, selector: &str) -> String {
    let doc = Html::parse_fragment(html);
    let sel = Selector::parse(selector).unwrap();
    extract_all_text(doc.select(&sel).next().unwrap())
}

#[test]
fn nested_text_is_collected_depth_first() {
    assert_eq!(
        all_text("<div><p>A</p><p>B<span>C</span></p></div>", "div"),
        "A\nB\nC\n"
    );
}

#[test]
fn nbsp_and_whitespace_collapse_per_text_node() {
    let html = "<div id='content'>&nbsp;&nbsp;&nbsp;&nbsp;第一段\n  继续<br>\n\n<br>&nbsp;&nbsp;第二段</div>";
    assert_eq!(all_text(html, "#content"), "第一段 继续\n第二段\n");
}

#[test]
fn script_and_style_are_not_content() {
    let html = "<div id='c'><script>var x = 1;</script><style>p{}</style><p>kept</p></div>";
    assert_eq!(all_text(html, "#c"), "kept\n");
}

#[test]
fn deeply_nested_markup_is_walked() {
    let depth = 2_000;
    let html = format!(
        "<div id='c'>{}deep{}</div>",
        "<span>".repeat(depth),
        "</span>".repeat(depth)
    );
    assert_eq!(all_text(&html, "#c"), "deep\n");
}

#[test]
fn chapter_body_uses_first_matching_scope() {
    let html = r#"<html><body>
        <div id="content"><p>one</p><p>two</p></div>
        <div id="content"><p>ignored</p></div>
    </body></html>"#;
    assert_eq!(
        extract_chapter_body(html, "#content").unwrap(),
        BodyExtraction::Found("one\ntwo\n".to_string())
    );
}

#[test]
fn whitespace_only_nodes_produce_no_lines() {
    let html = "<div id='c'>\n    <p>一</p>\n    \n    <p>\u{3000}二\u{3000}</p>\n</div>";
    assert_eq!(all_text(html, "#c"), "一\n二\n");
}

#[test]
fn title_skips_a_blank_leading_text_node() {
    let doc = Html::parse_fragment("<a href='1.html'>\n  <i></i>  第三章\t\t归来  </a>");
    let sel = Selector::parse("a").unwrap();
    assert_eq!(extract_first_text(doc.select(&sel).next().unwrap()), "第三章 归来");
}
