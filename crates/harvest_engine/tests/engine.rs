mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{model, FakeFetcher};
use harvest_core::{ImageFilter, ModelRegistry, SearchDepth, TaskConfig};
use harvest_engine::{
    AutoConfirm, EngineEvent, EngineHandle, ImageJob, TextRunOutcome, TextRunSettings,
};
use tempfile::TempDir;

fn wait_for<T>(engine: &EngineHandle, mut pick: impl FnMut(EngineEvent) -> Option<T>) -> T {
    loop {
        let event = engine
            .recv_timeout(Duration::from_secs(5))
            .expect("engine event");
        if let Some(found) = pick(event) {
            return found;
        }
    }
}

fn engine(out: &TempDir, fetcher: FakeFetcher) -> EngineHandle {
    let mut registry = ModelRegistry::empty();
    registry.insert(model("http://x.com"));
    let fetcher = Arc::new(fetcher);
    EngineHandle::with_fetchers(
        registry,
        TextRunSettings {
            output_dir: out.path().to_path_buf(),
            ..TextRunSettings::default()
        },
        5,
        fetcher.clone(),
        fetcher,
    )
    .unwrap()
}

#[test]
fn text_run_streams_events_and_finishes() {
    let out = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new()
        .page(
            "http://x.com/list.html",
            r#"<div id="list"><a href="/1.html">one</a><a href="/2.html">two</a></div>"#,
        )
        .page("http://x.com/1.html", r#"<div id="content">a</div>"#)
        .page("http://x.com/2.html", r#"<div id="content">b</div>"#);
    let engine = engine(&out, fetcher);
    let task = TaskConfig::from_json(
        r#"{"model":"m","rootpage":"http://x.com/list.html","store":"book.txt","lastchap":0}"#,
    )
    .unwrap();

    engine.run_text(task, Arc::new(AutoConfirm));

    let mut done = 0;
    let outcome = wait_for(&engine, |event| match event {
        EngineEvent::ChapterDone { .. } => {
            done += 1;
            None
        }
        EngineEvent::TextRunFinished(result) => Some(result),
        _ => None,
    });
    assert_eq!(done, 2);
    match outcome.unwrap() {
        TextRunOutcome::Finished(report) => assert!(report.is_complete()),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(
        std::fs::read_to_string(out.path().join("book.txt")).unwrap(),
        "第1章 one\na\n第2章 two\nb\n"
    );
}

#[test]
fn image_job_reports_found_images() {
    let out = TempDir::new().unwrap();
    let fetcher = FakeFetcher::new().page(
        "http://x.com/seed.html",
        r#"<img src="/a.png"><img src="/b.png">"#,
    );
    let engine = engine(&out, fetcher);

    engine.collect_images(ImageJob {
        seeds: vec!["http://x.com/seed.html".to_string()],
        depth: SearchDepth::PageOnly,
        filter: ImageFilter::accept_all(),
        output_dir: None,
    });

    let report = wait_for(&engine, |event| match event {
        EngineEvent::ImageRunFinished(result) => Some(result),
        _ => None,
    })
    .unwrap();
    assert_eq!(report.accepted.len(), 2);
}

#[test]
fn failed_text_run_reports_the_error() {
    let out = TempDir::new().unwrap();
    let engine = engine(&out, FakeFetcher::new());
    let task = TaskConfig::from_json(
        r#"{"model":"m","rootpage":"http://x.com/list.html","store":"book.txt","lastchap":0}"#,
    )
    .unwrap();

    engine.run_text(task, Arc::new(AutoConfirm));
    let result = wait_for(&engine, |event| match event {
        EngineEvent::TextRunFinished(result) => Some(result),
        _ => None,
    });
    assert!(result.unwrap_err().contains("no chapters"));
}
