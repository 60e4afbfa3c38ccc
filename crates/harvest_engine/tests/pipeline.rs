mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{chapter_page, chapter_url, chapters, model, FakeFetcher, RecordingSink};
use harvest_core::{assemble_book, ChapterState};
use harvest_engine::{
    CancellationToken, ChapterPipeline, ContentMissPolicy, EngineEvent, NullSink, PipelineError,
    PipelineSettings, ProgressSink,
};
use pretty_assertions::assert_eq;

fn settings(concurrency: usize, miss_policy: ContentMissPolicy) -> PipelineSettings {
    PipelineSettings {
        concurrency,
        miss_policy,
        ..PipelineSettings::default()
    }
}

fn book(count: usize, delay: Duration) -> FakeFetcher {
    (0..count).fold(FakeFetcher::new(), |fetcher, index| {
        fetcher.slow_page(&chapter_url(index), &chapter_page(&format!("<p>text {index}</p>")), delay)
    })
}

#[tokio::test]
async fn at_most_concurrency_fetches_are_in_flight() {
    let fetcher = Arc::new(book(10, Duration::from_millis(20)));
    let pipeline = ChapterPipeline::new(fetcher.clone(), settings(3, ContentMissPolicy::AbortRun));

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(10),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(fetcher.max_in_flight(), 3);
    assert_eq!(fetcher.requests().len(), 10);
    assert_eq!(output.contents.len(), 10);
    assert!(output.ledger.is_complete());
    assert!(!output.cancelled);
}

#[tokio::test]
async fn assembly_order_follows_index_not_completion() {
    let fetcher = (0..10).fold(FakeFetcher::new(), |fetcher, index| {
        let delay = if index == 1 { 80 } else if index == 7 { 1 } else { 10 };
        fetcher.slow_page(
            &chapter_url(index),
            &chapter_page(&format!("body {index}")),
            Duration::from_millis(delay),
        )
    });
    let sink = RecordingSink::new();
    let pipeline = ChapterPipeline::new(Arc::new(fetcher), settings(10, ContentMissPolicy::AbortRun));

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(10),
            sink.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let done: Vec<usize> = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::ChapterDone { index, .. } => Some(index),
            _ => None,
        })
        .collect();
    let pos = |i: usize| done.iter().position(|&d| d == i).unwrap();
    assert!(pos(7) < pos(1), "chapter 7 should finish first: {done:?}");

    let chunks = assemble_book(&output.contents, &output.ledger.requested_indices()).unwrap();
    let text = chunks.concat();
    assert!(text.find("body 1").unwrap() < text.find("body 7").unwrap());
    assert!(text.starts_with("第1章 c0\nbody 0\n第2章 c1\nbody 1\n"));
}

#[tokio::test]
async fn progress_reaches_total() {
    let sink = RecordingSink::new();
    let pipeline = ChapterPipeline::new(
        Arc::new(book(4, Duration::ZERO)),
        settings(2, ContentMissPolicy::AbortRun),
    );
    pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(4),
            sink.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let last = sink
        .events()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::ChapterProgress { completed, total } => Some((completed, total)),
            _ => None,
        })
        .last();
    assert_eq!(last, Some((4, 4)));
}

#[tokio::test]
async fn network_failure_drops_only_that_chapter() {
    let fetcher = (0..5)
        .filter(|&index| index != 3)
        .fold(FakeFetcher::new(), |fetcher, index| {
            fetcher.page(&chapter_url(index), &chapter_page("ok"))
        });
    let pipeline = ChapterPipeline::new(Arc::new(fetcher), settings(2, ContentMissPolicy::AbortRun));

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(5),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.contents.keys().copied().collect::<Vec<_>>(), vec![0, 1, 2, 4]);
    let failures = output.ledger.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 3);
    assert!(output.ledger.is_complete());
}

fn book_with_missing_content(missing: usize) -> FakeFetcher {
    (0..5).fold(FakeFetcher::new(), |fetcher, index| {
        let body = if index == missing {
            "<html><body><div id='ads'>buy</div></body></html>".to_string()
        } else {
            chapter_page("ok")
        };
        fetcher.page(&chapter_url(index), &body)
    })
}

#[tokio::test]
async fn content_miss_aborts_the_run_by_default() {
    let fetcher = Arc::new(book_with_missing_content(2));
    let pipeline = ChapterPipeline::new(fetcher.clone(), settings(1, ContentMissPolicy::AbortRun));

    let err = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(5),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PipelineError::SelectorMiss {
            index: 2,
            url: chapter_url(2),
            selector: "#content".to_string(),
        }
    );
    assert_eq!(
        fetcher.requests(),
        vec![chapter_url(0), chapter_url(1), chapter_url(2)]
    );
}

#[tokio::test]
async fn content_miss_can_skip_the_chapter() {
    let pipeline = ChapterPipeline::new(
        Arc::new(book_with_missing_content(2)),
        settings(1, ContentMissPolicy::SkipChapter),
    );

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(5),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.contents.len(), 4);
    assert!(matches!(output.ledger.state(2), Some(ChapterState::Failed(_))));
}

#[tokio::test]
async fn invalid_content_selector_fails_before_fetching() {
    let mut spec = model("http://x.com").spec().clone();
    spec.content_selector = "div[".to_string();
    let fetcher = Arc::new(book(2, Duration::ZERO));
    let pipeline = ChapterPipeline::new(fetcher.clone(), PipelineSettings::default());

    let err = pipeline
        .run(
            Arc::new(harvest_core::SiteModel::new("bad", spec)),
            chapters(2),
            Arc::new(NullSink),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, PipelineError::InvalidSelector { .. }));
    assert!(fetcher.requests().is_empty());
}

/// Cancels the token as soon as the first chapter is parsed.
struct CancelOnFirst {
    token: CancellationToken,
}

impl ProgressSink for CancelOnFirst {
    fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::ChapterDone { .. }) {
            self.token.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_stops_new_dispatches() {
    let token = CancellationToken::new();
    let fetcher = Arc::new(book(5, Duration::ZERO));
    let pipeline = ChapterPipeline::new(fetcher.clone(), settings(1, ContentMissPolicy::AbortRun));

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(5),
            Arc::new(CancelOnFirst {
                token: token.clone(),
            }),
            &token,
        )
        .await
        .unwrap();

    assert!(output.cancelled);
    assert_eq!(output.contents.len(), 1);
    assert_eq!(output.ledger.pending(), vec![1, 2, 3, 4]);
    assert_eq!(fetcher.requests().len(), 1);
}

#[tokio::test]
async fn cancelled_before_start_fetches_nothing() {
    let token = CancellationToken::new();
    token.cancel();
    let fetcher = Arc::new(book(3, Duration::ZERO));
    let pipeline = ChapterPipeline::new(fetcher.clone(), PipelineSettings::default());

    let output = pipeline
        .run(Arc::new(model("http://x.com")), chapters(3), Arc::new(NullSink), &token)
        .await
        .unwrap();

    assert!(output.cancelled);
    assert!(output.contents.is_empty());
    assert!(fetcher.requests().is_empty());
}

/// Cancels the token once the chapter at `index` is parsed.
struct CancelAfter {
    index: usize,
    token: CancellationToken,
}

impl ProgressSink for CancelAfter {
    fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::ChapterDone { index, .. } if index == self.index) {
            self.token.cancel();
        }
    }
}

#[tokio::test]
async fn cancellation_after_every_chapter_settled_is_a_full_run() {
    let token = CancellationToken::new();
    let fetcher = Arc::new(book(3, Duration::ZERO));
    let pipeline = ChapterPipeline::new(fetcher.clone(), settings(1, ContentMissPolicy::AbortRun));

    let output = pipeline
        .run(
            Arc::new(model("http://x.com")),
            chapters(3),
            Arc::new(CancelAfter {
                index: 2,
                token: token.clone(),
            }),
            &token,
        )
        .await
        .unwrap();

    assert!(token.is_cancelled());
    assert!(!output.cancelled);
    assert!(output.ledger.is_complete());
    assert_eq!(output.contents.len(), 3);
}
