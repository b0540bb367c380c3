//! End-to-end behaviour of the attraction pipeline against in-memory mocks.

use std::sync::Arc;
use std::time::Duration;

use attraction_crawler::models::{
    AttractionEntry, ClassificationResult, ClassifiedNote, Config, CrawlStatus, Note,
};
use attraction_crawler::pipeline::{AttractionPipeline, BatchRunner, Enricher};
use attraction_crawler::services::{
    AuthContext, DetailFetcher, RelevanceAnalyzer, RelevanceClassifier, merge_classified,
};
use attraction_crawler::storage::{DatasetStorage, LocalStorage};
use attraction_crawler::testing::{MockCompletion, MockNoteSource, numbered_texts};
use attraction_crawler::utils::log::Logger;
use serde_json::{Value, json};
use tempfile::TempDir;

const FRESH: i64 = 1_717_000_000_000;
const STALE: i64 = 1_600_000_000_000;

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.classifier.retry_delay_secs = 0;
    config.search.retry_delay_ms = 0;
    config.enrichment.request_delay_ms = 0;
    config.batch.item_delay_secs = 0;
    config
}

fn note(id: &str, title: &str, published_at: Option<i64>) -> Note {
    Note {
        id: id.into(),
        title: title.into(),
        token: format!("tok-{}", id),
        published_at,
        ..Note::default()
    }
}

fn relevant(id: &str, published_at: i64) -> ClassifiedNote {
    ClassifiedNote::new(
        note(id, id, Some(published_at)),
        ClassificationResult::new(90.0, "ok"),
        25.0,
    )
}

fn detail(id: &str, time: i64) -> Value {
    json!({"note": {"noteId": id, "title": id, "desc": "body", "time": time}})
}

/// Scores 90% for texts mentioning 西湖, 5% otherwise.
fn west_lake_judge() -> MockCompletion {
    MockCompletion::responder(|prompt| {
        let items: Vec<String> = numbered_texts(prompt)
            .iter()
            .map(|text| {
                let score = if text.contains("西湖") { 90 } else { 5 };
                format!(r#"{{"relevance":"{}%","explanation":"judged"}}"#, score)
            })
            .collect();
        format!("[{}]", items.join(","))
    })
}

fn enricher(source: MockNoteSource, storage: Arc<LocalStorage>, config: &Config) -> Enricher {
    let fetcher = DetailFetcher::new(Arc::new(source), storage.clone(), Logger::silent());
    Enricher::new(fetcher, storage, config.enrichment.clone(), Logger::silent())
}

#[tokio::test]
async fn classifies_concrete_scenario() {
    let config = quiet_config();
    let mock = Arc::new(MockCompletion::scripted(vec![Ok(r#"[
        {"relevance": "90%", "explanation": "长城是著名景点"},
        {"relevance": "5%", "explanation": "与旅游无关"}
    ]"#
    .into())]));
    let classifier = RelevanceClassifier::new(mock.clone(), &config.classifier, Logger::silent());

    let texts = vec!["长城很美".to_string(), "今天天气不错".to_string()];
    let results = classifier.classify(&texts, "旅游").await;

    let flags: Vec<bool> = texts
        .iter()
        .zip(results)
        .map(|(text, result)| {
            ClassifiedNote::new(note("x", text, None), result, config.classifier.threshold)
                .is_relevant()
        })
        .collect();
    assert_eq!(flags, vec![true, false]);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn second_analysis_reuses_cached_scores() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let config = quiet_config();
    let mock = Arc::new(west_lake_judge());
    let classifier = RelevanceClassifier::new(mock.clone(), &config.classifier, Logger::silent());
    let analyzer = RelevanceAnalyzer::new(classifier, storage, &config.classifier, Logger::silent());

    let notes: Vec<Note> = (0..25)
        .map(|i| {
            let title = if i % 2 == 0 { "西湖夜景" } else { "外卖测评" };
            note(&format!("n{}", i), title, None)
        })
        .collect();

    let first = analyzer.analyze("1001", &notes, "西湖").await.unwrap();
    let calls_after_first = mock.call_count();
    assert_eq!(calls_after_first, 3);

    let second = analyzer.analyze("1001", &notes, "西湖").await.unwrap();
    assert_eq!(mock.call_count(), calls_after_first);
    assert_eq!(second.classified_count, 0);

    let scores = |rows: &[ClassifiedNote]| -> Vec<(String, f64)> {
        rows.iter()
            .map(|r| (r.id().to_string(), r.relevance_score()))
            .collect()
    };
    assert_eq!(scores(&first.rows), scores(&second.rows));
    assert_eq!(second.relevant().len(), 13);
}

#[test]
fn merge_keeps_newest_classification() {
    let cached = ClassifiedNote::new(
        note("X", "t", None),
        ClassificationResult::new(10.0, "old"),
        25.0,
    );
    let fresh = ClassifiedNote::new(
        note("X", "t", None),
        ClassificationResult::new(90.0, "new"),
        25.0,
    );

    let merged = merge_classified(vec![cached], vec![fresh]);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].relevance_score(), 90.0);
    assert!(merged[0].is_relevant());
}

#[tokio::test]
async fn enrichment_stops_after_consecutive_stale_notes() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let config = quiet_config();

    let times: Vec<i64> = vec![
        FRESH + 3,
        FRESH + 2,
        FRESH + 1,
        STALE + 9,
        STALE + 8,
        STALE + 7,
        STALE + 6,
        STALE + 5,
    ];
    let mut source = MockNoteSource::new();
    let mut items = Vec::new();
    for (i, time) in times.iter().enumerate() {
        let id = format!("n{}", i);
        source = source.with_detail(&id, detail(&id, *time));
        items.push(relevant(&id, *time));
    }
    items.reverse();

    let summary = enricher(source, storage.clone(), &config)
        .enrich("1001", items, &AuthContext::default())
        .await
        .unwrap();

    assert!(summary.stopped_early);
    assert_eq!(summary.fetched, 5);
    assert_eq!(summary.unnecessary, 3);

    let store = storage.load_details("1001").await.unwrap();
    assert_eq!(store.len(), 5);

    let marked: Vec<ClassifiedNote> = serde_json::from_str(
        &std::fs::read_to_string(tmp.path().join("data/1001_relevant.json")).unwrap(),
    )
    .unwrap();
    let statuses: Vec<Option<CrawlStatus>> = marked.iter().map(|r| r.note.crawl_status).collect();
    assert_eq!(&statuses[..5], &[Some(CrawlStatus::Success); 5]);
    assert_eq!(&statuses[5..], &[Some(CrawlStatus::Unnecessary); 3]);
    assert_eq!(marked[0].id(), "n0");
}

#[tokio::test]
async fn interrupted_enrichment_loses_at_most_one_partial_batch() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let config = quiet_config();
    let batch_size = config.enrichment.batch_size;

    let mut source = MockNoteSource::new().hang_after(batch_size + 2);
    let mut items = Vec::new();
    for i in 0..10 {
        let id = format!("n{}", i);
        let time = FRESH - i;
        source = source.with_detail(&id, detail(&id, time));
        items.push(relevant(&id, time));
    }

    let enricher = enricher(source, storage.clone(), &config);
    let auth = AuthContext::default();
    let interrupted = tokio::time::timeout(
        Duration::from_millis(300),
        enricher.enrich("1001", items, &auth),
    )
    .await;
    assert!(interrupted.is_err());

    let store = storage.load_details("1001").await.unwrap();
    assert_eq!(store.len(), batch_size);
}

#[tokio::test]
async fn full_run_searches_classifies_and_enriches() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let config = quiet_config();

    let source = Arc::new(
        MockNoteSource::new()
            .with_page(
                1,
                vec![
                    note("a", "西湖断桥", None),
                    note("b", "公司团建", None),
                    note("c", "西湖游船", None),
                ],
                true,
            )
            .with_page(2, vec![note("c", "西湖游船", None), note("d", "西湖日落", None)], false)
            .with_detail("a", detail("a", FRESH + 2))
            .with_detail("c", detail("c", FRESH + 1))
            .with_detail("d", json!({"code": -100})),
    );
    let completion = Arc::new(west_lake_judge());
    let pipeline = AttractionPipeline::new(
        &config,
        source.clone(),
        completion.clone(),
        storage.clone(),
        Logger::silent(),
    );
    let auth = AuthContext::from_cookie("a1=x; web_session=y");

    let report = pipeline.run("西湖", "1001", &auth).await;

    assert!(report.success, "{:?}", report.error);
    assert_eq!(report.note_count, 4);
    assert_eq!(report.relevant_count, 3);
    assert_eq!(report.processed_count, 2);
    assert!(report.search_file.as_deref().unwrap().ends_with("1001.json"));
    assert!(report.analyzed_file.as_deref().unwrap().ends_with("1001_analyzed.json"));
    assert!(report.detail_file.as_deref().unwrap().ends_with("1001_details.json"));
    assert_eq!(completion.call_count(), 1);

    let errors = std::fs::read_dir(tmp.path().join("error")).unwrap().count();
    assert_eq!(errors, 1);

    let rerun = pipeline.run("西湖", "1001", &auth).await;
    assert!(rerun.success);
    assert_eq!(completion.call_count(), 1);
    assert_eq!(rerun.processed_count, 2);

    let store = storage.load_details("1001").await.unwrap();
    assert!(store.iter().all(|r| r.crawl_status == Some(CrawlStatus::Cached)));
}

#[tokio::test]
async fn run_without_notes_reports_failure() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let completion = Arc::new(west_lake_judge());
    let pipeline = AttractionPipeline::new(
        &quiet_config(),
        Arc::new(MockNoteSource::new()),
        completion.clone(),
        storage,
        Logger::silent(),
    );

    let report = pipeline.run("无人区", "404", &AuthContext::default()).await;

    assert!(!report.success);
    assert!(report.error.is_some());
    assert_eq!(report.note_count, 0);
    assert!(report.search_file.is_none());
    assert_eq!(completion.call_count(), 0);
}

#[tokio::test]
async fn run_with_no_relevant_notes_still_succeeds() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let source = Arc::new(MockNoteSource::new().with_page(1, vec![note("a", "公司团建", None)], false));
    let pipeline = AttractionPipeline::new(
        &quiet_config(),
        source.clone(),
        Arc::new(west_lake_judge()),
        storage,
        Logger::silent(),
    );

    let report = pipeline.run("西湖", "1001", &AuthContext::default()).await;

    assert!(report.success);
    assert_eq!(report.relevant_count, 0);
    assert_eq!(report.processed_count, 0);
    assert!(report.detail_file.is_none());
    assert_eq!(source.detail_calls(), 0);
}

#[tokio::test]
async fn batch_persists_cumulative_results() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let config = quiet_config();
    let source = Arc::new(
        MockNoteSource::new()
            .with_page(1, vec![note("a", "西湖断桥", None)], false)
            .with_detail("a", detail("a", FRESH)),
    );
    let pipeline = AttractionPipeline::new(
        &config,
        source,
        Arc::new(west_lake_judge()),
        storage.clone(),
        Logger::silent(),
    );
    let runner = BatchRunner::new(pipeline, storage, config.batch.item_delay(), Logger::silent());

    let entries = vec![
        AttractionEntry {
            keyword: "西湖".into(),
            id: "1001".into(),
        },
        AttractionEntry {
            keyword: "西湖".into(),
            id: "1002".into(),
        },
    ];
    let records = runner.run(&entries, &AuthContext::default()).await;

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.report.success));

    let results_dir = tmp.path().join("results");
    let files: Vec<_> = std::fs::read_dir(&results_dir).unwrap().filter_map(|e| e.ok()).collect();
    assert_eq!(files.len(), 1);
    let saved: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(files[0].path()).unwrap()).unwrap();
    assert_eq!(saved.len(), 2);
    assert_eq!(saved[1]["attraction_id"], "1002");
    assert!(saved[0]["duration"].as_str().unwrap().ends_with('s'));
}

#[tokio::test(start_paused = true)]
async fn batch_waits_between_attractions() {
    let tmp = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(tmp.path()));
    let pipeline = AttractionPipeline::new(
        &quiet_config(),
        Arc::new(MockNoteSource::new()),
        Arc::new(west_lake_judge()),
        storage.clone(),
        Logger::silent(),
    );
    let runner = BatchRunner::new(pipeline, storage, Duration::from_secs(10), Logger::silent());

    let entries: Vec<AttractionEntry> = (1..=3)
        .map(|i| AttractionEntry {
            keyword: format!("景点{}", i),
            id: format!("{}", 1000 + i),
        })
        .collect();

    let started = tokio::time::Instant::now();
    let records = runner.run(&entries, &AuthContext::default()).await;
    let elapsed = started.elapsed();

    assert_eq!(records.len(), 3);
    assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(21), "{elapsed:?}");
}
