mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::{config, sample_repo, write, HashEmbedder, ReversingReranker, PIPELINE_PY};
use sightline_core::{CancelSignal, ChunkId, Metric, SearchMode, SightlineError};
use sightline_graph::{ReachabilityReport, Status};
use sightline_lens::{EmbeddingProvider, HybridSearch, NoopReranker, ProjectIndex, Reranker, SearchFilters, VectorIndex};

fn open(root: &Path, provider: &Arc<HashEmbedder>) -> ProjectIndex {
    let provider: Arc<dyn EmbeddingProvider> = provider.clone();
    ProjectIndex::open(root, config(), provider, None).unwrap()
}

fn id(path: &str, symbol: &str) -> ChunkId {
    ChunkId::new(Path::new(path), symbol, "python")
}

#[tokio::test]
async fn reindexing_unchanged_project_makes_no_provider_calls() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);
    let cancel = CancelSignal::new();

    let first = project.index(&cancel).await.unwrap();
    assert!(first.is_complete());
    assert_eq!(first.files_changed, 2);
    assert!(first.chunks_embedded > 0);
    let calls = provider.calls();
    let report = project.report();

    let second = project.index(&cancel).await.unwrap();
    assert_eq!(provider.calls(), calls);
    assert_eq!(second.provider_calls, 0);
    assert_eq!(second.files_changed, 0);
    assert_eq!(second.chunks_cached, second.chunks_total);
    assert_eq!(second.snapshot_id, first.snapshot_id);
    assert_eq!(project.report(), report);

    // The cache survives a restart.
    drop(project);
    let fresh = Arc::new(HashEmbedder::new(64));
    let reopened = open(dir.path(), &fresh);
    assert_eq!(reopened.stats().unwrap().indexed_vectors, first.chunks_total);
    let third = reopened.index(&cancel).await.unwrap();
    assert_eq!(fresh.calls(), 0);
    assert_eq!(third.chunks_embedded, 0);
    assert_eq!(reopened.report(), report);
}

#[tokio::test]
async fn editing_one_chunk_reembeds_only_that_chunk() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();
    let texts = provider.texts();

    let edited = PIPELINE_PY.replace("    return []", "    return ()");
    write(dir.path(), "app/pipeline.py", &edited);

    let summary = project.index(&cancel).await.unwrap();
    assert_eq!(summary.files_changed, 1);
    assert_eq!(summary.chunks_embedded, 1);
    assert_eq!(summary.chunks_cached, summary.chunks_total - 1);
    assert_eq!(provider.texts(), texts + 1);

    let fetch = project.chunk(&id("app/pipeline.py", "fetch_data")).unwrap();
    assert!(fetch.text.contains("return ()"));

    // Only the current snapshot's report is kept.
    let reports: Vec<_> = std::fs::read_dir(dir.path().join(".sightline/reports"))
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(reports, vec![format!("{}.json", summary.snapshot_id)]);
}

#[tokio::test]
async fn moving_a_chunk_keeps_its_embedding() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();

    write(dir.path(), "app/pipeline.py", &format!("\n\n{PIPELINE_PY}"));
    let summary = project.index(&cancel).await.unwrap();
    assert_eq!(summary.chunks_embedded, 0);

    let results = project
        .search("fetch_data config", 20, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    let fetch = results.iter().find(|r| r.name == "fetch_data").unwrap();
    assert_eq!(fetch.line_start, 7);
}

#[tokio::test]
async fn failed_batch_leaves_other_batches_searchable() {
    let dir = tempfile::tempdir().unwrap();
    for (file, prefix) in [("mod_a.py", "alpha"), ("mod_b.py", "beta"), ("mod_c.py", "gamma")] {
        let body: String = (0..10)
            .map(|i| {
                let marker = if prefix == "beta" && i == 4 { "FAIL_ME" } else { "ok" };
                format!("def {prefix}_{i}():\n    return \"{marker} {prefix} {i}\"\n\n")
            })
            .collect();
        write(dir.path(), file, &body);
    }
    let provider = Arc::new(HashEmbedder::failing_on("FAIL_ME"));
    let project = open(dir.path(), &provider);
    let cancel = CancelSignal::new();

    let summary = project.index(&cancel).await.unwrap();
    assert!(!summary.is_complete());
    assert_eq!(summary.failures.batch_failures(), 1);
    assert_eq!(summary.files_failed, 0);
    assert!(summary.chunks_failed > 0 && summary.chunks_failed <= 10);
    assert_eq!(summary.chunks_embedded + summary.chunks_failed, summary.chunks_total);

    let results = project
        .search("alpha gamma", 100, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    assert_eq!(results.len(), summary.chunks_embedded);
    assert!(results.iter().all(|r| !r.snippet.contains("FAIL_ME")));
    assert!(results.iter().any(|r| r.name == "alpha_0"));
    assert!(results.iter().any(|r| r.name == "gamma_9"));

    // Keyword matches on chunks that were never embedded are skipped too.
    let literal = project
        .search("FAIL_ME", 100, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    assert!(literal.iter().all(|r| !r.snippet.contains("FAIL_ME")));

    // Once the provider recovers only the failed chunks are embedded.
    let healthy = Arc::new(HashEmbedder::new(64));
    drop(project);
    let project = open(dir.path(), &healthy);
    let retry = project.index(&cancel).await.unwrap();
    assert!(retry.is_complete());
    assert_eq!(retry.chunks_embedded, summary.chunks_failed);
}

#[tokio::test]
async fn keyword_mode_finds_identifiers_by_name() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(HashEmbedder::new(64));
    let mut config = config();
    config.search.mode = SearchMode::Keyword;
    let project = ProjectIndex::open(dir.path(), config, provider, None).unwrap();
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();

    let results = project
        .search("fetch_data", 5, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    assert_eq!(results[0].name, "fetch_data");
    assert!(results.iter().all(|r| r.keyword_score.is_some()));
    assert!(results.iter().any(|r| r.name == "run_pipeline"));

    let none = project
        .search("nonexistent_identifier", 5, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn noop_reranker_matches_vector_only_search() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let reranker: Arc<dyn Reranker> = Arc::new(NoopReranker::default());
    let project = ProjectIndex::open(dir.path(), config(), provider, Some(reranker)).unwrap();
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();

    let filters = SearchFilters::default();
    let reranked = project.search("transform data", 5, &filters, true, &cancel).await.unwrap();
    let plain = project.search("transform data", 5, &filters, false, &cancel).await.unwrap();

    let ids = |r: &[sightline_core::SearchResult]| r.iter().map(|x| x.chunk_id.clone()).collect::<Vec<_>>();
    assert!(!plain.is_empty());
    assert_eq!(ids(&reranked), ids(&plain));
    assert!(reranked.iter().all(|r| r.rerank_score.is_some()));
    assert!(plain.iter().all(|r| r.rerank_score.is_none()));
    assert_eq!(reranked[0].similarity, plain[0].similarity);
}

#[tokio::test]
async fn reranker_order_replaces_vector_order() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let reranker: Arc<dyn Reranker> = Arc::new(ReversingReranker);
    let project = ProjectIndex::open(dir.path(), config(), provider, Some(reranker)).unwrap();
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();

    let filters = SearchFilters::default();
    let plain = project.search("save data", 3, &filters, false, &cancel).await.unwrap();
    let reranked = project.search("save data", 3, &filters, true, &cancel).await.unwrap();
    assert_eq!(plain.len(), 3);
    assert_eq!(reranked.len(), 3);
    assert!(reranked[0].rerank_score.unwrap() >= reranked[1].rerank_score.unwrap());
    assert_ne!(reranked[0].chunk_id, plain[0].chunk_id);
}

#[tokio::test]
async fn reopening_with_other_dimensions_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let wide = Arc::new(HashEmbedder::new(1536));
    let project = open(dir.path(), &wide);
    project.index(&CancelSignal::new()).await.unwrap();
    drop(project);

    let narrow = Arc::new(HashEmbedder::new(768));
    let err = ProjectIndex::open(dir.path(), config(), narrow, None).unwrap_err();
    assert!(matches!(
        err,
        SightlineError::DimensionMismatch {
            expected: 1536,
            actual: 768
        }
    ));
}

#[tokio::test]
async fn query_with_other_dimensions_is_an_error() {
    let index = Arc::new(VectorIndex::new(1536, Metric::Cosine));
    let search = HybridSearch::new(Arc::new(HashEmbedder::new(768)), None, index, 3);
    let err = search
        .search("anything", 5, &SearchFilters::default(), &CancelSignal::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SightlineError::DimensionMismatch {
            expected: 1536,
            actual: 768
        }
    ));
}

#[tokio::test]
async fn cancellation_keeps_committed_work() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));

    let cancelled = CancelSignal::new();
    cancelled.cancel();
    let project = open(dir.path(), &provider);
    let err = project.index(&cancelled).await.unwrap_err();
    assert!(err.is_cancelled());

    provider.delay_ms.store(5_000, std::sync::atomic::Ordering::SeqCst);
    let deadline = CancelSignal::new().with_timeout(Duration::from_millis(500));
    let err = project.index(&deadline).await.unwrap_err();
    assert!(err.is_cancelled());
    // Extraction finished before the deadline and stays recorded.
    assert_eq!(project.stats().unwrap().store.total_files, 2);

    provider.delay_ms.store(0, std::sync::atomic::Ordering::SeqCst);
    let summary = project.index(&CancelSignal::new()).await.unwrap();
    assert_eq!(summary.files_changed, 0);
    assert_eq!(summary.chunks_embedded + summary.chunks_cached, summary.chunks_total);
}

#[tokio::test]
async fn removed_files_leave_the_index() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);
    let cancel = CancelSignal::new();
    project.index(&cancel).await.unwrap();
    let run_pipeline = id("app/pipeline.py", "run_pipeline");
    assert!(project.callers(&run_pipeline).is_ok());

    std::fs::remove_file(dir.path().join("app/pipeline.py")).unwrap();
    let summary = project.index(&cancel).await.unwrap();
    assert_eq!(summary.files_removed, 1);

    let results = project
        .search("fetch data", 50, &SearchFilters::default(), false, &cancel)
        .await
        .unwrap();
    assert!(results.iter().all(|r| r.file_path != Path::new("app/pipeline.py")));
    assert!(matches!(
        project.callers(&run_pipeline),
        Err(SightlineError::UnknownChunk(_))
    ));
    assert!(project.dead_code(0, 0.0).iter().all(|e| !e.name.starts_with("dead_chain")));
}

#[tokio::test]
async fn broken_file_is_excluded_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    write(dir.path(), "app/broken.py", "def broken(:\n    pass\n");
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);

    let summary = project.index(&CancelSignal::new()).await.unwrap();
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.files_changed, 2);
    assert!(summary.chunks_total > 0);
    assert!(project.chunk(&id("app/pipeline.py", "save_data")).is_some());
}

#[tokio::test]
async fn dead_code_and_call_queries() {
    let dir = tempfile::tempdir().unwrap();
    sample_repo(dir.path());
    let provider = Arc::new(HashEmbedder::new(64));
    let project = open(dir.path(), &provider);
    let summary = project.index(&CancelSignal::new()).await.unwrap();

    let dead: Vec<String> = project.dead_code(0, 0.0).into_iter().map(|e| e.name).collect();
    for name in ["dead_chain_start", "dead_chain_middle", "dead_chain_end", "unused_method"] {
        assert!(dead.contains(&name.to_string()), "{name} missing from {dead:?}");
    }
    assert!(!dead.contains(&"save_data".to_string()));
    assert_eq!(project.dead_code(2, 0.0).len(), 2);

    let main = id("app/main.py", "main");
    let callees: Vec<String> = project.callees(&main).unwrap().into_iter().map(|e| e.callee_name).collect();
    assert!(callees.contains(&"load_config".to_string()));
    assert_eq!(
        project.reachability(&id("app/pipeline.py", "fetch_data")).unwrap().status,
        Status::Reachable
    );
    assert!(matches!(
        project.reachability(&ChunkId::from("nope#x@python")),
        Err(SightlineError::UnknownChunk(_))
    ));

    // The report is persisted under its snapshot id.
    let saved = ReachabilityReport::load(&dir.path().join(".sightline/reports"), &summary.snapshot_id)
        .unwrap()
        .unwrap();
    assert_eq!(saved, project.report());
}
