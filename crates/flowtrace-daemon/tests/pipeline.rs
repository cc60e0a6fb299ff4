use flowtrace_core::{Branch, CallEvent, EventKind, SessionId, Shape, TraceConfig};
use flowtrace_daemon::TracePipeline;
use flowtrace_merge::{MergedSnapshot, StatsExtractor};
use flowtrace_session::StoreError;

fn manual_config() -> TraceConfig {
    TraceConfig {
        merge_interval_secs: 0,
        ..TraceConfig::default()
    }
}

fn shape(fields: &[(&str, &str)]) -> Shape {
    Shape::from_pairs(fields.iter().copied())
}

/// `handle_request -> auth -> db`, with `db` failing when `fail` is set.
fn run_request(pipeline: &TracePipeline, id: SessionId, fail: bool) {
    let tracer = pipeline.tracer(id);
    let request = tracer.span("handle_request", shape(&[("path", "str")]));
    {
        let auth = tracer.span("auth", shape(&[("token", "str")]));
        let db = tracer.span("db", shape(&[("query", "str")]));
        if fail {
            db.finish(Branch::Error, Shape::new());
        } else {
            db.finish(Branch::Success, shape(&[("rows", "int")]));
        }
        auth.finish(Branch::Success, shape(&[("ok", "bool")]));
    }
    request.finish(Branch::Success, shape(&[("status", "int")]));
    pipeline.complete_session(id);
}

#[tokio::test]
async fn traced_sessions_merge_end_to_end() {
    let pipeline = TracePipeline::start(manual_config());

    for i in 0..5 {
        run_request(&pipeline, SessionId::new(), i % 5 == 0);
    }

    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.total_sessions, 5);
    assert_eq!(report.final_merge.merged.len(), 5);
    assert_eq!(report.queue.accepted, 30);
    assert_eq!(report.queue.dropped, 0);
    assert_eq!(report.builder.degraded, 0);
}

#[tokio::test]
async fn merged_graph_counts_and_stats() {
    let pipeline = TracePipeline::start(manual_config());
    let merger = pipeline.merger();

    for i in 0..4 {
        run_request(&pipeline, SessionId::new(), i == 0);
    }
    pipeline.shutdown().await.unwrap();

    let graph = merger.snapshot();
    assert_eq!(graph.entry_frequency(), 4);

    let auth_db_ok = graph
        .edges
        .values()
        .find(|e| e.from.as_deref() == Some("auth") && e.to == "db" && e.branch == Branch::Success)
        .unwrap();
    assert_eq!(auth_db_ok.frequency, 3);

    let stats = StatsExtractor::new(&graph).report(3);
    assert_eq!(stats.total_sessions, 4);
    assert_eq!(
        stats.frequent_paths[0].functions,
        vec!["handle_request", "auth", "db"]
    );
    // `db` saw two output shapes across sessions.
    assert!(stats
        .anomalies
        .iter()
        .any(|a| a.function_name() == "db"));
}

#[tokio::test]
async fn streaming_merge_matches_batch_merge() {
    let ids: Vec<SessionId> = (0..6).map(|_| SessionId::new()).collect();

    let mut graphs = Vec::new();
    for streaming in [false, true] {
        let pipeline = TracePipeline::start(TraceConfig {
            streaming_merge: streaming,
            ..manual_config()
        });
        let merger = pipeline.merger();
        for (i, id) in ids.iter().enumerate() {
            run_request(&pipeline, *id, i % 3 == 0);
        }
        pipeline.shutdown().await.unwrap();
        graphs.push(merger.snapshot());
    }

    assert_eq!(graphs[0].edges, graphs[1].edges);
    assert_eq!(graphs[0].merged_session_ids, graphs[1].merged_session_ids);
    assert_eq!(graphs[0].total_sessions, 6);
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let pipeline = TracePipeline::start(manual_config());
    let id = SessionId::new();
    assert_eq!(
        pipeline.get_session_graph(id).unwrap_err(),
        StoreError::UnknownSession(id)
    );
    pipeline.cancel();
}

#[tokio::test]
async fn completed_session_is_queryable_until_merged() {
    let pipeline = TracePipeline::start(manual_config());
    let id = SessionId::new();
    run_request(&pipeline, id, false);

    let mut graph = None;
    for _ in 0..200 {
        if let Ok(g) = pipeline.get_session_graph(id) {
            graph = Some(g);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    let graph = graph.unwrap();
    assert!(graph.is_completed());
    assert_eq!(graph.nodes.len(), 3);

    let report = pipeline.merge_now();
    assert_eq!(report.merged, vec![id]);
    assert!(pipeline.get_session_graph(id).is_err());
    assert_eq!(pipeline.get_merged_graph().total_sessions, 1);
    pipeline.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_drains_buffered_events() {
    let pipeline = TracePipeline::start(manual_config());
    let id = SessionId::new();

    for seq in 0..50u64 {
        let event = CallEvent::new(id, seq, EventKind::Call, format!("step_{seq}"))
            .with_caller("main");
        pipeline.ingest(event).unwrap();
    }
    pipeline
        .ingest(CallEvent::new(id, 50, EventKind::Call, "main"))
        .unwrap();
    pipeline.complete_session(id);

    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.builder.applied, 51);
    assert_eq!(report.total_sessions, 1);
}

#[tokio::test]
async fn full_queue_drops_instead_of_blocking() {
    let pipeline = TracePipeline::start(TraceConfig {
        queue_capacity: 4,
        ..manual_config()
    });
    let id = SessionId::new();

    let mut rejected = 0;
    for seq in 0..1_000u64 {
        let event = CallEvent::new(id, seq, EventKind::Call, "tick");
        if pipeline.ingest(event).is_err() {
            rejected += 1;
        }
    }

    let counters = pipeline.queue_counters();
    assert_eq!(counters.accepted + counters.dropped, 1_000);
    assert_eq!(counters.dropped, rejected);
    pipeline.cancel();
}

#[tokio::test]
async fn disabled_tracing_records_nothing() {
    let pipeline = TracePipeline::start(TraceConfig {
        enabled: false,
        ..manual_config()
    });
    let id = SessionId::new();
    run_request(&pipeline, id, false);

    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.queue.accepted, 0);
    assert_eq!(report.total_sessions, 0);
}

#[tokio::test]
async fn snapshot_written_on_shutdown_and_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("merged.json");
    let config = TraceConfig {
        snapshot_path: Some(path.display().to_string()),
        ..manual_config()
    };

    let first = SessionId::new();
    let pipeline = TracePipeline::start(config.clone());
    run_request(&pipeline, first, false);
    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.snapshot_path.as_deref(), Some(path.to_str().unwrap()));

    let saved = MergedSnapshot::load(&path).unwrap();
    assert_eq!(saved.graph.total_sessions, 1);

    // Resuming keeps the ledger: the old session does not merge twice.
    let pipeline = TracePipeline::resume(config).unwrap();
    run_request(&pipeline, first, false);
    run_request(&pipeline, SessionId::new(), false);
    let report = pipeline.shutdown().await.unwrap();
    assert_eq!(report.total_sessions, 2);
    assert_eq!(report.final_merge.already_merged, vec![first]);
}
