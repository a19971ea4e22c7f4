//! End-to-end scenarios across orchestrators, stores, caches and hooks.

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    use crate::checkpoint::{CheckpointKey, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
    use crate::config::OrchestratorConfig;
    use crate::core::{Artifact, ArtifactKind, ReviewVerdict};
    use crate::errors::{ReasonCode, StagegateError};
    use crate::events::{kinds, CollectingEventSink};
    use crate::pipeline::{
        Budget, BudgetExceeded, CouncilSpec, DecisionMode, OrchestratorBuilder, OutputCache, PipelineStage,
        Policy, RefineOnFailure, StepSummary,
    };
    use crate::stages::{ProducerRegistry, ReviewerRegistry};
    use crate::testing::{
        assert_history_order, assert_ran_before, assert_stage_approved, assert_stage_failed, assert_state_has,
        fixtures, EchoProducer, EmptyProducer, FailingProducer, FailingReviewer, FixedReviewer, RecordingHook,
        ScriptedReviewer, SlowProducer, StaticProducer,
    };

    fn approving() -> Arc<FixedReviewer> {
        Arc::new(FixedReviewer::approving("editor", 0.95))
    }

    fn stage(name: &str, producer: &str, reviewer: &str) -> PipelineStage {
        PipelineStage::new(name, producer, reviewer, format!("Write {name}"))
    }

    #[tokio::test]
    async fn test_rejected_stage_is_recorded_and_run_continues() {
        let producers = ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text")));
        let reviewers = ReviewerRegistry::new()
            .with("harsh", Arc::new(FixedReviewer::rejecting("harsh", 0.5)))
            .with("editor", approving());
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .build_sequential()
            .unwrap();

        let stages = vec![stage("a", "writer", "harsh"), stage("b", "writer", "editor")];
        let result = orchestrator.run(&stages).await.unwrap();

        let first = &result.history[0];
        assert!(!first.approved);
        assert!((first.score - 0.5).abs() < f64::EPSILON);
        assert_eq!(first.error_reason, Some(ReasonCode::ExhaustedRetries));
        assert_eq!(first.attempts, 1);
        assert_stage_approved(&result, "b");
        assert_state_has(&result, "a.content");
        assert_state_has(&result, "a.review");
    }

    #[tokio::test]
    async fn test_retry_passes_feedback_to_next_attempt() {
        let echo = Arc::new(EchoProducer::new("echo"));
        let reviewer = Arc::new(ScriptedReviewer::new(
            "scripted",
            [
                ReviewVerdict::reject(0.4)
                    .with_summary("needs work")
                    .with_suggestion("add examples"),
                ReviewVerdict::approve(0.9),
            ],
        ));
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("echo", echo.clone()),
            ReviewerRegistry::new().with("scripted", reviewer),
        )
        .with_state_value("topic", serde_json::json!("lifetimes"))
        .with_event_sink(events.clone())
        .build_sequential()
        .unwrap();

        let stages = vec![PipelineStage::new(
            "draft",
            "echo",
            "scripted",
            "Draft {topic}. {feedback.summary}",
        )
        .with_max_retries(2)];
        let result = orchestrator.run(&stages).await.unwrap();

        assert_stage_approved(&result, "draft");
        assert_eq!(result.history[0].attempts, 2);

        let tasks = echo.tasks();
        assert_eq!(tasks[0], "Draft lifetimes. {feedback.summary}");
        assert_eq!(tasks[1], "Draft lifetimes. needs work");

        let requests = echo.requests();
        assert!(requests[0].feedback.is_none());
        let feedback = requests[1].feedback.as_ref().unwrap();
        assert_eq!(feedback.attempt, 1);
        assert_eq!(feedback.suggestions, vec!["add examples".to_string()]);

        assert_state_has(&result, "draft.last_review");
        assert_state_has(&result, "draft.last_output");
        let rejected = events.payloads_of(kinds::STEP_REJECTED);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0]["reason"], "advisor_reject");
    }

    #[tokio::test]
    async fn test_policy_retries_apply_when_stage_declares_none() {
        let reviewer = Arc::new(FixedReviewer::rejecting("harsh", 0.3));
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new().with("harsh", reviewer.clone()),
        )
        .with_policy(Policy::new().with_retries("drafting", 2))
        .with_config(OrchestratorConfig::new().with_cache(false))
        .build_sequential()
        .unwrap();

        let stages = vec![stage("a", "writer", "harsh").with_category("drafting")];
        let result = orchestrator.run(&stages).await.unwrap();

        assert_stage_failed(&result, "a", ReasonCode::ExhaustedRetries);
        assert_eq!(result.history[0].attempts, 3);
        assert_eq!(result.history[0].category, "drafting");
        assert_eq!(reviewer.calls(), 3);
    }

    #[tokio::test]
    async fn test_policy_threshold_overrides_producer_default() {
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new().with("lenient", Arc::new(FixedReviewer::approving("lenient", 0.7))),
        )
        .with_policy(Policy::new().with_threshold("default", 0.6))
        .build_sequential()
        .unwrap();

        let result = orchestrator
            .run(&[stage("a", "writer", "lenient")])
            .await
            .unwrap();
        assert_stage_approved(&result, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_sequential_run() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new()
                .with("fast", Arc::new(StaticProducer::new("fast", "done")))
                .with("slow", Arc::new(SlowProducer::new("slow", Duration::from_secs(60)))),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_policy(Policy::new().with_timeout("slow", 1.0))
        .with_checkpoint_store(store.clone())
        .with_run_id("run-timeout")
        .build_sequential()
        .unwrap();

        let stages = vec![
            stage("a", "fast", "editor"),
            stage("b", "slow", "editor").with_category("slow"),
            stage("c", "fast", "editor"),
        ];
        let err = orchestrator.run(&stages).await.unwrap_err();

        assert!(matches!(err, StagegateError::Timeout { ref stage, .. } if stage == "b"));
        assert_eq!(err.reason(), Some(ReasonCode::Timeout));
        assert_eq!(
            store.find_last_key("run-timeout").await.unwrap(),
            Some(CheckpointKey::new("run-timeout", 0))
        );
    }

    #[tokio::test]
    async fn test_invalid_output_aborts_sequential_run() {
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("empty", Arc::new(EmptyProducer::new("empty"))),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .build_sequential()
        .unwrap();

        let err = orchestrator
            .run(&[stage("a", "empty", "editor")])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(ReasonCode::InvalidOutput));
        assert_eq!(err.stage(), Some("a"));
    }

    #[tokio::test]
    async fn test_producer_and_reviewer_errors_abort_sequential_run() {
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new()
                .with("broken", Arc::new(FailingProducer::new("broken", "model offline")))
                .with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new()
                .with("editor", approving())
                .with("absent", Arc::new(FailingReviewer::new("absent"))),
        )
        .build_sequential()
        .unwrap();

        let err = orchestrator
            .run(&[stage("a", "broken", "editor")])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(ReasonCode::ProducerError));
        assert!(err.to_string().contains("model offline"));

        let err = orchestrator
            .run(&[stage("b", "writer", "absent")])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(ReasonCode::ReviewError));
    }

    #[tokio::test]
    async fn test_stage_budget_trips_on_sixth_stage() {
        let producer = Arc::new(StaticProducer::new("writer", "text"));
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", producer.clone()),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_policy(Policy::new().with_budget(Budget::new().with_max_stages(5)))
        .with_config(OrchestratorConfig::new().with_cache(false))
        .with_checkpoint_store(store.clone())
        .with_run_id("run-budget")
        .build_sequential()
        .unwrap();

        let names: Vec<String> = (0..7).map(|i| format!("s{i}")).collect();
        let stages: Vec<_> = names.iter().map(|n| stage(n, "writer", "editor")).collect();
        let err = orchestrator.run(&stages).await.unwrap_err();

        match err {
            StagegateError::BudgetExceeded { stage, source } => {
                assert_eq!(stage, "s5");
                assert_eq!(source, BudgetExceeded::Stages { observed: 6, limit: 5 });
            }
            other => panic!("expected budget error, got {other:?}"),
        }
        assert_eq!(producer.calls(), 6);
        assert_eq!(store.keys_for_run("run-budget").len(), 6);
    }

    #[tokio::test]
    async fn test_artifact_budget_trips_on_crossing_stage() {
        let producer = StaticProducer::new("writer", "text").with_artifact(Artifact::new(
            "a.txt",
            ArtifactKind::Text,
            "x".repeat(400),
        ));
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(producer)),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_policy(Policy::new().with_budget(Budget::new().with_max_artifact_bytes(1000)))
        .build_sequential()
        .unwrap();

        let stages = fixtures_with("writer", &["a", "b", "c", "d"]);
        let err = orchestrator.run(&stages).await.unwrap_err();

        match err {
            StagegateError::BudgetExceeded { stage, source } => {
                assert_eq!(stage, "c");
                assert_eq!(
                    source,
                    BudgetExceeded::ArtifactBytes {
                        observed: 1215,
                        limit: 1000
                    }
                );
            }
            other => panic!("expected budget error, got {other:?}"),
        }
    }

    fn fixtures_with(producer: &str, names: &[&str]) -> Vec<PipelineStage> {
        names.iter().map(|n| stage(n, producer, "editor")).collect()
    }

    #[tokio::test]
    async fn test_output_cache_serves_identical_inputs() {
        let cache = Arc::new(OutputCache::new());
        let producer = Arc::new(StaticProducer::new("writer", "text"));
        let build = |run_id: &str, config: OrchestratorConfig| {
            OrchestratorBuilder::new(
                ProducerRegistry::new().with("writer", producer.clone()),
                ReviewerRegistry::new().with("editor", approving()),
            )
            .with_cache(cache.clone())
            .with_config(config)
            .with_run_id(run_id)
            .build_sequential()
            .unwrap()
        };
        let stages = fixtures_with("writer", &["a", "b"]);

        let first = build("run-1", OrchestratorConfig::new()).run(&stages).await.unwrap();
        assert_eq!(producer.calls(), 2);
        assert!(first.history.iter().all(|s| s.cache_hits == 0));

        let second = build("run-2", OrchestratorConfig::new()).run(&stages).await.unwrap();
        assert_eq!(producer.calls(), 2);
        assert!(second.history.iter().all(|s| s.cache_hits == 1));
        assert_eq!(first.content("a"), second.content("a"));

        build("run-3", OrchestratorConfig::new().with_cache(false))
            .run(&stages)
            .await
            .unwrap();
        assert_eq!(producer.calls(), 4);
    }

    #[tokio::test]
    async fn test_rerun_records_previous_content_and_diff() {
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "new line"))),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_state_value("draft.content", serde_json::json!("old line"))
        .build_sequential()
        .unwrap();

        let result = orchestrator
            .run(&[stage("draft", "writer", "editor")])
            .await
            .unwrap();

        assert_eq!(result.state["draft.previous_content"], "old line");
        assert_eq!(result.state["draft.diff"], serde_json::json!({ "added": 1, "removed": 1 }));
        assert_eq!(result.content("draft"), Some("new line"));
    }

    #[tokio::test]
    async fn test_checkpoint_extras_and_resume() {
        let store: Arc<dyn CheckpointStore> = Arc::new(InMemoryCheckpointStore::new());
        let stages = vec![
            stage("s1", "p1", "editor"),
            stage("s2", "p2", "editor"),
            stage("s3", "p3", "editor"),
        ];

        let first = OrchestratorBuilder::new(
            ProducerRegistry::new()
                .with("p1", Arc::new(StaticProducer::new("p1", "one")))
                .with("p2", Arc::new(StaticProducer::new("p2", "two")))
                .with("p3", Arc::new(FailingProducer::new("p3", "flaky"))),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_checkpoint_store(store.clone())
        .with_run_id("run-resume")
        .build_sequential()
        .unwrap();
        assert_err!(first.run(&stages).await);

        let saved = store
            .load(&CheckpointKey::new("run-resume", 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.stage, "s2");
        assert_eq!(saved.extra["mode"], "sequential");
        assert_eq!(saved.extra["attempts"], 1);
        let summary: StepSummary = serde_json::from_value(saved.extra["summary"].clone()).unwrap();
        assert_eq!(summary.stage, "s2");

        let p1 = Arc::new(StaticProducer::new("p1", "one"));
        let p3 = Arc::new(StaticProducer::new("p3", "three"));
        let second = OrchestratorBuilder::new(
            ProducerRegistry::new()
                .with("p1", p1.clone())
                .with("p2", Arc::new(StaticProducer::new("p2", "two")))
                .with("p3", p3.clone()),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_checkpoint_store(store.clone())
        .with_run_id("run-resume")
        .build_sequential()
        .unwrap();
        let result = second.resume(&stages).await.unwrap();

        assert_history_order(&result, &["s1", "s2", "s3"]);
        assert_eq!(p1.calls(), 0);
        assert_eq!(p3.calls(), 1);
        assert_eq!(result.content("s1"), Some("one"));
        assert_eq!(result.content("s3"), Some("three"));
    }

    #[tokio::test]
    async fn test_file_checkpoints_are_written_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileCheckpointStore::new(dir.path()));
        let (producers, reviewers) = fixtures::registries();
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .with_checkpoint_store(store.clone())
            .with_run_id("run-files")
            .build_sequential()
            .unwrap();

        orchestrator
            .run(&fixtures::linear_stages(&["a", "b"]))
            .await
            .unwrap();

        assert_eq!(
            store.find_last_key("run-files").await.unwrap(),
            Some(CheckpointKey::new("run-files", 1))
        );
        let last = store
            .load(&CheckpointKey::new("run-files", 1))
            .await
            .unwrap()
            .unwrap();
        assert!(last.state_snapshot.contains_key("a.content"));
        assert!(last.state_snapshot.contains_key("b.content"));
    }

    #[tokio::test]
    async fn test_council_majority_tie_is_rejected() {
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new()
                .with("yes", Arc::new(FixedReviewer::approving("yes", 0.9)))
                .with("no", Arc::new(FixedReviewer::rejecting("no", 0.4)))
                .with("editor", approving()),
        )
        .with_policy(
            Policy::new()
                .with_threshold("review", 0.8)
                .with_council("review", CouncilSpec::new(DecisionMode::Majority, ["yes", "no"])),
        )
        .build_sequential()
        .unwrap();

        let stages = vec![stage("a", "writer", "editor").with_category("review")];
        let result = orchestrator.run(&stages).await.unwrap();

        assert_stage_failed(&result, "a", ReasonCode::ExhaustedRetries);
        assert_eq!(result.history[0].reviewer, "council[yes,no]");
        assert!((result.history[0].score - 0.65).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hooks_run_after_every_step() {
        let hook = Arc::new(RecordingHook::new());
        let producers = ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text")));
        let reviewers = ReviewerRegistry::new()
            .with("editor", approving())
            .with("harsh", Arc::new(FixedReviewer::rejecting("harsh", 0.2)));
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .with_hook(hook.clone())
            .build_sequential()
            .unwrap();

        orchestrator
            .run(&[stage("a", "writer", "editor"), stage("b", "writer", "harsh")])
            .await
            .unwrap();

        assert_eq!(
            hook.seen(),
            vec![("a".to_string(), true), ("b".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_failing_hook_aborts_sequential_run_only() {
        let (producers, reviewers) = fixtures::registries();
        let sequential = OrchestratorBuilder::new(producers, reviewers)
            .with_hook(Arc::new(RecordingHook::failing()))
            .build_sequential()
            .unwrap();
        let err = sequential
            .run(&fixtures::linear_stages(&["a", "b"]))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some(ReasonCode::HookError));
        assert_eq!(err.stage(), Some("a"));

        let (producers, reviewers) = fixtures::registries();
        let events = Arc::new(CollectingEventSink::new());
        let waves = OrchestratorBuilder::new(producers, reviewers)
            .with_hook(Arc::new(RecordingHook::failing()))
            .with_event_sink(events.clone())
            .build_waves()
            .unwrap();
        let result = assert_ok!(waves.run(&fixtures::linear_stages(&["a", "b"])).await);
        assert_eq!(result.history.len(), 2);

        let errors = events.payloads_of(kinds::ERROR);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["reason"], "hook_error");
        assert!(errors.iter().any(|e| e["stage"] == "b"));
    }

    #[tokio::test]
    async fn test_refine_on_failure_hook_stores_refinement() {
        let refiner = RefineOnFailure::new(
            Arc::new(StaticProducer::new("refiner", "a sharper task")),
            Arc::new(FixedReviewer::approving("critic", 0.9)),
        );
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new().with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new().with("harsh", Arc::new(FixedReviewer::rejecting("harsh", 0.2))),
        )
        .with_hook(Arc::new(refiner))
        .build_sequential()
        .unwrap();

        let result = orchestrator
            .run(&[stage("draft", "writer", "harsh")])
            .await
            .unwrap();
        assert_eq!(result.state["draft.refined_prompt.content"], "a sharper task");
    }

    #[tokio::test]
    async fn test_events_carry_run_id() {
        let events = Arc::new(CollectingEventSink::new());
        let (producers, reviewers) = fixtures::registries();
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .with_event_sink(events.clone())
            .with_run_id("run-events")
            .build_sequential()
            .unwrap();

        orchestrator
            .run(&fixtures::linear_stages(&["a"]))
            .await
            .unwrap();

        assert_eq!(
            events.types(),
            vec![
                kinds::STEP_START,
                kinds::STEP_ATTEMPT,
                kinds::STEP_COMPLETED,
                kinds::RUN_COMPLETED,
            ]
        );
        for (_, payload) in events.events() {
            assert_eq!(payload.unwrap()["run_id"], "run-events");
        }
    }

    #[tokio::test]
    async fn test_waves_run_dependencies_first() {
        let events = Arc::new(CollectingEventSink::new());
        let (producers, reviewers) = fixtures::registries();
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .with_event_sink(events.clone())
            .build_waves()
            .unwrap();

        let stages = vec![
            fixtures::stage("d").with_dependencies(["b", "c"]),
            fixtures::stage("b").with_dependency("a"),
            fixtures::stage("a"),
            fixtures::stage("c").with_dependency("a"),
        ];
        let result = orchestrator.run(&stages).await.unwrap();

        assert_history_order(&result, &["a", "b", "c", "d"]);
        assert_ran_before(&result, "b", "d");
        assert_eq!(events.count_of(kinds::WAVE_START), 3);
        assert!(result.all_approved());
    }

    #[tokio::test]
    async fn test_waves_report_cycles_and_unknown_dependencies() {
        let (producers, reviewers) = fixtures::registries();
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .build_waves()
            .unwrap();

        let stages = vec![
            fixtures::stage("a").with_dependency("b"),
            fixtures::stage("b").with_dependency("a"),
            fixtures::stage("free"),
            fixtures::stage("orphan").with_dependency("ghost"),
        ];
        let err = orchestrator.run(&stages).await.unwrap_err();

        match err {
            StagegateError::UnsatisfiedDependencies(e) => {
                assert_eq!(e.unreached, vec!["a", "b", "orphan"]);
            }
            other => panic!("expected unsatisfied dependencies, got {other:?}"),
        }
        assert!(orchestrator.state().contains_key("free.content"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wave_failures_are_stage_local() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let orchestrator = OrchestratorBuilder::new(
            ProducerRegistry::new()
                .with("slow", Arc::new(SlowProducer::new("slow", Duration::from_secs(30))))
                .with("empty", Arc::new(EmptyProducer::new("empty")))
                .with("writer", Arc::new(StaticProducer::new("writer", "text"))),
            ReviewerRegistry::new().with("editor", approving()),
        )
        .with_config(OrchestratorConfig::new().with_default_timeout(Duration::from_secs(1)))
        .with_checkpoint_store(store.clone())
        .with_run_id("run-waves")
        .build_waves()
        .unwrap();

        let stages = vec![
            stage("slow", "slow", "editor"),
            stage("empty", "empty", "editor"),
            stage("after", "writer", "editor").with_dependencies(["slow", "empty"]),
        ];
        let result = orchestrator.run(&stages).await.unwrap();

        assert_stage_failed(&result, "slow", ReasonCode::Timeout);
        assert_stage_failed(&result, "empty", ReasonCode::InvalidOutput);
        assert_stage_approved(&result, "after");
        assert_eq!(store.keys_for_run("run-waves").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wave_concurrency_is_bounded_by_workers() {
        let stages: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| stage(n, "slow", "editor"))
            .collect();

        for (workers, expected_secs) in [(3, 1), (1, 3)] {
            let orchestrator = OrchestratorBuilder::new(
                ProducerRegistry::new().with("slow", Arc::new(SlowProducer::new("slow", Duration::from_secs(1)))),
                ReviewerRegistry::new().with("editor", approving()),
            )
            .with_config(OrchestratorConfig::new().with_max_workers(workers))
            .build_waves()
            .unwrap();

            let started = tokio::time::Instant::now();
            let result = orchestrator.run(&stages).await.unwrap();
            let elapsed = started.elapsed();

            assert_eq!(result.history.len(), 3);
            assert!(elapsed >= Duration::from_secs(expected_secs));
            assert!(elapsed < Duration::from_secs(expected_secs) + Duration::from_millis(500));
        }
    }

    #[tokio::test]
    async fn test_wave_budget_is_checked_per_wave() {
        let (producers, reviewers) = fixtures::registries();
        let orchestrator = OrchestratorBuilder::new(producers, reviewers)
            .with_policy(Policy::new().with_budget(Budget::new().with_max_stages(2)))
            .build_waves()
            .unwrap();

        let stages = vec![
            fixtures::stage("a"),
            fixtures::stage("b"),
            fixtures::stage("c"),
            fixtures::stage("d").with_dependency("a"),
        ];
        let err = orchestrator.run(&stages).await.unwrap_err();

        assert_eq!(err.reason(), Some(ReasonCode::BudgetExceeded));
        assert_eq!(err.stage(), Some("c"));
        assert!(!orchestrator.state().contains_key("d.content"));
    }
}
