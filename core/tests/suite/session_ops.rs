#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use core_test_support::InMemoryArtifactStore;
use core_test_support::RecordingTool;
use core_test_support::ScriptedModel;
use core_test_support::boxplot_tool;
use core_test_support::failing_tool;
use core_test_support::generate_curves_tool;
use core_test_support::load_default_config_for_test;
use core_test_support::session_for_test;
use core_test_support::spec;
use core_test_support::tool_call;
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use vischat_core::ConversationSession;
use vischat_core::FsArtifactStore;
use vischat_core::ModelResponse;
use vischat_core::tools::ToolCategory;
use vischat_core::tools::ToolOutcome;
use vischat_core::tools::ToolPayload;
use vischat_core::tools::ToolRegistry;
use vischat_core::tools::context::DataPayload;
use vischat_core::tools::context::FailureKind;

fn registry() -> ToolRegistry {
    ToolRegistry::builder()
        .register(spec("generate_curves"), ToolCategory::Data, generate_curves_tool())
        .register(spec("functional_boxplot"), ToolCategory::Visualization, boxplot_tool())
        .register(spec("broken_tool"), ToolCategory::Analysis, failing_tool("Analysis failed."))
        .build()
}

fn plot_script(model: &ScriptedModel) {
    model.push(tool_call("call_1", "generate_curves", json!({"n_curves": 20})));
    model.push(tool_call("call_2", "functional_boxplot", json!({"palette": "viridis"})));
    model.push(ModelResponse::text("Here is the boxplot."));
}

#[tokio::test]
async fn context_summary_reflects_the_turn() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let model = Arc::new(ScriptedModel::default());
    plot_script(&model);
    let mut session = session_for_test(&config, model, registry(), InMemoryArtifactStore::new());

    session.send("generate and plot").await.unwrap();
    let summary = session.context_summary();

    assert_eq!(summary.user_turns, 1);
    assert_eq!(summary.message_count, 6);
    assert_eq!(
        summary.current_artifact_path.as_deref(),
        Some("/tmp/vischat/curves_0.npy")
    );
    assert_eq!(
        summary.last_visualization.map(|vis| vis.tool_name),
        Some("functional_boxplot".to_string())
    );
    assert_eq!(summary.session_artifact_count, 2);
    assert_eq!(summary.executions, 2);
    assert_eq!(summary.consecutive_error_count, 0);
}

#[tokio::test]
async fn reset_replaces_state_but_keeps_files_and_journal() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let model = Arc::new(ScriptedModel::default());
    plot_script(&model);
    model.push(tool_call("call_3", "broken_tool", json!({})));
    model.push(ModelResponse::text("The analysis failed."));
    let store = InMemoryArtifactStore::new();
    let mut session = session_for_test(&config, model, registry(), store.clone());

    session.send("generate and plot").await.unwrap();
    session.send("analyse it").await.unwrap();
    session.reset();

    assert!(session.state().messages().is_empty());
    assert!(session.state().last_visualization().is_none());
    assert_eq!(session.state().session_artifacts().count(), 0);
    assert_eq!(session.last_response(), None);
    assert_eq!(session.journal().len(), 1);
    assert!(store.deleted().is_empty());
}

#[tokio::test]
async fn clear_deletes_session_artifacts_then_resets() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let model = Arc::new(ScriptedModel::default());
    plot_script(&model);
    let store = InMemoryArtifactStore::failing_on(&["/tmp/vischat/boxplot_0.png"]);
    let mut session = session_for_test(&config, model, registry(), store.clone());

    session.send("generate and plot").await.unwrap();
    let report = session.clear().await;

    assert_eq!(report.removed, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "/tmp/vischat/boxplot_0.png");
    assert_eq!(store.deleted(), vec!["/tmp/vischat/curves_0.npy".to_string()]);
    assert!(session.state().messages().is_empty());
    assert_eq!(session.state().current_artifact_path(), None);
}

#[tokio::test]
async fn clear_removes_files_from_disk() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let artifact = home.path().join("curves.npy");
    std::fs::write(&artifact, b"data").unwrap();
    let artifact_path = artifact.to_string_lossy().to_string();

    let generate = RecordingTool::new({
        let artifact_path = artifact_path.clone();
        move |_, _| {
            Ok(ToolOutcome::success(
                "Generated.",
                ToolPayload::Data(DataPayload {
                    artifact_path: artifact_path.clone(),
                    summary: None,
                }),
            ))
        }
    });
    let registry = ToolRegistry::builder()
        .register(spec("generate_curves"), ToolCategory::Data, generate)
        .build();
    let model = ScriptedModel::new([
        tool_call("call_1", "generate_curves", json!({})),
        ModelResponse::text("Generated."),
    ]);
    let mut session =
        ConversationSession::new(&config, model, Arc::new(registry), Arc::new(FsArtifactStore));

    session.send("generate").await.unwrap();
    let report = session.clear().await;

    assert_eq!(report.removed, 1);
    assert!(report.failed.is_empty());
    assert!(!artifact.exists());
}

#[tokio::test]
async fn independent_sessions_share_only_the_registry() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let registry = Arc::new(registry());
    let first_model = Arc::new(ScriptedModel::default());
    plot_script(&first_model);
    let second_model = ScriptedModel::new([ModelResponse::text("Hello!")]);

    let mut first = ConversationSession::new(
        &config,
        first_model,
        Arc::clone(&registry),
        InMemoryArtifactStore::new(),
    );
    let mut second = ConversationSession::new(
        &config,
        second_model,
        Arc::clone(&registry),
        InMemoryArtifactStore::new(),
    );

    let (a, b) = tokio::join!(first.send("generate and plot"), second.send("hi"));
    a.unwrap();
    b.unwrap();

    assert!(first.state().last_visualization().is_some());
    assert!(second.state().last_visualization().is_none());
    assert_eq!(second.last_response(), Some("Hello!"));
}

#[tokio::test]
async fn stats_after_reset_only_count_the_new_history() {
    let home = TempDir::new().unwrap();
    let config = load_default_config_for_test(&home);
    let model = ScriptedModel::new([
        tool_call("call_1", "generate_curves", json!({"n_curves": 0})),
        tool_call("call_2", "generate_curves", json!({"n_curves": 20})),
        ModelResponse::text("Generated after fixing the count."),
        tool_call("call_3", "generate_curves", json!({"n_curves": 5})),
        ModelResponse::text("Generated."),
    ]);
    let generate = RecordingTool::new(|_, call_number| {
        if call_number == 0 {
            return Ok(ToolOutcome::failure(
                FailureKind::InvalidArguments,
                "n_curves must be positive.",
            ));
        }
        Ok(ToolOutcome::success(
            "Generated.",
            ToolPayload::Data(DataPayload {
                artifact_path: format!("/tmp/vischat/curves_{call_number}.npy"),
                summary: None,
            }),
        ))
    });
    let registry = ToolRegistry::builder()
        .register(spec("generate_curves"), ToolCategory::Data, generate)
        .build();
    let mut session = session_for_test(&config, model, registry, InMemoryArtifactStore::new());

    session.send("generate curves").await.unwrap();
    assert_eq!(session.stats().auto_fixes, 1);

    session.reset();
    session.send("generate 5 more").await.unwrap();
    let stats = session.stats();

    assert_eq!(stats.total, 1);
    assert_eq!(stats.failures, 0);
    assert_eq!(stats.auto_fixes, 0);
    assert!(session.journal().get_last().unwrap().auto_fixed());
}
