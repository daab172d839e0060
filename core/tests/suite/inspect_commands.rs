#![allow(clippy::unwrap_used, clippy::expect_used)]

use core_test_support::InMemoryArtifactStore;
use core_test_support::ScriptedModel;
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
use vischat_core::ModelResponse;
use vischat_core::inspect::InspectCommand;
use vischat_core::inspect::run_inspect;
use vischat_core::tools::ToolCategory;
use vischat_core::tools::ToolRegistry;

/// A session whose only turn had one failed boxplot followed by a
/// successful data generation.
async fn session_with_one_error(home: &TempDir) -> ConversationSession {
    let config = load_default_config_for_test(home);
    let model = ScriptedModel::new([
        tool_call("call_1", "functional_boxplot", json!({"palette": "viridis"})),
        tool_call("call_2", "generate_curves", json!({"n_curves": 5})),
        ModelResponse::text("I generated data first."),
    ]);
    let registry = ToolRegistry::builder()
        .register(
            spec("functional_boxplot"),
            ToolCategory::Visualization,
            failing_tool("No data to plot."),
        )
        .register(spec("generate_curves"), ToolCategory::Data, generate_curves_tool())
        .build();
    let mut session = session_for_test(&config, model, registry, InMemoryArtifactStore::new());
    session.send("plot a boxplot").await.unwrap();
    session
}

async fn run(session: &mut ConversationSession, input: &str) -> String {
    let command = InspectCommand::parse(input)
        .expect("slash command")
        .expect("valid command");
    run_inspect(session, command).await
}

#[tokio::test]
async fn errors_and_trace_show_the_journal() {
    let home = TempDir::new().unwrap();
    let mut session = session_with_one_error(&home).await;

    let errors = run(&mut session, "/errors").await;
    assert!(errors.contains("#1"));
    assert!(errors.contains("functional_boxplot"));
    assert!(errors.contains("No data to plot."));
    assert!(!errors.contains("Traceback"));

    let trace = run(&mut session, "/trace 1").await;
    assert!(trace.contains("Error #1 (tool_execution_failure)"));
    assert!(trace.contains("Category: computation"));
    assert!(trace.contains("Traceback"));
    assert!(trace.contains("\"arguments\": \"{\\\"palette\\\":\\\"viridis\\\"}\""));

    assert_eq!(
        run(&mut session, "/trace 99").await,
        "No error #99 in the journal."
    );
}

#[tokio::test]
async fn debug_toggle_changes_output_mode() {
    let home = TempDir::new().unwrap();
    let mut session = session_with_one_error(&home).await;

    assert_eq!(run(&mut session, "/debug on").await, "Debug mode on.");
    assert!(session.mode().debug);
    assert_eq!(run(&mut session, "/verbose on").await, "Verbose mode on.");
    assert!(session.mode().verbose);
    assert_eq!(run(&mut session, "/debug off").await, "Debug mode off.");
    assert!(!session.mode().debug);
}

#[tokio::test]
async fn stats_and_context_summarize_the_session() {
    let home = TempDir::new().unwrap();
    let mut session = session_with_one_error(&home).await;

    let stats = run(&mut session, "/stats").await;
    assert!(stats.starts_with("Tool executions: 2 (1 succeeded, 1 failed, 50% success)"));
    assert!(stats.contains("Auto-fixes: 0"));
    assert!(stats.contains("functional_boxplot: 0 ok, 1 failed"));

    let context = run(&mut session, "/context").await;
    assert!(context.contains("Current artifact: /tmp/vischat/curves_0.npy"));
    assert!(context.contains("Last visualization: none"));
}

#[tokio::test]
async fn reset_command_keeps_the_journal() {
    let home = TempDir::new().unwrap();
    let mut session = session_with_one_error(&home).await;

    run(&mut session, "/reset").await;

    assert!(session.state().messages().is_empty());
    let errors = run(&mut session, "/errors").await;
    assert!(errors.contains("#1"));
}
