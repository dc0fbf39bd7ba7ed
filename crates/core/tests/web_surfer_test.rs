// Integration tests for WebSurferTool
//
// Construction and validation, registration on caller/executor pairs, and a
// full browsing task driven by scripted LLM responses against a local HTTP
// server standing in for Wikipedia.
//
// Run with: cargo test -p fastagency-core --test web_surfer_test

use fastagency_core::web_surfer::{BROWSER_TOOL_NAMES, CONTINUE_TASK_FUNCTION, CREATE_TASK_FUNCTION};
use fastagency_core::{
    Agent, FastAgencyError, HumanInputMode, LlmConfig, LlmConfigEntry, RunOptions,
    ScriptedLlmDriver, ScriptedResponse, SummaryMethod, ToolCall, Toolable, WebSurferTool,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ZAGREB_TASK: &str =
    "Visit https://en.wikipedia.org/wiki/Zagreb and tell me when Zagreb became a free royal city.";

const ZAGREB_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Zagreb - Wikipedia</title></head>
<body>
<h1>Zagreb</h1>
<p>Zagreb is the capital and largest city of Croatia.</p>
<h2>History</h2>
<p>In 1242 Zagreb became a free royal city under the Golden Bull of King Bela IV.</p>
<a href="/wiki/Croatia">Croatia</a>
</body>
</html>"#;

fn llm_config() -> LlmConfig {
    LlmConfig::new(vec![LlmConfigEntry::openai("gpt-4o-mini", "sk-test")]).unwrap()
}

fn empty_llm_config() -> LlmConfig {
    LlmConfig {
        config_list: vec![],
        temperature: None,
        timeout: None,
        cache_seed: None,
    }
}

fn caller_and_executor(suffix: &str) -> (Agent, Agent) {
    let caller = Agent::conversable(format!("Assistant_Agent{}", suffix))
        .llm_config(llm_config())
        .human_input_mode(HumanInputMode::Never)
        .build()
        .unwrap();
    let executor = Agent::user_proxy(format!("User_Agent{}", suffix))
        .human_input_mode(HumanInputMode::Never)
        .build()
        .unwrap();
    (caller, executor)
}

async fn zagreb_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wiki/Zagreb"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html; charset=utf-8")
                .set_body_string(ZAGREB_PAGE),
        )
        .mount(&server)
        .await;
    server
}

fn summarizer_answer(successful: bool) -> String {
    json!({
        "task": ZAGREB_TASK,
        "is_successful": successful,
        "short_answer": "Zagreb became a free royal city in 1242.",
        "long_answer": "According to the History section, Zagreb became a free royal city in 1242 under the Golden Bull of King Bela IV.",
        "visited_links": []
    })
    .to_string()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_constructor() {
    let tool = WebSurferTool::new("test", llm_config(), llm_config()).unwrap();

    assert_eq!(tool.name_prefix(), "test");
    assert_eq!(tool.llm_config(), &llm_config());
    assert_eq!(tool.summarizer_llm_config(), &llm_config());
}

#[test]
fn test_constructor_rejects_empty_config_list() {
    let err = WebSurferTool::new("test", empty_llm_config(), llm_config()).unwrap_err();

    assert!(err.is_validation());
    assert!(
        err.to_string()
            .contains("config_list\n  List should have at least 1 item after validation, not 0"),
        "unexpected message: {}",
        err
    );
}

#[test]
fn test_llm_config_rejects_empty_config_list_on_deserialize() {
    let err = serde_json::from_value::<LlmConfig>(json!({"config_list": []})).unwrap_err();
    assert!(err
        .to_string()
        .contains("List should have at least 1 item after validation, not 0"));
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_register() {
    let tool = WebSurferTool::new("test", llm_config(), llm_config()).unwrap();
    let (caller, executor) = caller_and_executor("");

    tool.register(&caller, &executor).unwrap();

    let offered: Vec<String> = caller.llm_tools().into_iter().map(|d| d.name).collect();
    assert_eq!(offered, vec![CREATE_TASK_FUNCTION, CONTINUE_TASK_FUNCTION]);
    assert!(executor.can_execute(CREATE_TASK_FUNCTION));
    assert!(executor.can_execute(CONTINUE_TASK_FUNCTION));
    assert!(executor.llm_tools().is_empty());
}

#[test]
fn test_register_on_several_pairs() {
    let tool = WebSurferTool::new("test", llm_config(), llm_config()).unwrap();
    let (caller_a, executor_a) = caller_and_executor("_a");
    let (caller_b, executor_b) = caller_and_executor("_b");

    tool.register(&caller_a, &executor_a).unwrap();
    tool.register(&caller_b, &executor_b).unwrap();
    // Registering twice on the same pair does not duplicate functions
    tool.register(&caller_a, &executor_a).unwrap();

    assert_eq!(caller_a.llm_tools().len(), 2);
    assert_eq!(caller_b.llm_tools().len(), 2);
    assert_eq!(executor_a.executable_tools(), executor_b.executable_tools());
}

#[test]
fn test_register_requires_llm_capable_caller() {
    let tool = WebSurferTool::new("test", llm_config(), llm_config()).unwrap();
    let (_, executor) = caller_and_executor("");
    let caller = Agent::user_proxy("No_LLM_Agent").build().unwrap();

    let err = tool.register(&caller, &executor).unwrap_err();

    assert!(matches!(err, FastAgencyError::Configuration(_)));
    assert!(!executor.can_execute(CREATE_TASK_FUNCTION));
}

// ============================================================================
// Browsing tasks
// ============================================================================

#[tokio::test]
async fn test_zagreb_task_with_scripted_llm() {
    let server = zagreb_server().await;
    let page_url = format!("{}/wiki/Zagreb", server.uri());

    let outer = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call(CREATE_TASK_FUNCTION, json!({"task": ZAGREB_TASK})),
        ScriptedResponse::text("Zagreb became a free royal city in 1242. TERMINATE"),
        ScriptedResponse::text("Zagreb became a free royal city in 1242."),
    ]);
    let inner = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call("visit_page", json!({"url": page_url})),
        ScriptedResponse::text("The page says Zagreb became a free royal city in 1242. TERMINATE"),
        ScriptedResponse::text(summarizer_answer(true)),
    ]);

    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner.clone()))
        .build()
        .unwrap();

    let assistant = Agent::conversable("Assistant_Agent")
        .system_message("You are a useful assistant")
        .human_input_mode(HumanInputMode::Never)
        .driver(Arc::new(outer.clone()))
        .build()
        .unwrap();
    let user_agent = Agent::user_proxy("User_Agent")
        .human_input_mode(HumanInputMode::Never)
        .build()
        .unwrap();
    tool.register(&assistant, &user_agent).unwrap();

    let chat = user_agent
        .run(
            &assistant,
            ZAGREB_TASK,
            RunOptions::new()
                .summary_method(SummaryMethod::ReflectionWithLlm)
                .max_turns(3),
        )
        .await
        .unwrap();

    let contents = chat.message_contents();
    assert!(contents
        .iter()
        .any(|c| c.contains("We have successfully completed the task")));
    assert!(contents.iter().any(|c| c.contains(&page_url)));

    let summary = chat.summary(Duration::from_secs(5)).await.unwrap();
    assert!(summary.to_lowercase().contains("1242"));

    // The inner surfer was offered the browser tools and saw the page text
    let requests = inner.requests();
    assert_eq!(requests.len(), 3);
    let mut offered = requests[0].tool_names();
    offered.sort();
    let mut expected: Vec<String> = BROWSER_TOOL_NAMES.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(offered, expected);
    assert!(requests[1]
        .messages
        .iter()
        .any(|m| m.content.contains("In 1242 Zagreb became a free royal city")));

    assert_eq!(tool.last_task("Assistant_Agent").as_deref(), Some(ZAGREB_TASK));
    assert_eq!(outer.remaining(), 0);
}

#[tokio::test]
async fn test_continue_task_reuses_browsing_session() {
    let server = zagreb_server().await;
    let page_url = format!("{}/wiki/Zagreb", server.uri());

    let inner = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call("visit_page", json!({"url": page_url})),
        ScriptedResponse::text("Found it. TERMINATE"),
        ScriptedResponse::text(summarizer_answer(true)),
        ScriptedResponse::text("The king was Bela IV. TERMINATE"),
        ScriptedResponse::text(summarizer_answer(true)),
    ]);
    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner.clone()))
        .build()
        .unwrap();

    tool.create_task("Assistant_Agent", ZAGREB_TASK).await.unwrap();
    let answer = tool
        .continue_task("Assistant_Agent", "Which king granted it?")
        .await
        .unwrap();

    assert!(answer.is_successful);
    assert_eq!(answer.visited_links, vec![page_url]);
    assert!(tool
        .last_task("Assistant_Agent")
        .unwrap()
        .ends_with("Additional instructions: Which king granted it?"));

    // The continued conversation carries the earlier transcript
    let continued = &inner.requests()[3];
    assert!(continued
        .messages
        .iter()
        .any(|m| m.content.contains("Found it.")));
}

#[tokio::test]
async fn test_sessions_are_kept_per_caller() {
    let server = zagreb_server().await;

    let inner = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call("visit_page", json!({"url": format!("{}/wiki/Zagreb", server.uri())})),
        ScriptedResponse::text("Found it. TERMINATE"),
        ScriptedResponse::text(summarizer_answer(true)),
    ]);
    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner.clone()))
        .build()
        .unwrap();
    let (caller_a, executor_a) = caller_and_executor("_a");
    let (caller_b, executor_b) = caller_and_executor("_b");
    tool.register(&caller_a, &executor_a).unwrap();
    tool.register(&caller_b, &executor_b).unwrap();

    let created = executor_a
        .execute_tool(&ToolCall::new(CREATE_TASK_FUNCTION, json!({"task": ZAGREB_TASK})))
        .await;
    assert!(created
        .content()
        .contains("We have successfully completed the task"));

    // Pair B has no task of its own to continue
    let continued = executor_b
        .execute_tool(&ToolCall::new(CONTINUE_TASK_FUNCTION, json!({"message": "And the king?"})))
        .await;
    assert!(continued.content().contains("There is no task to continue"));
    assert_eq!(inner.call_count(), 3);

    assert_eq!(tool.last_task("Assistant_Agent_a").as_deref(), Some(ZAGREB_TASK));
    assert!(tool.last_task("Assistant_Agent_b").is_none());
}

#[tokio::test]
async fn test_summarizer_retries_malformed_output() {
    let server = zagreb_server().await;

    let inner = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call("visit_page", json!({"url": format!("{}/wiki/Zagreb", server.uri())})),
        ScriptedResponse::text("Found it. TERMINATE"),
        ScriptedResponse::text("Sure! Zagreb became a free royal city in 1242."),
        ScriptedResponse::text(summarizer_answer(true)),
    ]);
    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner.clone()))
        .build()
        .unwrap();

    let answer = tool.create_task("Assistant_Agent", ZAGREB_TASK).await.unwrap();

    assert!(answer.short_answer.contains("1242"));
    let retry = &inner.requests()[3];
    assert!(retry
        .messages
        .last()
        .unwrap()
        .content
        .contains("could not be parsed"));
}

#[tokio::test]
async fn test_failed_task_report() {
    let server = zagreb_server().await;

    let inner = ScriptedLlmDriver::new(vec![
        ScriptedResponse::tool_call("visit_page", json!({"url": format!("{}/wiki/Missing", server.uri())})),
        ScriptedResponse::text("The page does not exist. TERMINATE"),
        ScriptedResponse::text(summarizer_answer(false)),
    ]);
    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner.clone()))
        .build()
        .unwrap();

    let answer = tool.create_task("Assistant_Agent", ZAGREB_TASK).await.unwrap();
    assert!(!answer.is_successful);
    assert!(answer
        .to_report()
        .starts_with("We have failed to complete the task:"));

    // The 404 came back to the surfer as a tool error, not a crash
    let after_visit = &inner.requests()[1];
    assert!(after_visit
        .messages
        .iter()
        .any(|m| m.content.contains("404")));
}

#[tokio::test]
async fn test_llm_failure_is_hidden_from_caller() {
    let inner = ScriptedLlmDriver::new(vec![ScriptedResponse::error(
        "upstream returned 500 with secret request id",
    )]);
    let tool = WebSurferTool::builder("test", llm_config(), llm_config())
        .driver(Arc::new(inner.clone()))
        .summarizer_driver(Arc::new(inner))
        .build()
        .unwrap();

    let executor = Agent::user_proxy("User_Agent")
        .human_input_mode(HumanInputMode::Never)
        .build()
        .unwrap();
    let caller = Agent::conversable("Assistant_Agent")
        .driver(Arc::new(ScriptedLlmDriver::fixed("ok")))
        .build()
        .unwrap();
    tool.register(&caller, &executor).unwrap();

    let result = executor
        .execute_tool(&ToolCall::new(
            CREATE_TASK_FUNCTION,
            json!({"task": ZAGREB_TASK}),
        ))
        .await;

    let content = result.content();
    assert!(content.contains("An internal error occurred"));
    assert!(!content.contains("secret"));
}
