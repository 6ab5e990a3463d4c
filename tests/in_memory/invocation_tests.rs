//! Tool invocation: caching, retry classes, circuit breaking, resources.

use super::helpers::{Harness, args, connected, harness, register};
use chrono::TimeDelta;
use pilotis::tool_registry::{
    domain::{FailureKind, McpServerId, ToolCallOutput},
    ports::{McpClientError, McpClientResult},
    services::McpManagerError,
};
use rstest::rstest;
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;

fn timed_out() -> McpClientResult<ToolCallOutput> {
    Err(McpClientError::Timeout("deadline exceeded".to_owned()))
}

async fn call_numbered(
    harness: &Harness,
    id: &McpServerId,
    n: u32,
) -> Result<ToolCallOutput, McpManagerError> {
    harness
        .manager
        .call_tool(id, "query", args(json!({"n": n})))
        .await
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn repeated_calls_are_served_from_cache(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;

    let first = call_numbered(&harness, &id, 1).await.expect("call should succeed");
    let second = call_numbered(&harness, &id, 1).await.expect("call should succeed");
    call_numbered(&harness, &id, 2).await.expect("call should succeed");

    assert_eq!(first, second);
    assert_eq!(harness.factory.stats(&id).tool_calls, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cached_results_expire_after_the_ttl(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    call_numbered(&harness, &id, 1).await.expect("call should succeed");

    harness.clock.advance(TimeDelta::seconds(30));
    call_numbered(&harness, &id, 1).await.expect("call should succeed");
    assert_eq!(harness.factory.stats(&id).tool_calls, 1);

    harness.clock.advance(TimeDelta::seconds(1));
    call_numbered(&harness, &id, 1).await.expect("call should succeed");
    assert_eq!(harness.factory.stats(&id).tool_calls, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn purge_drops_only_expired_results(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    call_numbered(&harness, &id, 1).await.expect("call should succeed");
    harness.clock.advance(TimeDelta::seconds(20));
    call_numbered(&harness, &id, 2).await.expect("call should succeed");
    harness.clock.advance(TimeDelta::seconds(15));

    assert_eq!(harness.manager.purge_expired_results(), 1);
    assert_eq!(harness.manager.purge_expired_results(), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calls_connect_on_demand(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;

    let output = call_numbered(&harness, &id, 1).await.expect("call should succeed");

    assert_eq!(output.structured_content, Some(json!({"n": 1})));
    assert_eq!(harness.factory.stats(&id).connects, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_servers_report_not_connected(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.fail_builds(
        &id,
        McpClientError::InvalidConfiguration("unsupported transport".to_owned()),
    );

    let result = call_numbered(&harness, &id, 1).await;

    assert!(matches!(
        result,
        Err(McpManagerError::NotConnected { reason, .. }) if reason.contains("misconfigured")
    ));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn hanging_tools_time_out_and_open_the_circuit(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.hang_tool(&id, "query");

    for n in 0..3 {
        let result = call_numbered(&harness, &id, n).await;
        assert!(matches!(
            result,
            Err(McpManagerError::RetriesExhausted {
                kind: FailureKind::Timeout,
                attempts: 2,
                ..
            })
        ));
    }
    assert_eq!(harness.factory.stats(&id).tool_calls, 6);

    let rejected = call_numbered(&harness, &id, 4).await;

    assert!(matches!(
        rejected,
        Err(McpManagerError::CircuitOpen { failures: 3, .. })
    ));
    assert_eq!(harness.factory.stats(&id).tool_calls, 6);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn success_resets_the_failure_count(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness
        .factory
        .script_tool_results(&id, "query", [timed_out(), timed_out()]);
    assert!(call_numbered(&harness, &id, 1).await.is_err());
    call_numbered(&harness, &id, 2).await.expect("call should succeed");

    harness.factory.script_tool_results(
        &id,
        "query",
        [timed_out(), timed_out(), timed_out(), timed_out()],
    );
    assert!(call_numbered(&harness, &id, 3).await.is_err());
    assert!(call_numbered(&harness, &id, 4).await.is_err());

    call_numbered(&harness, &id, 5)
        .await
        .expect("circuit should still be closed");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn open_circuit_admits_a_trial_after_cooldown(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness
        .factory
        .script_tool_results(&id, "query", (0..6).map(|_| timed_out()));
    for n in 0..3 {
        assert!(call_numbered(&harness, &id, n).await.is_err());
    }
    assert!(matches!(
        call_numbered(&harness, &id, 10).await,
        Err(McpManagerError::CircuitOpen { .. })
    ));

    harness.clock.advance(TimeDelta::seconds(61));

    call_numbered(&harness, &id, 11)
        .await
        .expect("trial call should succeed");
    call_numbered(&harness, &id, 12)
        .await
        .expect("circuit should be closed again");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn authentication_failures_are_never_retried_or_counted(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        (0..4).map(|_| {
            Err(McpClientError::Http {
                status: 401,
                message: "invalid token".to_owned(),
                retry_after: None,
            })
        }),
    );
    let started = Instant::now();

    for n in 0..4 {
        let result = call_numbered(&harness, &id, n).await;
        assert!(matches!(result, Err(McpManagerError::Unauthorized { .. })));
    }

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(harness.factory.stats(&id).tool_calls, 4);
}

#[rstest]
#[case::unknown_tool("unknown tool: query", true)]
#[case::tool_logic("division by zero", false)]
#[tokio::test(flavor = "multi_thread")]
async fn server_errors_are_returned_without_retry(
    harness: Harness,
    #[case] message: &str,
    #[case] not_found: bool,
) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        [Err(McpClientError::Server {
            code: -32000,
            message: message.to_owned(),
        })],
    );

    let result = call_numbered(&harness, &id, 1).await;

    if not_found {
        assert!(matches!(result, Err(McpManagerError::NotFound { .. })));
    } else {
        assert!(matches!(result, Err(McpManagerError::ToolFailed { .. })));
    }
    assert_eq!(harness.factory.stats(&id).tool_calls, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reported_tool_errors_keep_the_connection(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        [Err(McpClientError::ToolReported {
            message: "no results".to_owned(),
        })],
    );

    let result = call_numbered(&harness, &id, 1).await;
    let output = call_numbered(&harness, &id, 2)
        .await
        .expect("follow-up call should succeed");

    assert!(matches!(result, Err(McpManagerError::ToolFailed { .. })));
    assert_eq!(output.structured_content, Some(json!({"n": 2})));
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(status.connected);
    let stats = harness.factory.stats(&id);
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.tool_calls, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn reported_tool_errors_never_open_the_circuit(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        (0..4).map(|_| {
            Err(McpClientError::ToolReported {
                message: "no results".to_owned(),
            })
        }),
    );

    for n in 0..4 {
        let result = call_numbered(&harness, &id, n).await;
        assert!(matches!(result, Err(McpManagerError::ToolFailed { .. })));
    }
    call_numbered(&harness, &id, 4)
        .await
        .expect("circuit should stay closed");

    let stats = harness.factory.stats(&id);
    assert_eq!(stats.tool_calls, 5);
    assert_eq!(stats.connects, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn generic_failures_count_towards_the_circuit(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        (0..3).map(|_| Err(McpClientError::Other("unexpected payload".to_owned()))),
    );

    for n in 0..3 {
        let result = call_numbered(&harness, &id, n).await;
        assert!(matches!(result, Err(McpManagerError::Failed { .. })));
    }

    assert!(matches!(
        call_numbered(&harness, &id, 3).await,
        Err(McpManagerError::CircuitOpen { failures: 3, .. })
    ));
    assert_eq!(harness.factory.stats(&id).tool_calls, 3);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn broken_connections_are_reestablished(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.reset_connections(&id);

    let output = call_numbered(&harness, &id, 1)
        .await
        .expect("call should succeed after reconnecting");

    assert_eq!(output.structured_content, Some(json!({"n": 1})));
    assert_eq!(harness.factory.stats(&id).connects, 2);
    assert_eq!(harness.factory.open_sessions(&id), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn not_connected_errors_reconnect_and_retry(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        [Err(McpClientError::Other("Not connected".to_owned()))],
    );

    let output = call_numbered(&harness, &id, 1)
        .await
        .expect("call should succeed after reconnecting");

    assert_eq!(output.structured_content, Some(json!({"n": 1})));
    let stats = harness.factory.stats(&id);
    assert_eq!(stats.connects, 2);
    assert_eq!(stats.tool_calls, 2);
    assert_eq!(harness.factory.open_sessions(&id), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn rate_limits_honour_retry_after(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.script_tool_results(
        &id,
        "query",
        [Err(McpClientError::Http {
            status: 429,
            message: "too many requests".to_owned(),
            retry_after: Some(Duration::from_secs(5)),
        })],
    );
    let started = Instant::now();

    call_numbered(&harness, &id, 1)
        .await
        .expect("retry should succeed");

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(harness.factory.stats(&id).tool_calls, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resources_and_prompts_are_fetched(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;

    let resource = harness
        .manager
        .read_resource(&id, "file:///readme.md")
        .await
        .expect("resource should be readable");
    let prompt = harness
        .manager
        .get_prompt(&id, "summarise", args(json!({"text": "hello"})))
        .await
        .expect("prompt should render");

    assert_eq!(resource.uri, "file:///readme.md");
    assert_eq!(resource.contents.len(), 1);
    assert_eq!(prompt.description.as_deref(), Some("Summarises text"));
    assert_eq!(prompt.messages.len(), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_resources_and_prompts_are_not_found(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;

    let resource = harness.manager.read_resource(&id, "file:///missing").await;
    let prompt = harness
        .manager
        .get_prompt(&id, "translate", args(json!({})))
        .await;

    assert!(matches!(resource, Err(McpManagerError::NotFound { .. })));
    assert!(matches!(prompt, Err(McpManagerError::NotFound { .. })));
    assert_eq!(harness.factory.open_sessions(&id), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn resource_reads_drop_broken_connections(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    harness.factory.reset_connections(&id);

    let result = harness.manager.read_resource(&id, "file:///readme.md").await;

    assert!(matches!(result, Err(McpManagerError::Failed { .. })));
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(!status.connected);

    harness
        .manager
        .read_resource(&id, "file:///readme.md")
        .await
        .expect("next read should reconnect");
    assert_eq!(harness.factory.stats(&id).connects, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn full_flow_from_registration_to_shutdown(harness: Harness) {
    let id = register(&harness, "search", &["query", "fetch"]).await;
    assert!(
        harness
            .manager
            .connect_server(&id)
            .await
            .expect("connect should not error")
    );

    let tools = harness
        .manager
        .get_tools(None)
        .await
        .expect("tools should load");
    assert_eq!(tools.len(), 2);

    let qualified = tools[1].qualified_name.clone();
    let first = harness
        .manager
        .call_qualified_tool(&qualified, args(json!({"url": "https://example.com"})))
        .await
        .expect("call should succeed");
    let repeat = harness
        .manager
        .call_qualified_tool(&qualified, args(json!({"url": "https://example.com"})))
        .await
        .expect("cached call should succeed");

    assert_eq!(first, repeat);
    assert_eq!(harness.factory.stats(&id).tool_calls, 1);
    assert_eq!(harness.manager.shutdown().await, 1);
    assert_eq!(harness.factory.open_sessions(&id), 0);
}
