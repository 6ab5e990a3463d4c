//! Connection establishment, retry, health, and teardown.

use super::helpers::{
    Harness, ManualClock, TestManager, catalog, connected, harness, harness_with, http_server,
    quiet_settings, register, server_id,
};
use futures::future::join_all;
use pilotis::tool_registry::{
    adapters::{InMemoryMcpClientFactory, memory::InMemoryMcpServerRegistry},
    domain::{
        AuthAdvisory, McpServerConfig, McpServerStatus, McpTransport, StdioTransportConfig,
    },
    ports::{McpClientError, TransportPlan},
    services::{McpConnectionManager, McpManagerError, ProcessEnvironment},
};
use rstest::rstest;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn refused() -> McpClientError {
    McpClientError::Connection("connection refused".to_owned())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn concurrent_connects_open_one_session(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;

    let outcomes = join_all((0..10).map(|_| {
        let manager = Arc::clone(&harness.manager);
        let target = id.clone();
        tokio::spawn(async move { manager.connect_server(&target).await })
    }))
    .await;

    for outcome in outcomes {
        let connected_now = outcome
            .expect("task should not panic")
            .expect("connect should not error");
        assert!(connected_now);
    }
    let stats = harness.factory.stats(&id);
    assert_eq!(stats.builds, 1);
    assert_eq!(stats.connects, 1);
    assert_eq!(harness.factory.open_sessions(&id), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connecting_twice_reuses_the_session(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;

    let again = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(again);
    assert_eq!(harness.factory.stats(&id).connects, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn connecting_unknown_server_is_an_error(harness: Harness) {
    let result = harness.manager.connect_server(&server_id("ghost")).await;

    assert!(matches!(result, Err(McpManagerError::NotRegistered(_))));
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.fail_next_connects(
        &id,
        [
            refused(),
            McpClientError::Http {
                status: 503,
                message: "service unavailable".to_owned(),
                retry_after: None,
            },
        ],
    );
    let started = Instant::now();

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(connected_now);
    assert_eq!(harness.factory.stats(&id).builds, 3);
    assert!(started.elapsed() >= Duration::from_secs(6));
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.status, McpServerStatus::Active);
    assert!(status.last_error.is_none());
    assert!(status.last_connected.is_some());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn exhausted_attempts_mark_the_server_failed(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness
        .factory
        .fail_next_connects(&id, [refused(), refused(), refused()]);

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(!connected_now);
    assert_eq!(harness.factory.stats(&id).builds, 3);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.status, McpServerStatus::Error);
    assert!(!status.connected);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("Could not reach"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn authentication_failures_are_not_retried(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.fail_next_connects(
        &id,
        [McpClientError::Http {
            status: 401,
            message: "unauthorized".to_owned(),
            retry_after: None,
        }],
    );

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(!connected_now);
    assert_eq!(harness.factory.stats(&id).builds, 1);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("credentials"))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn slow_handshakes_time_out(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.set_connect_delay(Duration::from_secs(31));

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(!connected_now);
    assert_eq!(harness.factory.stats(&id).builds, 3);
    assert_eq!(harness.factory.open_sessions(&id), 0);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("timed out"))
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancelled_connect_leaves_no_session(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.set_connect_delay(Duration::from_secs(5));

    let cancelled =
        tokio::time::timeout(Duration::from_secs(1), harness.manager.connect_server(&id)).await;

    assert!(cancelled.is_err());
    assert_eq!(harness.factory.open_sessions(&id), 0);
    assert!(
        harness
            .manager
            .connect_server(&id)
            .await
            .expect("connect should not error")
    );
    assert_eq!(harness.factory.open_sessions(&id), 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn ping_failures_fall_back_to_tool_listing(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.set_ping_failure(
        &id,
        Some(McpClientError::Server {
            code: -32601,
            message: "method not found".to_owned(),
        }),
    );

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(connected_now);
    assert_eq!(harness.factory.stats(&id).tool_listings, 2);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_liveness_closes_the_session(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.set_ping_failure(
        &id,
        Some(McpClientError::Server {
            code: -32601,
            message: "method not found".to_owned(),
        }),
    );
    harness.factory.fail_listing(
        &id,
        pilotis::tool_registry::adapters::ListingKind::Tools,
        McpClientError::Server {
            code: -32603,
            message: "internal error".to_owned(),
        },
    );

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(!connected_now);
    let stats = harness.factory.stats(&id);
    assert_eq!(stats.connects, 1);
    assert_eq!(stats.closes, 1);
    assert_eq!(harness.factory.open_sessions(&id), 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnect_closes_session_and_keeps_capabilities(harness: Harness) {
    let id = connected(&harness, "search", &["query", "fetch"]).await;

    assert!(harness.manager.disconnect_server(&id).await);

    assert_eq!(harness.factory.open_sessions(&id), 0);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.status, McpServerStatus::Inactive);
    assert!(!status.connected);
    assert_eq!(status.counts.tools, 2);

    let tools = harness
        .manager
        .get_tools(Some(&id))
        .await
        .expect("tools should load");
    assert_eq!(tools.len(), 2);
    assert_eq!(harness.factory.stats(&id).connects, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn health_check_tracks_ping_outcome(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;
    assert!(harness.manager.health_check(&id).await);

    harness.factory.set_ping_failure(&id, Some(refused()));
    assert!(!harness.manager.health_check(&id).await);

    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.status, McpServerStatus::Error);
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("health check failed"))
    );

    harness.factory.set_ping_failure(&id, None);
    assert!(harness.manager.health_check(&id).await);
    let recovered = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(recovered.status, McpServerStatus::Active);
    assert!(recovered.last_error.is_none());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn re_registration_keeps_a_live_connection_visible(harness: Harness) {
    let id = connected(&harness, "search", &["query"]).await;

    harness
        .manager
        .register_server(http_server("search", &harness.clock))
        .await
        .expect("registration should succeed");

    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.status, McpServerStatus::Active);
    assert!(status.connected);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn registration_reports_missing_credentials(harness: Harness) {
    let server = McpServerConfig::new(
        server_id("open"),
        "Open server",
        McpTransport::http("https://open.example.com/mcp").expect("valid url"),
        &*harness.clock,
    )
    .expect("valid config");

    let advisories = harness
        .manager
        .register_server(server)
        .await
        .expect("registration should succeed");

    assert_eq!(advisories, vec![AuthAdvisory::MissingCredentials]);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_closes_every_connection(harness: Harness) {
    let search = connected(&harness, "search", &["query"]).await;
    let files = connected(&harness, "files", &["read"]).await;

    assert_eq!(harness.manager.shutdown().await, 2);

    let servers = harness
        .manager
        .list_servers()
        .await
        .expect("listing should succeed");
    let ids: Vec<_> = servers.iter().map(|status| status.server_id.clone()).collect();
    assert_eq!(ids, vec![files.clone(), search.clone()]);
    assert!(servers.iter().all(|status| !status.connected));
    assert!(
        servers
            .iter()
            .all(|status| status.status == McpServerStatus::Inactive)
    );
    assert_eq!(harness.factory.open_sessions(&search), 0);
    assert_eq!(harness.factory.open_sessions(&files), 0);
}

fn stdio_manager(
    environment: ProcessEnvironment,
) -> (Arc<TestManager>, Arc<InMemoryMcpClientFactory>, Arc<ManualClock>) {
    let factory = Arc::new(InMemoryMcpClientFactory::new());
    let clock = Arc::new(ManualClock::new());
    let manager = McpConnectionManager::with_settings(
        Arc::new(InMemoryMcpServerRegistry::new()),
        Arc::clone(&factory),
        Arc::clone(&clock),
        quiet_settings(),
    )
    .with_environment(environment);
    (Arc::new(manager), factory, clock)
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn stdio_commands_resolve_on_the_inherited_path() {
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::TempDir::new().expect("temp dir");
    let program = bin.path().join("mcp-files");
    std::fs::write(&program, "#!/bin/sh\n").expect("script should be written");
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755))
        .expect("permissions should be set");
    let environment = ProcessEnvironment::new(
        BTreeMap::from([(
            "PATH".to_owned(),
            bin.path().to_string_lossy().into_owned(),
        )]),
        bin.path(),
    );
    let (manager, factory, clock) = stdio_manager(environment);
    let id = server_id("files");
    factory.set_catalog(&id, catalog(&["read"]));
    let transport = McpTransport::Stdio(
        StdioTransportConfig::new("mcp-files")
            .expect("valid command")
            .with_env([("LOG_LEVEL".to_owned(), "debug".to_owned())]),
    );
    manager
        .register_server(
            McpServerConfig::new(id.clone(), "Files", transport, &*clock).expect("valid config"),
        )
        .await
        .expect("registration should succeed");

    assert!(
        manager
            .connect_server(&id)
            .await
            .expect("connect should not error")
    );

    let Some(TransportPlan::Stdio(plan)) = factory.last_plan(&id) else {
        panic!("expected a STDIO plan");
    };
    assert_eq!(plan.program, program);
    assert_eq!(plan.env.get("LOG_LEVEL").map(String::as_str), Some("debug"));
    assert!(plan.env.contains_key("PATH"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolvable_stdio_commands_fail_without_building() {
    let (manager, factory, clock) = stdio_manager(ProcessEnvironment::default());
    let id = server_id("files");
    manager
        .register_server(
            McpServerConfig::new(
                id.clone(),
                "Files",
                McpTransport::stdio("definitely-not-installed").expect("valid command"),
                &*clock,
            )
            .expect("valid config"),
        )
        .await
        .expect("registration should succeed");

    let connected_now = manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(!connected_now);
    assert_eq!(factory.stats(&id).builds, 0);
    let status = manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(
        status
            .last_error
            .as_deref()
            .is_some_and(|message| message.contains("definitely-not-installed"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn status_of_unknown_server_is_an_error() {
    let harness = harness_with(quiet_settings());

    let result = harness.manager.get_server_status(&server_id("ghost")).await;

    assert!(matches!(result, Err(McpManagerError::NotRegistered(_))));
}
