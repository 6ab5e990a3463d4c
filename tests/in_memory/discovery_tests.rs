//! Capability discovery and the aggregated capability views.

use super::helpers::{Harness, args, connected, harness, register, server_id};
use pilotis::tool_registry::{
    adapters::ListingKind,
    ports::McpClientError,
    services::McpManagerError,
};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn union_is_ordered_by_server_and_qualified(harness: Harness) {
    connected(&harness, "search", &["query", "fetch"]).await;
    connected(&harness, "files", &["read"]).await;

    let tools = harness
        .manager
        .get_tools(None)
        .await
        .expect("tools should load");

    let names: Vec<_> = tools.iter().map(|tool| tool.qualified_name.as_str()).collect();
    assert_eq!(names, vec!["files__read", "search__query", "search__fetch"]);
    assert!(tools.iter().all(|tool| {
        tool.qualified_name
            .ends_with(&format!("__{}", tool.item.name()))
    }));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scoped_views_only_show_one_server(harness: Harness) {
    let search = connected(&harness, "search", &["query"]).await;
    connected(&harness, "files", &["read"]).await;

    let resources = harness
        .manager
        .get_resources(Some(&search))
        .await
        .expect("resources should load");
    let prompts = harness
        .manager
        .get_prompts(Some(&search))
        .await
        .expect("prompts should load");

    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].server_id, search);
    assert_eq!(resources[0].item.uri(), "file:///readme.md");
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].qualified_name, "search__summarise");
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_optional_listings_do_not_fail_the_connection(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    let broken = McpClientError::Server {
        code: -32601,
        message: "method not found".to_owned(),
    };
    harness
        .factory
        .fail_listing(&id, ListingKind::Resources, broken.clone());
    harness.factory.fail_listing(&id, ListingKind::Prompts, broken);

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(connected_now);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert_eq!(status.counts.tools, 1);
    assert_eq!(status.counts.resources, 0);
    assert_eq!(status.counts.prompts, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failed_tool_listing_leaves_the_server_connected(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.fail_listing(
        &id,
        ListingKind::Tools,
        McpClientError::Other("listing exploded".to_owned()),
    );

    let connected_now = harness
        .manager
        .connect_server(&id)
        .await
        .expect("connect should not error");

    assert!(connected_now);
    let status = harness
        .manager
        .get_server_status(&id)
        .await
        .expect("status should load");
    assert!(status.connected);
    assert_eq!(status.counts.tools, 0);
    assert_eq!(status.counts.prompts, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn scoped_listing_connects_on_demand(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;

    let tools = harness
        .manager
        .get_tools(Some(&id))
        .await
        .expect("tools should load");

    assert_eq!(tools.len(), 1);
    assert_eq!(harness.factory.stats(&id).connects, 1);

    let union = harness
        .manager
        .get_tools(None)
        .await
        .expect("tools should load");
    assert_eq!(union, tools);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unreachable_server_lists_nothing(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;
    harness.factory.fail_builds(
        &id,
        McpClientError::InvalidConfiguration("unsupported transport".to_owned()),
    );

    let tools = harness
        .manager
        .get_tools(Some(&id))
        .await
        .expect("listing should not error");

    assert!(tools.is_empty());
    assert_eq!(harness.factory.stats(&id).builds, 1);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn union_does_not_connect_anything(harness: Harness) {
    let id = register(&harness, "search", &["query"]).await;

    let tools = harness
        .manager
        .get_tools(None)
        .await
        .expect("tools should load");

    assert!(tools.is_empty());
    assert_eq!(harness.factory.stats(&id).builds, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn listing_an_unknown_server_is_an_error(harness: Harness) {
    let result = harness.manager.get_tools(Some(&server_id("ghost"))).await;

    assert!(matches!(result, Err(McpManagerError::NotRegistered(_))));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn qualified_names_route_to_the_owning_server(harness: Harness) {
    let search = connected(&harness, "search", &["query"]).await;
    let files = connected(&harness, "files", &["query"]).await;

    let output = harness
        .manager
        .call_qualified_tool("files__query", args(json!({"path": "/tmp"})))
        .await
        .expect("call should succeed");

    assert_eq!(output.structured_content, Some(json!({"path": "/tmp"})));
    assert_eq!(harness.factory.stats(&files).tool_calls, 1);
    assert_eq!(harness.factory.stats(&search).tool_calls, 0);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_qualified_names_are_rejected(harness: Harness) {
    connected(&harness, "search", &["query"]).await;

    let result = harness
        .manager
        .call_qualified_tool("search__missing", args(json!({})))
        .await;

    assert!(matches!(
        result,
        Err(McpManagerError::UnknownQualifiedTool(name)) if name == "search__missing"
    ));
}
