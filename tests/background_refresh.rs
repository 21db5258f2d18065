//! Background refresh: reconciliation, pausing around operations and the periodic cycle.

mod common;
mod mocks;

use cf_deploy_core::client::AppState;
use cf_deploy_core::events::RefreshScope;
use cf_deploy_core::framework::{ModuleRef, RunState};
use cf_deploy_core::operations::OperationMonitor;
use common::{build_server, started_app, test_config, web_module, web_resources};
use mocks::{MockCloudClient, MockFramework};
use std::time::Duration;

fn two_apps() -> MockCloudClient {
    MockCloudClient::new()
        .with_application(started_app("api"))
        .with_application(started_app("worker"))
}

#[tokio::test(start_paused = true)]
async fn test_connect_logs_in_and_loads_remote_applications() {
    let server = build_server(two_apps(), MockFramework::new(), |builder| builder);
    let mut refreshes = server.behaviour.refresh().subscribe();

    server.behaviour.connect().await.expect("connect should succeed");

    assert_eq!(server.cloud.get_state().login_count, 1);
    assert_eq!(server.behaviour.registry().len(), 2);
    assert_eq!(server.behaviour.refresh().pass_count(), 1);
    assert_eq!(server.behaviour.server_state(), RunState::Started);

    let event = refreshes.try_recv().expect("a refresh event should be published");
    assert_eq!(event.scope, RefreshScope::All);
    assert_eq!(event.server, "dev");

    let api = server
        .behaviour
        .module(&ModuleRef::external("api"))
        .expect("remote application should get a module");
    assert!(api.local().externally_managed);
    assert_eq!(api.application().map(|app| app.state), Some(AppState::Started));

    server.behaviour.disconnect().await;
    assert_eq!(server.behaviour.server_state(), RunState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_application_is_kept_until_module_refresh() {
    let server = build_server(two_apps(), MockFramework::new(), |builder| builder);
    server.behaviour.refresh_all().await.unwrap();

    server.cloud.remove_application("worker");
    let summary = server.behaviour.refresh_all().await.unwrap();

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.missing, 1);
    assert_eq!(summary.cleared, 0);
    let worker = ModuleRef::external("worker");
    assert!(server.behaviour.module(&worker).unwrap().is_deployed());

    server.behaviour.refresh_module(&worker).await.unwrap();
    let worker = server.behaviour.module(&worker).unwrap();
    assert!(!worker.is_deployed());
    assert!(worker.stats().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_is_swallowed() {
    let server = build_server(two_apps(), MockFramework::new(), |builder| builder);
    server.cloud.fail_next_with_connection(1_000);

    assert!(server.behaviour.refresh_all().await.is_none());
    assert_eq!(server.behaviour.refresh().pass_count(), 0);
    assert!(server.behaviour.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_module_refresh_loads_instance_stats_for_started_apps() {
    let server = build_server(two_apps(), MockFramework::new(), |builder| builder);
    server.behaviour.refresh_all().await.unwrap();
    let api = ModuleRef::external("api");

    server.behaviour.refresh_module(&api).await.unwrap();

    let module = server.behaviour.module(&api).unwrap();
    assert_eq!(module.stats().map(|stats| stats.running()), Some(1));
    assert_eq!(module.instances().map(|info| info.instances.len()), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_periodic_refresh_skips_passes_while_paused() {
    let mut config = test_config();
    config.refresh.enabled = true;
    config.refresh.interval_ms = 60_000;
    let server = build_server(two_apps(), MockFramework::new(), |builder| builder.config(config));
    let refresh = server.behaviour.refresh();

    server.behaviour.connect().await.unwrap();
    assert!(refresh.is_running());
    assert_eq!(refresh.pass_count(), 1);

    let guard = refresh.pause().await;
    tokio::time::sleep(Duration::from_secs(130)).await;
    assert_eq!(refresh.pass_count(), 1);

    drop(guard);
    assert_eq!(refresh.resume_count(), 1);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(refresh.pass_count(), 2);

    server.behaviour.disconnect().await;
    assert!(!refresh.is_running());
}

#[tokio::test(start_paused = true)]
async fn test_pause_waits_for_in_flight_periodic_pass() {
    let mut config = test_config();
    config.refresh.enabled = true;
    config.refresh.interval_ms = 60_000;
    let server = build_server(
        two_apps().with_list_delay(Duration::from_secs(10)),
        MockFramework::new(),
        |builder| builder.config(config),
    );
    let refresh = server.behaviour.refresh();

    server.behaviour.connect().await.unwrap();
    assert_eq!(refresh.pass_count(), 1);

    // Wait until the periodic pass has issued its listing and is still reconciling
    while server.cloud.call_count("applications") < 2 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(refresh.pass_count(), 1);

    let guard = refresh.pause().await;
    assert_eq!(refresh.pass_count(), 2);
    assert!(refresh.is_paused());

    drop(guard);
    server.behaviour.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_operations_resume_refresh_once() {
    let api = ModuleRef::new("project-api", "api");
    let framework = MockFramework::new()
        .with_resources(&web_module(), web_resources())
        .with_resources(&api, web_resources());
    let server = build_server(
        MockCloudClient::new().with_updating_polls(3),
        framework,
        |builder| builder,
    );
    let monitor = OperationMonitor::new();
    let web = web_module();

    let (first, second) = tokio::join!(
        server.behaviour.start_module(&web, &monitor),
        server.behaviour.start_module(&api, &monitor),
    );

    first.expect("web should start");
    second.expect("api should start");
    let refresh = server.behaviour.refresh();
    assert!(!refresh.is_paused());
    assert_eq!(refresh.resume_count(), 1);
    assert_eq!(server.behaviour.registry().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_operation_publishes_module_scoped_refresh() {
    let server = build_server(
        MockCloudClient::new(),
        MockFramework::new().with_resources(&web_module(), web_resources()),
        |builder| builder,
    );
    let mut refreshes = server.behaviour.refresh().subscribe();
    let module = web_module();

    server
        .behaviour
        .start_module(&module, &OperationMonitor::new())
        .await
        .unwrap();

    let id = server.behaviour.module(&module).unwrap().id();
    let event = refreshes.try_recv().unwrap();
    assert_eq!(event.scope, RefreshScope::Module(id));
}
