//! Shared wiring for scenario tests: a server behaviour bound to the scripted controller

#![allow(dead_code)]

use crate::mocks::{MockClientFactory, MockCloudClient, MockFramework, RecordingListener};
use cf_deploy_core::client::{AppState, CloudApplication, CloudCredentials};
use cf_deploy_core::config::DeployConfig;
use cf_deploy_core::events::BehaviourEventType;
use cf_deploy_core::framework::{ModuleRef, ModuleResource};
use cf_deploy_core::{ServerBehaviour, ServerBehaviourBuilder};
use std::sync::Arc;

pub const SERVER: &str = "dev";

pub struct TestServer {
    pub behaviour: ServerBehaviour,
    pub cloud: MockCloudClient,
    pub factory: MockClientFactory,
    pub framework: MockFramework,
    pub listener: Arc<RecordingListener>,
}

pub fn credentials() -> CloudCredentials {
    CloudCredentials::new("https://api.example.com", "dev@example.com", "secret")
}

/// Defaults, with the background refresh off so only the test drives remote calls
pub fn test_config() -> DeployConfig {
    let mut config = DeployConfig::default();
    config.refresh.enabled = false;
    config
}

pub fn web_module() -> ModuleRef {
    ModuleRef::new("project-web", "web")
}

pub fn web_resources() -> Vec<ModuleResource> {
    vec![
        ModuleResource::in_memory("index.html", b"<html><body>hello</body></html>".to_vec()),
        ModuleResource::in_memory("app.js", b"console.log('v1')".to_vec()),
    ]
}

pub fn started_app(name: &str) -> CloudApplication {
    let mut app = CloudApplication::new(name, AppState::Started);
    app.running_instances = 1;
    app
}

pub fn build_server(
    cloud: MockCloudClient,
    framework: MockFramework,
    configure: impl FnOnce(ServerBehaviourBuilder) -> ServerBehaviourBuilder,
) -> TestServer {
    cf_deploy_core::logging::init_structured_logging();

    let factory = MockClientFactory::new(cloud.clone());
    let builder = ServerBehaviour::builder(
        SERVER,
        Arc::new(factory.clone()),
        Arc::new(framework.clone()),
        credentials(),
    )
    .config(test_config());
    let behaviour = configure(builder).build().expect("behaviour should build");

    let listener = Arc::new(RecordingListener::default());
    behaviour
        .events()
        .add_listener(listener.clone(), &BehaviourEventType::ALL);

    TestServer {
        behaviour,
        cloud,
        factory,
        framework,
        listener,
    }
}

/// A server whose `web` module has resources and whose controller reports `updating` twice
/// after every start
pub fn web_server() -> TestServer {
    let cloud = MockCloudClient::new().with_updating_polls(2);
    let framework = MockFramework::new().with_resources(&web_module(), web_resources());
    build_server(cloud, framework, |builder| builder)
}
