//! Test doubles for the remote controller and the host framework

#![allow(dead_code)]

pub mod mock_cloud;
pub mod mock_framework;

pub use mock_cloud::{MockClientFactory, MockCloudClient, MockCloudState};
pub use mock_framework::{
    MockDebugger, MockFramework, MockTunnels, RecordingListener, ScriptedProvider,
};
