//! # Resilience Module
//!
//! Fault tolerance for remote calls: typed retry policies, the retrying request layers, and
//! the server connectivity state they maintain as a side effect.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use cf_deploy_core::resilience::{ClientRequest, StagingAware};
//! use cf_deploy_core::client::CloudClient;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(client: Arc<dyn CloudClient>) -> cf_deploy_core::error::DeployResult<()> {
//! let request = ClientRequest::new(
//!     "fetch web",
//!     Duration::from_secs(60),
//!     Arc::new(StagingAware::new(Duration::from_secs(1))),
//! );
//! let app = request
//!     .run(&client, |client| async move { client.application("web").await })
//!     .await?;
//! println!("{} is {:?}", app.name, app.state);
//! # Ok(())
//! # }
//! ```

pub mod policy;
pub mod request;
pub mod server_state;

pub use policy::{
    AppInStoppedStateAware, ConnectionRetry, FixedInterval, NoRetry, RetryPolicy, StagingAware,
    TransientRetry,
};
pub use request::{AuthenticatingRequest, BehaviourRequest, ClientRequest, RequestFactory};
pub use server_state::ServerStateTracker;
