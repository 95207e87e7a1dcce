//! Client for a cloud-storage and design-automation service.
//!
//! The crate covers the full provisioning and execution surface: token
//! sessions, bucket/object reconciliation with signed-URL issuance,
//! package and activity publishing behind aliases, work-item submission
//! with a bounded poll loop, and result downloads. All wire traffic
//! goes through the [`Transport`] seam so the whole stack runs against
//! the in-memory fake in tests.

pub mod activity;
pub mod bundle;
pub mod fetch;
pub mod memory;
pub mod session;
pub mod storage;
pub mod transport;
pub mod workitem;

mod resources;

pub use activity::{ActivityProvisioner, ActivitySpec, ProvisionedActivity};
pub use bundle::{PackageProvisioner, PackageSpec, ProvisionedPackage};
pub use fetch::ResultFetcher;
pub use memory::{MemoryTransport, PollStep};
pub use session::{fetch_nickname, SessionClient};
pub use storage::StorageProvisioner;
pub use transport::{ApiRequest, ApiResponse, Body, HttpTransport, Method, Transport};
pub use workitem::WorkItemOrchestrator;
