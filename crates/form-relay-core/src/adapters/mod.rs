//! # Infrastructure Adapters
//!
//! In-memory implementations of configuration storage and the activity log,
//! and the HTTP client for the CRM custom-object API.

pub mod crm_client;
pub mod memory_activity_log;
pub mod memory_configuration_store;

pub use crm_client::{CrmClient, CrmClientConfig};
pub use memory_activity_log::InMemoryActivityLog;
pub use memory_configuration_store::InMemoryConfigurationStore;
