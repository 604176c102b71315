pub mod config;
pub mod error;
pub mod es;
pub mod mail;
pub mod policy;
pub mod reports;
pub mod schedule;
pub mod scopes;
pub mod types;
pub mod window;

pub use config::Config;
pub use error::PipelineError;
pub use policy::{Decision, PolicyLists};
pub use scopes::ScopeRegistry;
pub use types::{AuthEvent, EventDoc, NotificationRecord, ScopeDescriptor};
