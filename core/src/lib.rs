pub mod caller;
pub mod config;
pub mod config_env;
pub mod connection_manager;
pub mod error;
pub mod name_mapper;
pub mod registry;
pub mod sanitize;
pub mod transport;

pub use caller::ToolCaller;
pub use connection_manager::ConnectionManager;
pub use error::{ErrorKind, HubError, HubResult};
