pub mod builtin;
pub mod handler;
pub mod run;

pub use builtin::{BuiltinTools, ExecPolicy};
pub use handler::HubHandler;
pub use run::InboundTransport;
