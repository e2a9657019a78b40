//! CLI command implementations

mod compose;
mod config;
mod datastore;
mod server;
mod tunnel;

pub use compose::{compose_command, compose_invocation, ComposeInvocation};
pub use config::{config_init, config_path, config_show};
pub use datastore::{
    datastore_create, datastore_exists, datastore_get, datastore_set, parse_json, parse_object,
};
pub use server::server_command;
pub use tunnel::{list_services, tunnel_command};
