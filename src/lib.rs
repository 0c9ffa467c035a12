#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod adapters;
pub mod config;
pub mod context;
pub mod daemon;
pub mod error;
pub mod guards;
pub mod ledger;
pub mod rpc;
pub mod transport;
pub mod turn;

pub use config::Config;
pub use error::{LaneError, RpcError, TransportError};
