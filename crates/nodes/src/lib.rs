//! `nodes` crate: node kinds, their configuration, and how each one drives a device.
//!
//! Every kind has a [`NodeHandler`] that validates its configuration and calls
//! the matching [`DeviceOperations`] method. The engine crate dispatches
//! execution through the [`NodeRegistry`].

pub mod config;
pub mod device;
pub mod error;
pub mod handlers;
pub mod kind;
pub mod mock;
pub mod registry;
pub mod traits;

pub use device::DeviceOperations;
pub use error::{NodeError, OperationError};
pub use kind::NodeKind;
pub use registry::NodeRegistry;
pub use traits::{NodeContext, NodeHandler, NodeOutcome, Validation};
