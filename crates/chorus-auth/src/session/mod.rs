//! Session lifecycle: durable records plus their cache mirrors.

pub mod registry;

pub use registry::{ReconcileReport, SessionRegistry};
