//! Domain types and pure functions for batch membership notifications.
//!
//! Everything in this crate is free of I/O: snapshot types, the membership
//! differ, template selection, context assembly, template rendering, and the
//! operation envelope passed between the router and its handlers.

pub mod batch;
pub mod error;
pub mod membership;
pub mod notification;
pub mod operation;
pub mod template;
pub mod types;
