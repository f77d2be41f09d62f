//! Lernia operation routing and batch notification pipeline.
//!
//! - [`OperationRouter`]: forwards named operations to registered handler
//!   pools without waiting for them, reporting unknown operations.
//! - [`HandlerPool`]: a fixed set of worker tasks draining one handler's inbox.
//! - [`BatchNotificationHandler`]: classifies bulk/update/enroll operations
//!   and fans them out to recipients.
//! - [`NotificationDispatcher`]: per-recipient template resolution,
//!   decryption and delivery with isolated failures.
//! - [`TelemetryBus`]: fire-and-forget broadcast of pipeline events.
//! - [`delivery`]: SMTP mail transport and contact decryption.

pub mod batch_handler;
pub mod bus;
pub mod delivery;
pub mod dispatcher;
pub mod handler;
pub mod ports;
pub mod registry;
pub mod router;
pub mod store;

pub use batch_handler::BatchNotificationHandler;
pub use bus::{NotificationEvent, TelemetryBus};
pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use handler::{HandlerError, HandlerPool, HandlerRef, OperationHandler};
pub use registry::{OperationRegistry, RegistryBuilder};
pub use router::{OperationRouter, RouterRef};
