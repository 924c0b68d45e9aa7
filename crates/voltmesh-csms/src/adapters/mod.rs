//! Typed facades between the protocol core and the business handlers.
//!
//! Each adapter is a thin pass-through: correlation ids are preserved, reply
//! payloads are returned untouched, and the failure policy (propagate vs.
//! log-and-acknowledge) is the only behavior that lives here.

pub mod forwarding;
pub mod metering;
pub mod notification;
pub mod transaction;

pub use forwarding::ForwardingAdapter;
pub use metering::MeteringAdapter;
pub use notification::{NotificationAdapter, NotificationKind};
pub use transaction::TransactionAdapter;
