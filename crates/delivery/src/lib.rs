//! Permitflow Delivery
//!
//! The last mile before leads leave the system:
//!
//! - [`build_reports`] renders a client's three result sets into CSV
//!   artifacts (scores on the semantic report, removal reasons on the
//!   exclusion report).
//! - [`apply_phone_gate`] enforces the hard rule that nothing without a
//!   contact phone is ever handed to a deliverer.
//! - [`Deliverer`] is the transport contract; [`OutboxDeliverer`] ships as
//!   the file-based default, with SMTP implementations living outside the
//!   core.

mod deliverer;
mod error;
mod gate;
mod phone;
mod report;

pub use crate::deliverer::{Deliverer, DeliveryOutcome, OutboxDeliverer};
pub use crate::error::DeliveryError;
pub use crate::gate::apply_phone_gate;
pub use crate::phone::{best_phone, format_phone};
pub use crate::report::{build_reports, LeadReports};
