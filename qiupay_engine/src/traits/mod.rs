//! #  Store and collaborator contracts.
//!
//! This module defines the interfaces the payment confirmation engine needs from its backends and from the outside
//! world.
//!
//! ## Storage
//! * [`PaymentGatewayDatabase`] defines the highest level of behaviour: inserting orders, moving them out of the
//!   pending state and recording match events. Every exit from `Pending` goes through a single conditional update,
//!   so the first transition wins and later ones observe a conflict.
//! * [`MerchantManagement`] manages merchant records, their keys and bill-source credentials.
//! * [`CallbackManagement`] stores the persisted retry timers and the append-only callback log.
//!
//! ## Collaborators
//! * [`BillSource`] fetches a merchant's recent incoming transfers from the payment provider.
//! * [`Notifier`] delivers one webhook request to a merchant.
mod bill_source;
mod callback_management;
mod data_objects;
mod merchant_management;
mod notifier;
mod payment_gateway_database;

pub use bill_source::{BillCredential, BillRecord, BillSource, BillSourceError};
pub use callback_management::CallbackManagement;
pub use data_objects::{AttemptRecorded, CallbackJobUpdate, PaidOrder, PaidTransition, TransitionOutcome};
pub use merchant_management::MerchantManagement;
pub use notifier::{CallbackRequest, DeliveryFailure, Notifier, NotifyResponse};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
