//! Data models for the retail backend.
//!
//! Field names serialize in camelCase to match the admin UI and desktop clients.

mod branch;
mod category;
pub mod common;
mod datastore;
mod ledger;
mod party;
mod payment;
mod product;
mod purchase;
mod returns;
mod sale;
mod stock;
mod sync;

pub use branch::*;
pub use category::*;
pub use common::{LineItemRequest, Page};
pub use datastore::*;
pub use ledger::*;
pub use party::*;
pub use payment::*;
pub use product::*;
pub use purchase::*;
pub use returns::*;
pub use sale::*;
pub use stock::*;
pub use sync::*;
