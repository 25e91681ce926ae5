pub mod catalog;
pub mod ledger;
pub mod sessions;

pub use catalog::CatalogService;
pub use ledger::LedgerService;
pub use sessions::{SeatAvailability, SessionService};
