pub mod block;
pub mod content;
pub mod selection;
pub mod transaction;

pub use folio_core::Tendril;
