pub mod error;
pub mod item;
pub mod list;

pub use error::Failure;
pub use item::{Item, ItemId};
pub use list::{Applied, ItemList, ListEvent};

#[cfg(any(test, feature = "testing"))]
pub mod testing;
