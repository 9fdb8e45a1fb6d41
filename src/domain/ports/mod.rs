pub mod atomic_store;
pub mod order_repository;
pub mod versioned_store;

pub use atomic_store::AtomicStore;
pub use order_repository::OrderRepository;
pub use versioned_store::{VersionedRecord, VersionedStore};
