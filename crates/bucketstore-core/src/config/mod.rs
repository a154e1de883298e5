pub mod store;

pub use store::StoreConfig;
