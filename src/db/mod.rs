pub mod models;
pub mod store;
pub mod writer;

pub use store::{load_nodes, open, upsert_node};
pub use writer::RegistryWriter;
