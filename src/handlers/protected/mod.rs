pub mod history;
pub mod mutation;

pub use history::{audit_trail, list_all};
pub use mutation::{create, delete, restore, update};
