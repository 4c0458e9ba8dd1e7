pub mod entity;

pub use entity::{list, show};
