//! Row types for items, edges and assignments.

pub mod assignment;
pub mod item;
pub mod name;

pub use assignment::Assignment;
pub use item::{Edge, Item, ItemType};
