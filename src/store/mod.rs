//! Data store modules

pub mod groceries;

pub use groceries::{GroceryItem, GroceryItemUpdate, GroceryStore, NewGroceryItem, StoreError};
