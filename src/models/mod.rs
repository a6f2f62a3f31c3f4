//! Domain models cached by the application.

pub mod product;

pub use product::{Classification, Product};
