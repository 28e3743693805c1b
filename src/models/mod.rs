//! Persisted data models.

mod stick;

pub use stick::Stick;
