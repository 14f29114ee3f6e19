//! Cross-cutting support utilities

pub mod shutdown;
