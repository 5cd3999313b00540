pub mod backoff;
pub mod note;
pub mod outbox;
pub mod timestamp;
pub mod tree;
pub mod vector;

mod error;

pub use error::{Error, Result};
