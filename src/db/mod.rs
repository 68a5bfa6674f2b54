pub mod writer;

pub use writer::{DbWriter, PersistEvent};
