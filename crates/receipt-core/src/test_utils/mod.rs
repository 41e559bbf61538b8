// Scripted collaborators for resolver, embedding and pipeline tests
pub mod fakes;

pub use fakes::*;
