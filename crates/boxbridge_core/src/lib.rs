//! Runtime capability discovery and slot mutation for save models whose
//! accessor surface is not known at compile time.

pub mod coerce;
pub mod document;
mod engine;
pub mod enumerate;
mod error;
pub mod extract;
pub mod library;
pub mod model;
pub mod mutate;
pub mod names;
pub mod persist;
pub mod probe;
pub mod provider;
pub mod report;
pub mod value;

pub use engine::{Engine, Session, require_source};
pub use error::{CoreError, CoreErrorCode};
