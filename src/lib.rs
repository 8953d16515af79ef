#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::cargo)]

pub mod backend;
pub mod common;
pub mod config;
pub mod csv_text;
pub mod fixture;
pub mod indexer;
pub mod loader;
pub mod native_backend;
pub mod pipeline;
pub mod preset;
pub mod schema;
pub mod sensor;
pub mod shell_backend;
pub mod shop;
pub mod value;
pub mod verifier;
