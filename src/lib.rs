#![warn(rust_2018_idioms)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod api;
pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub(crate) mod schema;
pub mod store;
pub mod util;
