#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
#![warn(clippy::perf)]
#![warn(clippy::complexity)]
#![warn(clippy::style)]
#![allow(clippy::multiple_crate_versions)]

//! Validates the streams of M3U channel playlists and writes a cleaned,
//! deduplicated playlist containing only the streams that carry media.

pub mod aggregate;
pub mod config;
pub mod dedup;
pub mod error;
pub mod ffprobe;
pub mod playlist;
pub mod reachability;
pub mod run_log;
pub mod util;
pub mod validator;

pub use config::{Args, Config};
pub use error::{Result, ValidatorError};
pub use validator::{RunReport, Validator};
