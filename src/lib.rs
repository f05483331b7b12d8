//! Stubo - record and play back HTTP traffic through a remote stub server
//!
//! A [`Session`] hands out an HTTP client whose requests are either executed
//! for real and captured (record mode) or answered by the stub server
//! (playback mode). Captured exchanges become stubs when the session stops.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod recording;
pub mod stub;

pub use api::StuboClient;
pub use config::{ClientConfig, Mode, SessionConfig};
pub use error::{Result, StuboError};
pub use recording::{HttpCall, Session};
pub use stub::StubData;
