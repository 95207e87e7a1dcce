//! Configuration loading and the end-to-end run pipeline behind the
//! `da-runner` binary.

pub mod config;
pub mod pipeline;
