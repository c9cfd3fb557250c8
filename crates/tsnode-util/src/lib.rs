#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Shared utilities for tsnode.
//!
//! This crate provides the filesystem seam used by the resolvers and a few
//! pure path helpers. It has no logging/tracing dependencies; logging is
//! handled by the CLI crate to keep this library lightweight.

pub mod fs;
pub mod path;
