//! Straylight: a resident policy agent.
//!
//! An unprivileged controller registers policy facts through a narrow text
//! channel; consumers read them at interception time. The crate provides
//! the bounded [`registry`], the line [`protocol`] that mutates it, the
//! [`device`] channel in front of the protocol, and the [`hooks`]
//! coordinator that installs interception sets all-or-nothing.
//!
//! See `DESIGN.md` for architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod logging;
pub mod text;

pub mod registry;

pub mod device;
pub mod protocol;

pub mod hooks;

pub mod agent;
pub mod server;
