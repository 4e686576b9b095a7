//! Core library for the `daq-cli` control client.
//!
//! The client talks to a long-running microscope backend that owns the
//! hardware. It can check whether the backend is alive, browse its component
//! graph, write typed attributes, move actuators within a safety ceiling, and
//! acquire frames to a file or a live display.
//!
//! Every operation takes an explicit [`session::Session`], so tests run
//! against [`backend::simulated::SimBackend`] without process-wide state.
//!
//! # Modules
//!
//! - [`backend`]: handle traits for remote components, attributes and data-flows
//! - [`session`], [`status`], [`resolve`]: connection, liveness, name lookup
//! - [`value`], [`coerce`]: typed remote values and text conversion
//! - [`gateway`], [`motion`], [`acquisition`]: the actions
//! - [`frame`], [`sink`], [`report`]: what gets produced and how it is shown
//! - [`config`], [`error`]: settings and the error taxonomy

pub mod acquisition;
pub mod backend;
pub mod coerce;
pub mod config;
pub mod error;
pub mod frame;
pub mod gateway;
pub mod motion;
pub mod report;
pub mod resolve;
pub mod session;
pub mod sink;
pub mod status;
pub mod value;
