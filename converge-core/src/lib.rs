//! Converge Core
//!
//! Core library for waiting on cloud resources to reach a steady state.
//! A single generic poller replaces per-resource wait loops; providers plug
//! into it through probes and poll specs.

pub mod poll;
pub mod provider;
pub mod resource;
