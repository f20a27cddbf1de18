//! Transport adapters: stdio JSON lines (default) and REST.

pub mod rest;
pub mod stdio;
