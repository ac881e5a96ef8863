//! Drivers that ship with the crate.

pub mod none;
