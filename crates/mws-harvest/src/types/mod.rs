//! Core types for the harvester

pub mod harvest;

pub use harvest::{Formula, Fragment, Harvest};
