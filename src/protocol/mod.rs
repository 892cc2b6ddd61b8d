//! Protocol module

pub mod cast;
