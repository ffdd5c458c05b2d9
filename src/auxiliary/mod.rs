//! Helper items to assist the working of tdrdm.

pub mod atom;
pub mod geometry;
pub mod molecule;
