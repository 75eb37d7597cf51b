//! Amplifier pedestal ("piston") analysis for four-amplifier CCDs.
//!
//! Measures clipped statistics along each amplifier's prescan and overscan
//! boundaries, chains the boundary steps into per-amplifier pedestals,
//! tabulates them per visit and renders diagnostic figures.

pub mod ccd;
pub mod correlate;
pub mod display;
pub mod error;
pub mod image_io;
pub mod pedestal;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod table;
