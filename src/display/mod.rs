//! Diagnostic rendering: stretches, colour maps and the per-sensor piston figure.

pub mod colormap;
mod sls;
pub mod tonemap;

pub use colormap::{Colormap, PanelParams, piston_panel, render};
pub use tonemap::{ImprepParams, ScaleType, imprep, rebin, tonemap};
