//! Frame compositing onto a fixed-size RGBA surface.

/// Card and frame layouts.
pub mod frames;
/// Legend images keyed by layer group.
pub mod legend;
/// Drawing surface, decoded images and contain-fit.
pub mod surface;
/// Text overlays rendered through `usvg`.
pub mod text;
