// Per-stage analyzers of the ToF pipeline, leaf first.

pub mod grid;
pub mod modulation;
pub mod pixel_flags;
pub mod distance_correction;
pub mod phase_unwrapper;
pub mod quality;
pub mod exposure;
pub mod background;
pub mod gaussian;
pub mod height;
pub mod centroid;
pub mod direction;
pub mod person_event;
