//! Camera exposure engine: state machine, progression cycle, frame cache and
//! the image-synthesis seam.

pub mod cache;
pub mod controller;
pub mod pointing;
pub mod synthesis;

pub use cache::{Fingerprint, ImageCache};
pub use controller::ExposureController;
pub use synthesis::{ImageSynthesizer, StarFieldSynthesizer, SynthesisRequest};
