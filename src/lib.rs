//! Edge and motion overlays for camera frames.
//!
//! Two per-frame pipelines ([`edge::EdgeDetector`], [`motion::MotionDetector`])
//! driven by a [`camera::CameraView`], which is only enabled once the
//! [`loader::Loader`] has connected the vision backend and installed the
//! bundled cascade classifier.

pub mod assets;
pub mod camera;
pub mod cascade;
pub mod config;
pub mod contour;
#[cfg(feature = "opencv")]
pub mod cv;
pub mod edge;
pub mod error;
pub mod loader;
pub mod logging;
pub mod motion;

pub use error::{Error, Result};
