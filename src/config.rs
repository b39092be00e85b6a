/// Pipeline Configuration
///
/// Loaded from edgewatch.toml (working directory) with env-var overrides.
/// Env format: EDGEWATCH__SECTION__KEY (double underscore separators).

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub edges: EdgeConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub cascade: CascadeConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reject values the pipelines cannot honour.
    pub fn validate(&self) -> Result<()> {
        let k = self.motion.kernel_size;
        if k % 2 == 0 {
            return Err(Error::InvalidConfig(format!(
                "motion.kernel_size must be odd, got {}",
                k
            )));
        }
        if self.edges.low_threshold > self.edges.high_threshold {
            return Err(Error::InvalidConfig(format!(
                "edges.low_threshold ({}) is above edges.high_threshold ({})",
                self.edges.low_threshold, self.edges.high_threshold
            )));
        }
        Ok(())
    }
}

// ─── Edge detection ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    #[serde(default = "default_canny_low")]
    pub low_threshold: f32,
    #[serde(default = "default_canny_high")]
    pub high_threshold: f32,
    /// Sobel aperture. Only honoured by the OpenCV backend.
    #[serde(default = "default_aperture_size")]
    pub aperture_size: i32,
    #[serde(default = "default_true")]
    pub l2_gradient: bool,
    /// Black out each contour's bounding box before drawing the overlay.
    #[serde(default = "default_true")]
    pub blackout_boxes: bool,
}

fn default_canny_low() -> f32 {
    50.0
}
fn default_canny_high() -> f32 {
    150.0
}
fn default_aperture_size() -> i32 {
    3
}
fn default_true() -> bool {
    true
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            low_threshold: default_canny_low(),
            high_threshold: default_canny_high(),
            aperture_size: default_aperture_size(),
            l2_gradient: default_true(),
            blackout_boxes: default_true(),
        }
    }
}

// ─── Motion detection ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct MotionConfig {
    /// Pixels whose difference is strictly above this become `max_value`.
    #[serde(default = "default_diff_threshold")]
    pub diff_threshold: u8,
    #[serde(default = "default_max_value")]
    pub max_value: u8,
    /// Side of the square erode/dilate kernel. Must be odd.
    #[serde(default = "default_kernel_size")]
    pub kernel_size: u32,
}

fn default_diff_threshold() -> u8 {
    50
}
fn default_max_value() -> u8 {
    255
}
fn default_kernel_size() -> u32 {
    3
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            diff_threshold: default_diff_threshold(),
            max_value: default_max_value(),
            kernel_size: default_kernel_size(),
        }
    }
}

// ─── Overlay ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// RGB colour of the contour overlay.
    #[serde(default = "default_overlay_color")]
    pub color: [u8; 3],
    #[serde(default = "default_overlay_thickness")]
    pub thickness: u32,
}

fn default_overlay_color() -> [u8; 3] {
    [255, 0, 0]
}
fn default_overlay_thickness() -> u32 {
    5
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color: default_overlay_color(),
            thickness: default_overlay_thickness(),
        }
    }
}

// ─── Cascade asset ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CascadeConfig {
    /// Read-only bundle the cascade is copied from.
    #[serde(default = "default_asset_dir")]
    pub asset_dir: PathBuf,
    #[serde(default = "default_cascade_file")]
    pub file_name: String,
    /// Writable directory the cascade is installed into.
    #[serde(default = "default_install_dir")]
    pub install_dir: PathBuf,
    /// Minimum face size as a fraction of the frame height.
    #[serde(default = "default_face_size_ratio")]
    pub face_size_ratio: f64,
}

fn default_asset_dir() -> PathBuf {
    PathBuf::from("assets")
}
fn default_cascade_file() -> String {
    "lbpcascade_frontalface.xml".to_string()
}
fn default_install_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("edgewatch")
        .join("app_cascade")
}
fn default_face_size_ratio() -> f64 {
    0.2
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            asset_dir: default_asset_dir(),
            file_name: default_cascade_file(),
            install_dir: default_install_dir(),
            face_size_ratio: default_face_size_ratio(),
        }
    }
}

// ─── Camera view ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CameraConfig {
    /// Stop after this many frames. Unlimited when unset.
    pub max_frames: Option<u64>,
}

// ─── Logging ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file directory. Defaults to `<data_dir>/edgewatch/logs`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Write a rotated log file next to stdout.
    #[serde(default = "default_true")]
    pub file: bool,
    #[serde(default = "default_log_rotation")]
    pub rotation: LogRotation,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_rotation() -> LogRotation {
    LogRotation::Daily
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
            file: default_true(),
            rotation: default_log_rotation(),
        }
    }
}

/// Load configuration from edgewatch.toml + environment variable overrides.
///
/// Search order:
///   1. ./edgewatch.toml (working directory)
///   2. Environment variables: EDGEWATCH__EDGES__LOW_THRESHOLD, etc.
pub fn load_config() -> Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("edgewatch").required(false))
        .add_source(
            config::Environment::with_prefix("EDGEWATCH")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let cfg = settings.try_deserialize::<AppConfig>()?;
    cfg.validate()?;
    Ok(cfg)
}
