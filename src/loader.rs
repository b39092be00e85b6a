//! Backend loader.
//!
//! Connects the vision backend and prepares its dependencies (the cascade
//! classifier) off the async executor, exactly once. A camera view is only
//! enabled after `Loader::initialize` has resolved.

use std::fmt;
use std::path::Path;

use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::assets::{install_asset, AssetBundle};
use crate::cascade::CascadeClassifier;
use crate::config::CascadeConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Pure-Rust `image` + `imageproc`.
    ImageProc,
    #[cfg(feature = "opencv")]
    OpenCv,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::ImageProc => "imageproc",
            #[cfg(feature = "opencv")]
            Backend::OpenCv => "opencv",
        }
    }

    /// Check the backend is usable and report its version.
    fn connect(self) -> Result<String> {
        match self {
            Backend::ImageProc => Ok("imageproc 0.25".to_string()),
            #[cfg(feature = "opencv")]
            Backend::OpenCv => Ok(format!("OpenCV {}", opencv::core::get_version_string()?)),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What initialisation produced. A missing cascade is not fatal.
#[derive(Debug, Clone)]
pub struct Dependencies {
    pub backend: Backend,
    pub version: String,
    pub cascade: Option<CascadeClassifier>,
}

pub struct Loader {
    backend: Backend,
    cascade_cfg: CascadeConfig,
    deps: OnceCell<Dependencies>,
}

impl Loader {
    pub fn new(backend: Backend, cascade_cfg: CascadeConfig) -> Self {
        Self {
            backend,
            cascade_cfg,
            deps: OnceCell::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.deps.initialized()
    }

    /// Connect the backend and install + load the cascade. Runs once; later
    /// calls return the first result. Only a backend connection failure is
    /// an error; cascade problems are logged and leave `cascade` empty.
    pub async fn initialize(&self) -> Result<&Dependencies> {
        self.deps
            .get_or_try_init(|| async {
                let backend = self.backend;
                let cfg = self.cascade_cfg.clone();
                tokio::task::spawn_blocking(move || -> Result<Dependencies> {
                    let version = backend.connect()?;
                    info!("Backend {} connected ({})", backend, version);

                    let cascade = match load_cascade(backend, &cfg) {
                        Ok(c) => Some(c),
                        Err(e) => {
                            error!("Error loading cascade: {}", e);
                            None
                        }
                    };
                    Ok(Dependencies { backend, version, cascade })
                })
                .await?
            })
            .await
    }
}

fn load_cascade(backend: Backend, cfg: &CascadeConfig) -> Result<CascadeClassifier> {
    info!("Initialising dependencies");
    let bundle = AssetBundle::open(&cfg.asset_dir);
    let path = install_asset(&bundle, &cfg.file_name, &cfg.install_dir)?;

    load_native_cascade(backend, &path)?;

    let classifier = CascadeClassifier::load(&path)?;
    info!("Cascade classifier {}", classifier);
    Ok(classifier)
}

#[cfg(feature = "opencv")]
fn load_native_cascade(backend: Backend, path: &Path) -> Result<()> {
    if backend == Backend::OpenCv {
        crate::cv::load_native_cascade(path)?;
    }
    Ok(())
}

#[cfg(not(feature = "opencv"))]
fn load_native_cascade(_backend: Backend, _path: &Path) -> Result<()> {
    Ok(())
}
