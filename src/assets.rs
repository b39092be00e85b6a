//! Bundled assets.
//!
//! The bundle is a read-only directory shipped next to the binary. Files
//! that a vision backend must open by path (the cascade definition) are
//! copied out of it into writable storage once at startup.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

const COPY_CHUNK: usize = 4096;

/// Read-only asset directory.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    root: PathBuf,
}

impl AssetBundle {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn open_asset(&self, name: &str) -> Result<impl Read> {
        let path = self.root.join(name);
        match File::open(&path) {
            Ok(f) => Ok(BufReader::new(f)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::AssetNotFound {
                name: name.to_string(),
                bundle: self.root.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Copy `name` out of `bundle` into `dest_dir`, replacing any previous
/// copy. Returns the installed path.
pub fn install_asset(bundle: &AssetBundle, name: &str, dest_dir: &Path) -> Result<PathBuf> {
    let mut src = bundle.open_asset(name)?;

    fs::create_dir_all(dest_dir)?;
    debug!("Asset directory {}", dest_dir.display());
    let dest = dest_dir.join(name);
    let mut out = BufWriter::new(File::create(&dest)?);

    let mut buffer = [0u8; COPY_CHUNK];
    let mut copied = 0u64;
    loop {
        let n = src.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        out.write_all(&buffer[..n])?;
        copied += n as u64;
    }
    out.flush()?;

    info!("Installed asset {} ({} bytes) → {}", name, copied, dest.display());
    Ok(dest)
}
