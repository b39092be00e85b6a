//! Cascade classifier definitions.
//!
//! Reads the OpenCV storage XML that describes a trained cascade (LBP or
//! Haar) and keeps its header: stage/feature type, detection window and
//! stage count. The cascade is only loaded and validated here; it is not
//! evaluated on frames.

use std::fmt;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeClassifier {
    pub path: PathBuf,
    /// Name of the cascade node, e.g. `cascade`.
    pub name: String,
    pub stage_type: String,
    pub feature_type: String,
    /// Detection window (width, height).
    pub window: (u32, u32),
    pub stages: usize,
}

impl CascadeClassifier {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let classifier = Self::parse(&text, path)?;
        debug!("Loaded cascade {}", classifier);
        Ok(classifier)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let doc = Document::parse(text).map_err(|source| Error::CascadeXml {
            path: path.to_path_buf(),
            source,
        })?;
        let invalid = |reason: &str| Error::InvalidCascade {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        let root = doc.root_element();
        if root.tag_name().name() != "opencv_storage" {
            return Err(invalid("root element is not opencv_storage"));
        }
        let node = root
            .children()
            .find(|n| n.is_element())
            .ok_or_else(|| invalid("no cascade node"))?;

        // Current format (traincascade): explicit stageType/featureType/width/height.
        // Legacy Haar format: a single `size` element, "W H".
        let (stage_type, feature_type, window) = if child(node, "stageType").is_some() {
            let width = child_number(node, "width").ok_or_else(|| invalid("missing width"))?;
            let height = child_number(node, "height").ok_or_else(|| invalid("missing height"))?;
            (
                child_text(node, "stageType").unwrap_or("BOOST").to_string(),
                child_text(node, "featureType").unwrap_or("HAAR").to_string(),
                (width, height),
            )
        } else {
            let size = child_text(node, "size").ok_or_else(|| invalid("missing window size"))?;
            let mut dims = size.split_whitespace().map(str::parse::<u32>);
            match (dims.next(), dims.next()) {
                (Some(Ok(w)), Some(Ok(h))) => ("BOOST".to_string(), "HAAR".to_string(), (w, h)),
                _ => return Err(invalid("malformed window size")),
            }
        };

        let listed = child(node, "stages")
            .map(|s| s.children().filter(|n| n.is_element()).count())
            .unwrap_or(0);
        let stages = child_number(node, "stageNum")
            .map(|n| n as usize)
            .unwrap_or(listed);
        if stages == 0 {
            return Err(invalid("cascade has no stages"));
        }
        if window.0 == 0 || window.1 == 0 {
            return Err(invalid("empty detection window"));
        }

        Ok(Self {
            path: path.to_path_buf(),
            name: node.tag_name().name().to_string(),
            stage_type,
            feature_type,
            window,
            stages,
        })
    }
}

impl fmt::Display for CascadeClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {}, {}x{}, {} stages] ({})",
            self.name,
            self.feature_type,
            self.stage_type,
            self.window.0,
            self.window.1,
            self.stages,
            self.path.display()
        )
    }
}

fn child<'a, 'i>(node: Node<'a, 'i>, name: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name).and_then(|n| n.text()).map(str::trim)
}

fn child_number(node: Node<'_, '_>, name: &str) -> Option<u32> {
    child_text(node, name).and_then(|t| t.parse().ok())
}

/// Faces are expected to be `ratio` of the frame height (20% by default).
pub fn min_face_size(frame_height: u32, ratio: f64) -> u32 {
    (frame_height as f64 * ratio) as u32
}
