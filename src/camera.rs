//! Camera view: where frames come from, where they go, and the serial
//! delivery loop that hands each one to a listener.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

// ─── Traits ─────────────────────────────────────────────────────────────────

/// Anything with a pixel size.
pub trait Frame {
    fn frame_size(&self) -> (u32, u32);
}

impl Frame for RgbImage {
    fn frame_size(&self) -> (u32, u32) {
        self.dimensions()
    }
}

/// Receives frames from a running camera view, one at a time.
pub trait FrameListener {
    type Frame;

    /// Called once before the first frame with that frame's size.
    fn on_started(&mut self, _width: u32, _height: u32) {}

    fn on_stopped(&mut self) {}

    /// Process one frame and return the frame to display.
    fn on_frame(&mut self, frame: Self::Frame) -> Result<Self::Frame>;
}

pub trait FrameSource {
    type Frame: Frame;

    /// Next frame, or `None` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;
}

pub trait FrameSink<F> {
    fn deliver(&mut self, index: u64, frame: F) -> Result<()>;
}

impl<F> FrameSink<F> for Vec<F> {
    fn deliver(&mut self, _index: u64, frame: F) -> Result<()> {
        self.push(frame);
        Ok(())
    }
}

// ─── Image sequences ────────────────────────────────────────────────────────

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Frames read from the image files of a directory, in file-name order.
#[derive(Debug)]
pub struct ImageSequence {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(Error::EmptySource(dir.to_path_buf()));
        }
        info!("Image sequence {}: {} frames", dir.display(), files.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next: 0,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ImageSequence {
    type Frame = RgbImage;

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.files.get(self.next) else {
            debug!("Image sequence {} exhausted", self.dir.display());
            return Ok(None);
        };
        self.next += 1;
        Ok(Some(image::open(path)?.to_rgb8()))
    }
}

/// Writes delivered frames as `frame_000000.png`, `frame_000001.png`, …
#[derive(Debug)]
pub struct ImageSequenceWriter {
    dir: PathBuf,
}

impl ImageSequenceWriter {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }
}

impl FrameSink<RgbImage> for ImageSequenceWriter {
    fn deliver(&mut self, index: u64, frame: RgbImage) -> Result<()> {
        frame.save(self.frame_path(index))?;
        Ok(())
    }
}

// ─── Camera view ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u64,
    pub size: Option<(u32, u32)>,
}

/// Delivers frames from a source to a listener, serially.
///
/// The view stays disabled until the backend has been initialised; see
/// [`crate::loader`].
pub struct CameraView<S> {
    source: S,
    enabled: bool,
    max_frames: Option<u64>,
}

impl<S: FrameSource> CameraView<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            enabled: false,
            max_frames: None,
        }
    }

    pub fn with_max_frames(mut self, max_frames: Option<u64>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn enable_view(&mut self) {
        if !self.enabled {
            info!("Camera view enabled");
        }
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run until the source is exhausted or the frame limit is hit.
    /// `on_stopped` is called whenever `on_started` was, even on error.
    pub fn run<L, K>(&mut self, listener: &mut L, sink: &mut K) -> Result<RunStats>
    where
        L: FrameListener<Frame = S::Frame>,
        K: FrameSink<S::Frame>,
    {
        if !self.enabled {
            return Err(Error::ViewNotEnabled);
        }

        let mut stats = RunStats::default();
        let result = self.deliver_frames(listener, sink, &mut stats);
        if stats.size.is_some() {
            listener.on_stopped();
        }

        match &result {
            Ok(()) => info!("Camera view stopped after {} frames", stats.frames),
            Err(e) => warn!("Camera view stopped after {} frames: {}", stats.frames, e),
        }
        result.map(|()| stats)
    }

    fn deliver_frames<L, K>(&mut self, listener: &mut L, sink: &mut K, stats: &mut RunStats) -> Result<()>
    where
        L: FrameListener<Frame = S::Frame>,
        K: FrameSink<S::Frame>,
    {
        while self.max_frames.map_or(true, |max| stats.frames < max) {
            let Some(frame) = self.source.next_frame()? else {
                break;
            };

            if stats.size.is_none() {
                let (w, h) = frame.frame_size();
                listener.on_started(w, h);
                stats.size = Some((w, h));
            }

            let shown = listener.on_frame(frame)?;
            sink.deliver(stats.frames, shown)?;
            stats.frames += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct Counting {
        started: Option<(u32, u32)>,
        stopped: bool,
        seen: u32,
    }

    impl FrameListener for Counting {
        type Frame = RgbImage;

        fn on_started(&mut self, width: u32, height: u32) {
            self.started = Some((width, height));
        }

        fn on_stopped(&mut self) {
            self.stopped = true;
        }

        fn on_frame(&mut self, mut frame: RgbImage) -> Result<RgbImage> {
            self.seen += 1;
            frame.put_pixel(0, 0, Rgb([self.seen as u8, 0, 0]));
            Ok(frame)
        }
    }

    fn counting() -> Counting {
        Counting { started: None, stopped: false, seen: 0 }
    }

    fn write_frames(dir: &Path, names: &[&str]) {
        for (i, name) in names.iter().enumerate() {
            RgbImage::from_pixel(8, 6, Rgb([i as u8 * 10, 0, 0]))
                .save(dir.join(name))
                .unwrap();
        }
    }

    #[test]
    fn test_view_must_be_enabled() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["a.png"]);
        let mut view = CameraView::new(ImageSequence::open(dir.path()).unwrap());
        let mut sink: Vec<RgbImage> = Vec::new();
        let err = view.run(&mut counting(), &mut sink).unwrap_err();
        assert!(matches!(err, Error::ViewNotEnabled));
    }

    #[test]
    fn test_frames_delivered_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["b.png", "a.png", "c.png"]);
        fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut view = CameraView::new(ImageSequence::open(dir.path()).unwrap());
        view.enable_view();
        let mut listener = counting();
        let mut sink: Vec<RgbImage> = Vec::new();
        let stats = view.run(&mut listener, &mut sink).unwrap();

        assert_eq!(stats.frames, 3);
        assert_eq!(stats.size, Some((8, 6)));
        assert_eq!(listener.started, Some((8, 6)));
        assert!(listener.stopped);
        // a.png was written second (red=10), so it is delivered first
        assert_eq!(sink[0].get_pixel(1, 1), &Rgb([10, 0, 0]));
        assert_eq!(sink[1].get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(sink[2].get_pixel(0, 0), &Rgb([3, 0, 0]));
    }

    #[test]
    fn test_frame_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_frames(dir.path(), &["1.png", "2.png", "3.png", "4.png"]);
        let mut view = CameraView::new(ImageSequence::open(dir.path()).unwrap()).with_max_frames(Some(2));
        view.enable_view();
        let mut sink: Vec<RgbImage> = Vec::new();
        assert_eq!(view.run(&mut counting(), &mut sink).unwrap().frames, 2);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(ImageSequence::open(dir.path()), Err(Error::EmptySource(_))));
    }

    #[test]
    fn test_unreadable_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ImageSequence::open(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_writer_numbers_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ImageSequenceWriter::create(dir.path().join("out")).unwrap();
        writer.deliver(7, RgbImage::new(4, 4)).unwrap();
        assert!(dir.path().join("out").join("frame_000007.png").exists());
    }
}
