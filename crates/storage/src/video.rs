//! Video side channel.
//!
//! ## Design
//!
//! Image observations are not stored as columns. Each camera gets its own
//! sequence of video shards; an episode's frames for one camera are always
//! appended to a single shard and described by a [`VideoLocator`].
//!
//! | Event | Effect |
//! |-------|--------|
//! | first frames for a camera | open shard `0` |
//! | `frames_in_shard + episode_frames > max_frames_per_shard` | new shard |
//! | frame geometry changes | new shard |
//! | writer moves to a new chunk | new shard in the new chunk directory |
//!
//! Shard numbers count up per camera across the whole dataset, so a shard
//! name never repeats even when chunks rotate.
//!
//! Encoding goes through [`EncoderFactory`]. [`FfmpegEncoderFactory`] pipes
//! raw rgb24 frames into an `ffmpeg` process; [`RawFrameEncoderFactory`]
//! writes the raw frames to disk unchanged.

use crate::error::{Result, StorageError};
use crate::layout::ArtifactLayout;
use datakit_core::{Tensor, VideoLocator};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ============================================================================
// Frames
// ============================================================================

/// Packed `height x width x 3` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbFrame {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// `height * width * 3` bytes, row-major
    pub data: Vec<u8>,
}

impl RgbFrame {
    /// Convert an image tensor. Grayscale (`[h, w]` or `[h, w, 1]`) is
    /// replicated into three channels, RGBA drops alpha, floats are clamped.
    /// Returns `None` for other shapes or a short buffer.
    pub fn from_tensor(tensor: &Tensor) -> Option<Self> {
        let (height, width, channels) = match tensor.shape.as_slice() {
            [h, w] => (*h, *w, 1),
            [h, w, c] if matches!(c, 1 | 3 | 4) => (*h, *w, *c),
            _ => return None,
        };
        if height == 0 || width == 0 {
            return None;
        }
        let pixels = tensor.data.to_u8();
        if pixels.len() < height * width * channels {
            return None;
        }
        let data = match channels {
            3 => pixels[..height * width * 3].to_vec(),
            1 => pixels[..height * width].iter().flat_map(|&p| [p, p, p]).collect(),
            _ => pixels
                .chunks_exact(4)
                .take(height * width)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        };
        Some(RgbFrame { width, height, data })
    }
}

// ============================================================================
// Encoders
// ============================================================================

/// One open video file.
pub trait VideoEncoder: Send {
    /// Append one packed rgb24 frame.
    fn write_frame(&mut self, rgb: &[u8]) -> Result<()>;

    /// Close the file; returns the number of frames written.
    fn finish(self: Box<Self>) -> Result<u64>;
}

/// Opens encoders for new shards.
pub trait EncoderFactory: Send + Sync {
    /// File extension of produced shards, without the dot
    fn extension(&self) -> &str;

    /// Start a shard at `path` for frames of the given geometry.
    fn open(&self, path: &Path, width: usize, height: usize, fps: f64) -> Result<Box<dyn VideoEncoder>>;
}

/// H.264 MP4 through an external `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    /// Binary to spawn
    pub binary: PathBuf,
    /// Constant rate factor
    pub crf: u32,
    /// x264 preset
    pub preset: String,
    /// Output pixel format
    pub pix_fmt: String,
    /// Upper bound on waiting for the process after the last frame
    pub finish_timeout: Option<Duration>,
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        FfmpegEncoderFactory {
            binary: PathBuf::from("ffmpeg"),
            crf: 23,
            preset: "medium".to_string(),
            pix_fmt: "yuv420p".to_string(),
            finish_timeout: None,
        }
    }
}

impl FfmpegEncoderFactory {
    /// Factory with the given quality settings
    pub fn new(crf: u32, preset: impl Into<String>) -> Self {
        FfmpegEncoderFactory {
            crf,
            preset: preset.into(),
            ..Default::default()
        }
    }

    /// Set the finish timeout
    pub fn with_finish_timeout(mut self, timeout: Duration) -> Self {
        self.finish_timeout = Some(timeout);
        self
    }

    fn args(&self, path: &Path, width: usize, height: usize, fps: f64) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-vcodec".into(),
            "rawvideo".into(),
            "-s".into(),
            format!("{width}x{height}"),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-r".into(),
            fps.to_string(),
            "-i".into(),
            "-".into(),
            // yuv420p needs even dimensions
            "-vf".into(),
            "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
            "-c:v".into(),
            "libx264".into(),
            "-crf".into(),
            self.crf.to_string(),
            "-preset".into(),
            self.preset.clone(),
            "-pix_fmt".into(),
            self.pix_fmt.clone(),
            path.to_string_lossy().into_owned(),
        ]
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(&self, path: &Path, width: usize, height: usize, fps: f64) -> Result<Box<dyn VideoEncoder>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut child = Command::new(&self.binary)
            .args(self.args(path, width, height, fps))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                StorageError::Encoder(format!("failed to spawn {}: {e}", self.binary.display()))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| StorageError::Encoder("encoder stdin unavailable".into()))?;
        debug!(path = %path.display(), width, height, "Started ffmpeg");
        Ok(Box::new(FfmpegEncoder {
            child,
            stdin: Some(stdin),
            frame_len: width * height * 3,
            frames: 0,
            path: path.to_path_buf(),
            timeout: self.finish_timeout,
        }))
    }
}

struct FfmpegEncoder {
    child: Child,
    stdin: Option<ChildStdin>,
    frame_len: usize,
    frames: u64,
    path: PathBuf,
    timeout: Option<Duration>,
}

impl FfmpegEncoder {
    fn stderr(&mut self) -> String {
        let mut buf = String::new();
        if let Some(mut err) = self.child.stderr.take() {
            let _ = err.read_to_string(&mut buf);
        }
        buf.trim().to_string()
    }

    fn wait(&mut self) -> Result<std::process::ExitStatus> {
        let Some(timeout) = self.timeout else {
            return Ok(self.child.wait()?);
        };
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = self.child.kill();
                let _ = self.child.wait();
                return Err(StorageError::Encoder(format!(
                    "ffmpeg did not finish {} within {:?}",
                    self.path.display(),
                    timeout
                )));
            }
            thread::sleep(Duration::from_millis(20));
        }
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<()> {
        if rgb.len() != self.frame_len {
            return Err(StorageError::Encoder(format!(
                "frame is {} bytes, shard expects {}",
                rgb.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| StorageError::Encoder("encoder already closed".into()))?;
        if let Err(e) = stdin.write_all(rgb) {
            self.stdin = None;
            let _ = self.child.kill();
            let _ = self.child.wait();
            let detail = self.stderr();
            return Err(StorageError::Encoder(format!(
                "writing to ffmpeg for {} failed: {e} {detail}",
                self.path.display()
            )));
        }
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        // Closing stdin signals end of input
        drop(self.stdin.take());
        let status = self.wait()?;
        if !status.success() {
            let detail = self.stderr();
            return Err(StorageError::Encoder(format!(
                "ffmpeg exited with {status} for {}: {detail}",
                self.path.display()
            )));
        }
        Ok(self.frames)
    }
}

/// Uncompressed rgb24 frames appended to a file.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFrameEncoderFactory;

impl EncoderFactory for RawFrameEncoderFactory {
    fn extension(&self) -> &str {
        "rgb"
    }

    fn open(&self, path: &Path, width: usize, height: usize, _fps: f64) -> Result<Box<dyn VideoEncoder>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Box::new(RawFrameEncoder {
            out: BufWriter::new(File::create(path)?),
            frame_len: width * height * 3,
            frames: 0,
        }))
    }
}

struct RawFrameEncoder {
    out: BufWriter<File>,
    frame_len: usize,
    frames: u64,
}

impl VideoEncoder for RawFrameEncoder {
    fn write_frame(&mut self, rgb: &[u8]) -> Result<()> {
        if rgb.len() != self.frame_len {
            return Err(StorageError::Encoder(format!(
                "frame is {} bytes, shard expects {}",
                rgb.len(),
                self.frame_len
            )));
        }
        self.out.write_all(rgb)?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.out.flush()?;
        Ok(self.frames)
    }
}

// ============================================================================
// Shard writer
// ============================================================================

struct OpenShard {
    encoder: Box<dyn VideoEncoder>,
    file: String,
    chunk: usize,
    width: usize,
    height: usize,
    frames: u64,
}

#[derive(Default)]
struct CameraStream {
    next_shard: usize,
    open: Option<OpenShard>,
    frames_written: u64,
}

/// Per-camera video shard rotation.
pub struct VideoShardWriter {
    root: PathBuf,
    factory: Arc<dyn EncoderFactory>,
    fps: f64,
    max_frames_per_shard: u64,
    streams: BTreeMap<String, CameraStream>,
    files: Vec<String>,
}

impl VideoShardWriter {
    /// Writer placing shards under `root/videos`.
    pub fn new(root: impl Into<PathBuf>, factory: Arc<dyn EncoderFactory>, fps: f64, max_frames_per_shard: u64) -> Self {
        VideoShardWriter {
            root: root.into(),
            factory,
            fps,
            max_frames_per_shard: max_frames_per_shard.max(1),
            streams: BTreeMap::new(),
            files: Vec::new(),
        }
    }

    /// Append one episode's frames for `camera`. Frames whose geometry
    /// differs from the episode's first frame are dropped with a warning.
    /// Returns `None` when there is nothing to write.
    pub fn write_episode(&mut self, chunk: usize, camera: &str, frames: &[RgbFrame]) -> Result<Option<VideoLocator>> {
        let Some(first) = frames.first() else {
            return Ok(None);
        };
        let (width, height) = (first.width, first.height);
        let usable: Vec<&RgbFrame> = frames
            .iter()
            .filter(|f| f.width == width && f.height == height)
            .collect();
        if usable.len() < frames.len() {
            warn!(
                camera,
                dropped = frames.len() - usable.len(),
                "Frame size changed within episode; dropping mismatched frames"
            );
        }
        let count = usable.len() as u64;

        let stream = self.streams.entry(camera.to_string()).or_default();
        let rotate = match &stream.open {
            None => true,
            Some(shard) => {
                shard.chunk != chunk
                    || shard.width != width
                    || shard.height != height
                    || (shard.frames > 0 && shard.frames + count > self.max_frames_per_shard)
            }
        };
        if rotate {
            if let Some(done) = stream.open.take() {
                Self::close(done, &mut self.files)?;
            }
            let file = ArtifactLayout::video_shard(chunk, camera, stream.next_shard, self.factory.extension());
            let encoder = self.factory.open(&self.root.join(&file), width, height, self.fps)?;
            debug!(camera, file = %file, "Opened video shard");
            stream.next_shard += 1;
            stream.open = Some(OpenShard {
                encoder,
                file,
                chunk,
                width,
                height,
                frames: 0,
            });
        }

        let shard = stream
            .open
            .as_mut()
            .ok_or_else(|| StorageError::InvalidState("no open video shard".into()))?;
        let start_frame = shard.frames;
        for frame in usable {
            shard.encoder.write_frame(&frame.data)?;
        }
        shard.frames += count;
        stream.frames_written += count;
        Ok(Some(VideoLocator {
            video_file: shard.file.clone(),
            start_frame,
            num_frames: count,
        }))
    }

    fn close(shard: OpenShard, files: &mut Vec<String>) -> Result<()> {
        let encoded = shard.encoder.finish()?;
        if encoded != shard.frames {
            return Err(StorageError::Encoder(format!(
                "{} holds {encoded} frames, expected {}",
                shard.file, shard.frames
            )));
        }
        files.push(shard.file);
        Ok(())
    }

    /// Close every open shard. Returns frames written per camera.
    pub fn finish(&mut self) -> Result<BTreeMap<String, u64>> {
        let mut totals = BTreeMap::new();
        for (camera, stream) in self.streams.iter_mut() {
            if let Some(done) = stream.open.take() {
                Self::close(done, &mut self.files)?;
            }
            totals.insert(camera.clone(), stream.frames_written);
        }
        Ok(totals)
    }

    /// Root-relative paths of closed shards
    pub fn files(&self) -> &[String] {
        &self.files
    }
}
