//! Live camera acquisition as an owned capability.
//!
//! A camera is a shared device: only one stream may be open at a time.
//! [`Camera`] wraps a [`FrameSource`] and tracks whether it is streaming, so
//! acquiring twice or grabbing while idle is an error instead of a silent
//! second stream. Dropping an active camera does not close the device;
//! callers release it explicitly (the session does so after each capture).

use crate::error::CameraError;
use crate::pipeline::input::RawImage;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// A device (or stand-in) that can produce still frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Open the device.
    async fn open(&mut self) -> Result<(), CameraError>;

    /// Grab one encoded frame.
    async fn grab(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Close the device. Must not fail.
    async fn close(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CameraState {
    Idle,
    Streaming,
}

/// Camera capability with explicit acquire/release.
pub struct Camera<S> {
    source: S,
    state: CameraState,
    frames: u32,
}

impl<S: FrameSource> Camera<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            state: CameraState::Idle,
            frames: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == CameraState::Streaming
    }

    /// Start streaming. Fails with [`CameraError::AlreadyActive`] if already started.
    pub async fn acquire(&mut self) -> Result<(), CameraError> {
        if self.is_active() {
            return Err(CameraError::AlreadyActive);
        }
        self.source.open().await?;
        self.state = CameraState::Streaming;
        info!("Camera acquired");
        Ok(())
    }

    /// Stop streaming. Releasing an idle camera is a no-op.
    pub async fn release(&mut self) {
        if self.is_active() {
            self.source.close().await;
            self.state = CameraState::Idle;
            info!("Camera released");
        }
    }

    /// Grab a frame as a JPEG [`RawImage`] named `capture-<n>.jpg`.
    pub async fn grab_frame(&mut self) -> Result<RawImage, CameraError> {
        if !self.is_active() {
            return Err(CameraError::NotActive);
        }
        let bytes = self.source.grab().await?;
        if bytes.is_empty() {
            return Err(CameraError::CanvasUnavailable(
                "device returned an empty frame".to_string(),
            ));
        }
        self.frames += 1;
        debug!("Grabbed frame {} ({} bytes)", self.frames, bytes.len());
        Ok(RawImage::new(
            format!("capture-{}.jpg", self.frames),
            Some("image/jpeg".to_string()),
            bytes,
        ))
    }
}

/// Frame source that runs a command writing one JPEG frame to stdout.
///
/// The default grabs from the first V4L2 device through ffmpeg.
#[derive(Debug, Clone)]
pub struct CommandFrameSource {
    program: String,
    args: Vec<String>,
    open: bool,
}

impl CommandFrameSource {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            open: false,
        }
    }

    /// Parse a whitespace-separated command line such as
    /// `"fswebcam --no-banner -"`.
    pub fn from_command_line(command: &str) -> Result<Self, CameraError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| CameraError::Device("empty camera command".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl Default for CommandFrameSource {
    fn default() -> Self {
        let args = [
            "-loglevel", "error", "-f", "v4l2", "-i", "/dev/video0", "-frames:v", "1", "-f",
            "image2pipe", "-vcodec", "mjpeg", "-",
        ];
        Self::new("ffmpeg", args.iter().map(|a| a.to_string()).collect())
    }
}

#[async_trait]
impl FrameSource for CommandFrameSource {
    async fn open(&mut self) -> Result<(), CameraError> {
        self.open = true;
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(program = %self.program))]
    async fn grab(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.open {
            return Err(CameraError::NotActive);
        }
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| CameraError::Device(format!("cannot run {}: {e}", self.program)))?;
        if !output.status.success() {
            return Err(CameraError::Device(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
