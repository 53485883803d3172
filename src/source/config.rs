//! Transcoder configuration

use std::ffi::OsString;

/// Default transcoder executable
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Default read size against the transcoder output
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Options for the external transcode process
#[derive(Debug, Clone)]
pub struct TranscodeConfig {
    /// Executable to run
    pub program: String,

    /// Output frame rate
    pub fps: u32,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,

    /// MJPEG quantizer (2 = best, 31 = worst)
    pub qscale: u8,

    /// Read the input at its native rate
    pub realtime: bool,

    /// Restart the input when it ends
    pub loop_input: bool,

    /// Size of each read against the process output
    pub read_chunk_size: usize,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            fps: 10,
            width: 640,
            height: 360,
            qscale: 8,
            realtime: true,
            loop_input: false,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl TranscodeConfig {
    /// Set the executable
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the output frame rate (at least 1)
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }

    /// Set the output size
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set the MJPEG quantizer, clamped to 2..=31
    pub fn qscale(mut self, qscale: u8) -> Self {
        self.qscale = qscale.clamp(2, 31);
        self
    }

    /// Read the input at native rate
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Loop the input forever
    pub fn loop_input(mut self, loop_input: bool) -> Self {
        self.loop_input = loop_input;
        self
    }

    /// Set the read size (at least 1 byte)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size.max(1);
        self
    }

    /// Command-line arguments for transcoding `input` to MJPEG on stdout
    pub fn args(&self, input: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];

        if self.realtime {
            args.push("-re".into());
        }
        if self.loop_input {
            args.push("-stream_loop".into());
            args.push("-1".into());
        }

        args.push("-i".into());
        args.push(input.into());
        args.push("-vf".into());
        args.push(format!("fps={},scale={}:{}", self.fps, self.width, self.height).into());
        args.push("-c:v".into());
        args.push("mjpeg".into());
        args.push("-q:v".into());
        args.push(self.qscale.to_string().into());
        args.push("-f".into());
        args.push("mjpeg".into());
        args.push("pipe:1".into());

        args
    }
}
