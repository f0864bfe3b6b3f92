use std::path::PathBuf;

/// Requests the input controller hands to the playback collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    TogglePlay,
    SeekStart,
    ToggleFullscreen,
    ExitFullscreen,
}

/// Ask the frame loader to decode one frame of the clip.
#[derive(Debug)]
pub struct DecodeFrame {
    pub index: usize,
    pub path: PathBuf,
}

/// A frame decoded to RGBA8 and ready for GPU upload.
#[derive(Debug)]
pub struct DecodedFrame {
    pub index: usize,
    pub size: (u32, u32),
    pub pixels: Vec<u8>,
}

/// The loader could not decode this frame; it will not be requested again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidFrame {
    pub index: usize,
}

/// Everything the loader sends back.
#[derive(Debug)]
pub enum LoaderReply {
    Decoded(DecodedFrame),
    Invalid(InvalidFrame),
}
