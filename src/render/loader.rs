//! Request-driven background frame loader.
//! Receives decode jobs for clip frames, decodes off-thread, shrinks anything
//! the GPU cannot hold, and returns RGBA8 buffers without blocking the render
//! loop.
use crossbeam_channel::{Receiver, Sender};
use std::thread;
use tracing::{debug, warn};

use crate::events::{DecodeFrame, DecodedFrame, InvalidFrame, LoaderReply};

/// Message sent to the background loader thread.
pub enum LoaderMsg {
    /// Decode this frame.
    Decode(DecodeFrame),
    /// Stop the loader.
    Quit,
}

/// Spawn the request-driven loader. Frames wider or taller than `max_dim`
/// are downscaled to fit. The thread ends on [`LoaderMsg::Quit`] or once
/// either channel disconnects.
pub fn spawn_loader(
    rx: Receiver<LoaderMsg>,
    tx: Sender<LoaderReply>,
    max_dim: u32,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            match msg {
                LoaderMsg::Quit => break,
                LoaderMsg::Decode(job) => {
                    let reply = match decode_frame(&job, max_dim) {
                        Ok(frame) => LoaderReply::Decoded(frame),
                        Err(err) => {
                            warn!(index = job.index, path = %job.path.display(), error = %err, "frame decode failed; skipping");
                            LoaderReply::Invalid(InvalidFrame { index: job.index })
                        }
                    };
                    if tx.send(reply).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("frame loader stopped");
    })
}

/// Largest size with the same aspect that fits in a `max_dim` square.
pub fn fit_within(w: u32, h: u32, max_dim: u32) -> (u32, u32) {
    if w <= max_dim && h <= max_dim {
        return (w, h);
    }
    let scale = f64::from(max_dim) / f64::from(w.max(h));
    let shrink = |d: u32| ((f64::from(d) * scale).round() as u32).clamp(1, max_dim);
    (shrink(w), shrink(h))
}

fn decode_frame(job: &DecodeFrame, max_dim: u32) -> image::ImageResult<DecodedFrame> {
    let mut img = image::open(&job.path)?;
    let (w, h) = (img.width(), img.height());
    let (tw, th) = fit_within(w, h, max_dim.max(1));
    if (tw, th) != (w, h) {
        debug!(index = job.index, w, h, tw, th, "frame exceeds texture limit; downscaling");
        img = img.resize_exact(tw, th, image::imageops::Triangle);
    }
    let rgba = img.to_rgba8();
    let size = rgba.dimensions();
    Ok(DecodedFrame {
        index: job.index,
        size,
        pixels: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn decodes_requested_frame_and_skips_broken_ones() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("0001.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]))
            .save(&good)
            .unwrap();
        let bad = dir.path().join("0002.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let (tx_req, rx_req) = crossbeam_channel::unbounded();
        let (tx_res, rx_res) = crossbeam_channel::unbounded();
        let handle = spawn_loader(rx_req, tx_res, 8192);

        tx_req
            .send(LoaderMsg::Decode(DecodeFrame { index: 1, path: bad }))
            .unwrap();
        tx_req
            .send(LoaderMsg::Decode(DecodeFrame { index: 0, path: good }))
            .unwrap();

        match rx_res.recv_timeout(Duration::from_secs(5)).unwrap() {
            LoaderReply::Invalid(invalid) => assert_eq!(invalid.index, 1),
            other => panic!("expected invalid frame, got {other:?}"),
        }
        let LoaderReply::Decoded(frame) = rx_res.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("expected decoded frame");
        };
        assert_eq!(frame.index, 0);
        assert_eq!(frame.size, (3, 2));
        assert_eq!(frame.pixels.len(), 3 * 2 * 4);
        assert_eq!(&frame.pixels[..4], &[10, 20, 30, 255]);

        tx_req.send(LoaderMsg::Quit).unwrap();
        handle.join().unwrap();
        assert!(rx_res.try_recv().is_err());
    }

    #[test]
    fn oversized_frames_are_downscaled_to_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let wide = dir.path().join("wide.png");
        image::RgbaImage::from_pixel(40, 10, image::Rgba([200, 0, 0, 255]))
            .save(&wide)
            .unwrap();

        let (tx_req, rx_req) = crossbeam_channel::unbounded();
        let (tx_res, rx_res) = crossbeam_channel::unbounded();
        let handle = spawn_loader(rx_req, tx_res, 16);
        tx_req
            .send(LoaderMsg::Decode(DecodeFrame { index: 3, path: wide }))
            .unwrap();

        let LoaderReply::Decoded(frame) = rx_res.recv_timeout(Duration::from_secs(5)).unwrap()
        else {
            panic!("expected decoded frame");
        };
        assert_eq!(frame.index, 3);
        assert_eq!(frame.size, (16, 4));
        assert_eq!(frame.pixels.len(), 16 * 4 * 4);

        tx_req.send(LoaderMsg::Quit).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn fit_keeps_aspect_and_leaves_small_frames_alone() {
        assert_eq!(fit_within(1920, 1080, 8192), (1920, 1080));
        assert_eq!(fit_within(16384, 8192, 8192), (8192, 4096));
        assert_eq!(fit_within(3000, 9000, 4500), (1500, 4500));
        assert_eq!(fit_within(10_000, 1, 100), (100, 1));
    }
}
