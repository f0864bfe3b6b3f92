//! Bookkeeping between the clip clock and the frame loader: what is on
//! screen, what is being decoded, and the one frame decoded ahead of time.

use std::collections::HashSet;

use crate::events::{DecodedFrame, LoaderReply};

/// Decode requests allowed in flight at once.
pub const MAX_IN_FLIGHT: usize = 2;

#[derive(Debug)]
pub struct FramePump {
    frame_count: usize,
    in_flight: HashSet<usize>,
    invalid: HashSet<usize>,
    shown: Option<usize>,
    prefetched: Option<DecodedFrame>,
}

impl FramePump {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            in_flight: HashSet::new(),
            invalid: HashSet::new(),
            shown: None,
            prefetched: None,
        }
    }

    /// Record a loader reply. Returns the frame only when it is the one
    /// `due` now; an early frame is parked until the clock reaches it.
    pub fn accept(&mut self, reply: LoaderReply, due: usize) -> Option<DecodedFrame> {
        match reply {
            LoaderReply::Invalid(invalid) => {
                self.in_flight.remove(&invalid.index);
                self.invalid.insert(invalid.index);
                None
            }
            LoaderReply::Decoded(frame) => {
                self.in_flight.remove(&frame.index);
                if frame.index == due {
                    Some(frame)
                } else if self.shown == Some(frame.index) {
                    None
                } else {
                    self.prefetched = Some(frame);
                    None
                }
            }
        }
    }

    /// The parked frame, once it is due.
    pub fn take_due(&mut self, due: usize) -> Option<DecodedFrame> {
        if self.prefetched.as_ref().is_some_and(|f| f.index == due) {
            self.prefetched.take()
        } else {
            None
        }
    }

    pub fn mark_shown(&mut self, index: usize) {
        self.shown = Some(index);
        if self.prefetched.as_ref().is_some_and(|f| f.index == index) {
            self.prefetched = None;
        }
    }

    /// Never request `index` again.
    pub fn mark_invalid(&mut self, index: usize) {
        self.invalid.insert(index);
    }

    pub fn mark_requested(&mut self, index: usize) {
        self.in_flight.insert(index);
    }

    pub fn shown(&self) -> Option<usize> {
        self.shown
    }

    /// Frames to ask the loader for: the due frame and its successor, minus
    /// anything on screen, parked, pending, or undecodable.
    pub fn wanted(&self, due: usize) -> Vec<usize> {
        if self.frame_count == 0 {
            return Vec::new();
        }
        let mut wanted = Vec::with_capacity(2);
        let mut budget = MAX_IN_FLIGHT.saturating_sub(self.in_flight.len());
        for index in [due, (due + 1) % self.frame_count] {
            if budget == 0 {
                break;
            }
            let parked = self.prefetched.as_ref().is_some_and(|f| f.index == index);
            if self.shown == Some(index)
                || parked
                || self.in_flight.contains(&index)
                || self.invalid.contains(&index)
                || wanted.contains(&index)
            {
                continue;
            }
            wanted.push(index);
            budget -= 1;
        }
        wanted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::InvalidFrame;

    fn decoded(index: usize) -> LoaderReply {
        LoaderReply::Decoded(DecodedFrame {
            index,
            size: (1, 1),
            pixels: vec![0, 0, 0, 255],
        })
    }

    fn request_all(pump: &mut FramePump, due: usize) -> Vec<usize> {
        let wanted = pump.wanted(due);
        for &index in &wanted {
            pump.mark_requested(index);
        }
        wanted
    }

    #[test]
    fn paused_clip_settles_on_one_frame() {
        let mut pump = FramePump::new(10);
        assert_eq!(request_all(&mut pump, 0), vec![0, 1]);

        // the successor lands first and must not be shown early
        assert!(pump.accept(decoded(1), 0).is_none());
        let frame = pump.accept(decoded(0), 0).expect("due frame");
        assert_eq!(frame.index, 0);
        pump.mark_shown(0);

        for _ in 0..5 {
            assert!(pump.wanted(0).is_empty());
            assert!(pump.take_due(0).is_none());
            assert_eq!(pump.shown(), Some(0));
        }
    }

    #[test]
    fn parked_frame_is_shown_when_due() {
        let mut pump = FramePump::new(10);
        request_all(&mut pump, 0);
        pump.accept(decoded(0), 0);
        pump.mark_shown(0);
        pump.accept(decoded(1), 0);

        let frame = pump.take_due(1).expect("parked frame");
        assert_eq!(frame.index, 1);
        pump.mark_shown(1);
        assert_eq!(request_all(&mut pump, 1), vec![2]);
    }

    #[test]
    fn stale_parked_frame_does_not_block_requests() {
        let mut pump = FramePump::new(10);
        request_all(&mut pump, 4);
        pump.accept(decoded(4), 4);
        pump.mark_shown(4);
        pump.accept(decoded(5), 4);

        // rewound to the start
        assert!(pump.take_due(0).is_none());
        assert_eq!(pump.wanted(0), vec![0, 1]);
    }

    #[test]
    fn invalid_frames_are_not_requested_again() {
        let mut pump = FramePump::new(3);
        request_all(&mut pump, 0);
        assert!(
            pump.accept(LoaderReply::Invalid(InvalidFrame { index: 0 }), 0)
                .is_none()
        );
        pump.accept(decoded(1), 0);
        assert!(pump.wanted(0).is_empty());

        // a frame the driver could not upload is dropped the same way
        pump.mark_invalid(2);
        assert!(pump.take_due(1).is_some());
        pump.mark_shown(1);
        assert!(pump.wanted(1).is_empty());
    }

    #[test]
    fn single_frame_clip_requests_once() {
        let mut pump = FramePump::new(1);
        assert_eq!(request_all(&mut pump, 0), vec![0]);
        assert!(pump.wanted(0).is_empty());
    }

    #[test]
    fn in_flight_budget_is_respected() {
        let mut pump = FramePump::new(10);
        request_all(&mut pump, 0);
        // clock jumped while both requests are pending
        assert!(pump.wanted(5).is_empty());
    }
}
