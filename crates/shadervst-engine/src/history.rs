//! Rolling per-channel audio history exposed to shaders as `iAudioChannelN[size]`.
//!
//! Each channel keeps `max_declared + margin` samples, where `margin` covers
//! `DELAY_LATENCY` seconds at the current sample rate. Programs see a
//! `declared`-long window that slides through the margin as render time
//! advances between audio callbacks.

use std::ops::Range;

use crate::DELAY_LATENCY;

pub const CHANNEL_COUNT: usize = 2;

/// Smallest and largest accepted `iAudioChannelN` array sizes.
pub const MIN_WINDOW: usize = 16;
pub const MAX_WINDOW: usize = 2048;

/// Shift `buf` left by `new.len()` and append `new` at the tail.
///
/// When `new` is longer than `buf`, only its most recent `buf.len()` samples
/// are kept.
pub fn advance(buf: &mut [f32], new: &[f32]) {
    let len = buf.len();
    let n = new.len();
    if n >= len {
        buf.copy_from_slice(&new[n - len..]);
    } else {
        buf.copy_within(n.., 0);
        buf[len - n..].copy_from_slice(new);
    }
}

/// Same as [`advance`] with a block of silence.
pub fn advance_silence(buf: &mut [f32], n: usize) {
    let len = buf.len();
    if n >= len {
        buf.fill(0.0);
    } else {
        buf.copy_within(n.., 0);
        buf[len - n..].fill(0.0);
    }
}

/// Samples reserved for the latency margin at `sample_rate`.
pub fn margin_samples(sample_rate: f64) -> usize {
    if sample_rate <= 0.0 {
        return 0;
    }
    (sample_rate * DELAY_LATENCY).ceil() as usize
}

/// How far into the margin the visible window has slid.
///
/// `current` lies in `[last - DELAY_LATENCY, last]`; the lower bound maps to
/// 0 (oldest window) and the upper bound to `margin` (newest window).
pub fn sample_pos(current: f64, last: f64, sample_rate: f64, margin: usize) -> usize {
    let behind = current - (last - DELAY_LATENCY);
    let pos = (behind * sample_rate).round();
    if pos <= 0.0 {
        0
    } else {
        (pos as usize).min(margin)
    }
}

/// Index range of a `declared`-long window inside a buffer sized for
/// `max_declared` plus margin.
pub fn window_range(max_declared: usize, declared: usize, sample_pos: usize) -> Range<usize> {
    let declared = declared.min(max_declared);
    let start = max_declared - declared + sample_pos;
    start..start + declared
}

/// Per-channel history buffers.
///
/// The capture bridge owns one instance behind its lock; the render thread
/// keeps a copy refreshed with [`AudioHistory::copy_from`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioHistory {
    channels: [Vec<f32>; CHANNEL_COUNT],
    /// Largest window any program declares, per channel (0 = unused).
    windows: [usize; CHANNEL_COUNT],
    margin: usize,
}

impl AudioHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn windows(&self) -> [usize; CHANNEL_COUNT] {
        self.windows
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        self.channels.get(channel).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total buffer length for `channel` (0 when no program reads it).
    pub fn len(&self, channel: usize) -> usize {
        self.channel(channel).len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.iter().all(Vec::is_empty)
    }

    /// Change the declared window sizes and reallocate zero-filled.
    pub fn set_windows(&mut self, windows: [usize; CHANNEL_COUNT], sample_rate: f64) {
        self.windows = windows.map(|w| w.min(MAX_WINDOW));
        self.reallocate(sample_rate);
    }

    /// Resize every used channel to `window + margin` samples and zero it.
    pub fn reallocate(&mut self, sample_rate: f64) {
        self.margin = margin_samples(sample_rate);
        for (buf, &window) in self.channels.iter_mut().zip(self.windows.iter()) {
            buf.clear();
            if window > 0 {
                buf.resize(window + self.margin, 0.0);
            }
        }
    }

    /// Append one audio block. A channel missing from `input` mirrors
    /// channel 0; no input at all advances with silence.
    pub fn push_block(&mut self, input: &[&[f32]], frames: usize) {
        for (c, buf) in self.channels.iter_mut().enumerate() {
            if buf.is_empty() {
                continue;
            }
            match input.get(c).or_else(|| input.first()) {
                Some(samples) => advance(buf, samples),
                None => advance_silence(buf, frames),
            }
        }
    }

    /// Refresh this copy from `other`, reusing existing allocations.
    pub fn copy_from(&mut self, other: &AudioHistory) {
        for (dst, src) in self.channels.iter_mut().zip(other.channels.iter()) {
            dst.clear();
            dst.extend_from_slice(src);
        }
        self.windows = other.windows;
        self.margin = other.margin;
    }

    /// Reset to the unallocated state, keeping declared windows.
    pub fn clear(&mut self) {
        for buf in &mut self.channels {
            buf.clear();
        }
        self.margin = 0;
    }

    /// The `declared`-long window a program sees at `sample_pos`, or `None`
    /// when the channel holds no audio yet.
    pub fn window(&self, channel: usize, declared: usize, sample_pos: usize) -> Option<&[f32]> {
        let buf = self.channel(channel);
        let max_declared = *self.windows.get(channel)?;
        if buf.is_empty() || declared == 0 || declared > max_declared {
            return None;
        }
        let range = window_range(max_declared, declared, sample_pos.min(self.margin));
        buf.get(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_keeps_previous_tail_and_appends_block() {
        let mut buf = [1.0, 2.0, 3.0, 4.0, 5.0];
        advance(&mut buf, &[6.0, 7.0]);
        assert_eq!(buf, [3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn advance_with_oversized_block_keeps_most_recent() {
        let mut buf = [0.0; 3];
        advance(&mut buf, &[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buf, [3.0, 4.0, 5.0]);
    }

    #[test]
    fn advance_with_exact_block_replaces_everything() {
        let mut buf = [9.0; 4];
        advance(&mut buf, &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buf, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn advance_property_holds_for_many_lengths() {
        for len in 1..12usize {
            for n in 0..20usize {
                let prev: Vec<f32> = (0..len).map(|i| i as f32).collect();
                let block: Vec<f32> = (0..n).map(|i| 100.0 + i as f32).collect();
                let mut buf = prev.clone();
                advance(&mut buf, &block);

                let kept = n.min(len);
                assert_eq!(&buf[len - kept..], &block[n - kept..]);
                assert_eq!(&buf[..len - kept], &prev[kept..]);
            }
        }
    }

    #[test]
    fn margin_covers_delay_latency() {
        assert_eq!(margin_samples(44100.0), 706);
        assert_eq!(margin_samples(48000.0), 768);
        assert_eq!(margin_samples(0.0), 0);
    }

    #[test]
    fn sample_pos_spans_the_margin() {
        let margin = margin_samples(48000.0);
        assert_eq!(sample_pos(10.0 - DELAY_LATENCY, 10.0, 48000.0, margin), 0);
        assert_eq!(sample_pos(10.0, 10.0, 48000.0, margin), margin);
        assert_eq!(sample_pos(9.0, 10.0, 48000.0, margin), 0);
        let mid = sample_pos(10.0 - DELAY_LATENCY / 2.0, 10.0, 48000.0, margin);
        assert!((mid as i64 - 384).abs() <= 1);
    }

    #[test]
    fn window_range_slides_within_margin() {
        assert_eq!(window_range(1024, 256, 0), 768..1024);
        assert_eq!(window_range(1024, 256, 706), 1474..1730);
        assert_eq!(window_range(256, 256, 10), 10..266);
    }

    #[test]
    fn unused_channels_stay_unallocated() {
        let mut h = AudioHistory::new();
        h.set_windows([256, 0], 44100.0);
        assert_eq!(h.len(0), 256 + 706);
        assert_eq!(h.len(1), 0);
        h.push_block(&[&[1.0; 64], &[2.0; 64]], 64);
        assert_eq!(h.channel(0)[h.len(0) - 1], 1.0);
        assert!(h.channel(1).is_empty());
    }

    #[test]
    fn missing_right_channel_mirrors_left() {
        let mut h = AudioHistory::new();
        h.set_windows([16, 16], 1000.0);
        h.push_block(&[&[0.5; 4]], 4);
        assert_eq!(h.channel(1)[h.len(1) - 1], 0.5);
    }

    #[test]
    fn no_input_advances_silence() {
        let mut h = AudioHistory::new();
        h.set_windows([16, 0], 1000.0);
        h.push_block(&[&[1.0; 32]], 32);
        h.push_block(&[], 8);
        let ch = h.channel(0);
        assert!(ch[ch.len() - 8..].iter().all(|&s| s == 0.0));
        assert_eq!(ch[ch.len() - 9], 1.0);
    }

    #[test]
    fn newest_window_ends_at_the_tail() {
        let mut h = AudioHistory::new();
        h.set_windows([32, 0], 1000.0);
        let block: Vec<f32> = (0..64).map(|i| i as f32).collect();
        h.push_block(&[block.as_slice()], block.len());

        let w = h.window(0, 16, h.margin()).unwrap();
        assert_eq!(w.len(), 16);
        assert_eq!(w[15], 63.0);
        assert_eq!(w[0], 48.0);
    }

    #[test]
    fn window_rejects_oversized_requests() {
        let mut h = AudioHistory::new();
        h.set_windows([32, 0], 1000.0);
        assert!(h.window(0, 64, 0).is_none());
        assert!(h.window(1, 16, 0).is_none());
    }

    #[test]
    fn copy_from_reuses_buffers() {
        let mut src = AudioHistory::new();
        src.set_windows([16, 16], 1000.0);
        src.push_block(&[&[0.25; 8], &[0.75; 8]], 8);

        let mut dst = AudioHistory::new();
        dst.copy_from(&src);
        assert_eq!(dst, src);
    }
}
