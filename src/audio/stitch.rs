// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Overlap-add stitching of fixed-size decoder output slices.
//!
//! A decoder that works on overlapping windows produces slices laid out as
//!
//! ```text
//! | pad | core ............................ | pad |
//! ```
//!
//! where each slice's leading pad covers the same samples as the previous
//! slice's trailing pad. The stitcher:
//!
//! * drops the leading pad of the first slice
//! * cross-fades the carried trailing pad into the next slice's leading pad over
//!   a `blend` window, with `fade_in[i] + fade_out[i] == 1`
//! * keeps the last trailing pad until [`SliceStitcher::finish`]
//! * never emits more than `total_len` samples when a total is known

/// Incremental stitcher. Feed slices in order with [`push`](Self::push); each
/// call returns the samples that are final so far.
#[derive(Debug, Clone)]
pub struct SliceStitcher {
    pad: usize,
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
    total_len: Option<usize>,
    carry: Vec<f32>,
    emitted: usize,
    started: bool,
}

impl SliceStitcher {
    /// `blend` is clamped to `pad`.
    pub fn new(pad: usize, blend: usize, total_len: Option<usize>) -> Self {
        let blend = blend.min(pad);
        let fade_in: Vec<f32> = (0..blend)
            .map(|i| (i + 1) as f32 / (blend + 1) as f32)
            .collect();
        let fade_out = fade_in.iter().map(|w| 1.0 - w).collect();

        Self {
            pad,
            fade_in,
            fade_out,
            total_len,
            carry: Vec::new(),
            emitted: 0,
            started: false,
        }
    }

    pub fn fade_in(&self) -> &[f32] {
        &self.fade_in
    }

    pub fn fade_out(&self) -> &[f32] {
        &self.fade_out
    }

    /// Number of samples returned so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn push(&mut self, slice: &[f32]) -> Vec<f32> {
        let head = self.pad.min(slice.len());
        let tail_start = slice.len().saturating_sub(self.pad).max(head);
        let mut out = Vec::with_capacity(tail_start);

        if self.started {
            let overlap = head.min(self.carry.len());
            for i in 0..head {
                let sample = if i < overlap && i < self.fade_in.len() {
                    self.carry[i] * self.fade_out[i] + slice[i] * self.fade_in[i]
                } else {
                    slice[i]
                };
                out.push(sample);
            }
        }
        self.started = true;

        out.extend_from_slice(&slice[head..tail_start]);
        self.carry = slice[tail_start..].to_vec();
        self.clip(out)
    }

    /// Flush the trailing pad of the last slice and pad with silence up to
    /// `total_len` if the slices fell short of it.
    pub fn finish(&mut self) -> Vec<f32> {
        let mut out = std::mem::take(&mut self.carry);
        if let Some(total) = self.total_len {
            let produced = self.emitted + out.len();
            if produced < total {
                out.resize(out.len() + (total - produced), 0.0);
            }
        }
        self.clip(out)
    }

    fn clip(&mut self, mut out: Vec<f32>) -> Vec<f32> {
        if let Some(total) = self.total_len {
            out.truncate(total.saturating_sub(self.emitted));
        }
        self.emitted += out.len();
        out
    }
}

/// Stitch a complete set of slices in one go.
pub fn stitch<'a, I>(slices: I, pad: usize, blend: usize, total_len: Option<usize>) -> Vec<f32>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut stitcher = SliceStitcher::new(pad, blend, total_len);
    let mut out = Vec::new();
    for slice in slices {
        out.extend(stitcher.push(slice));
    }
    out.extend(stitcher.finish());
    out
}
