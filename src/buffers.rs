//! Audio and control buffers exchanged between nodes and the caller.

#![forbid(unsafe_code)]

use crate::control::EventBuffer;

/// Channel-major block of `f32` samples with fixed dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: usize,
    frames: usize,
    data: Vec<f32>,
}

impl AudioBuffer {
    /// Allocate a silent buffer.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            channels,
            frames,
            data: vec![0.0; channels * frames],
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Samples of one channel.
    ///
    /// # Panics
    /// Panics if `index >= channels()`.
    pub fn channel(&self, index: usize) -> &[f32] {
        assert!(index < self.channels, "channel {index} out of range");
        &self.data[index * self.frames..(index + 1) * self.frames]
    }

    /// Mutable samples of one channel.
    ///
    /// # Panics
    /// Panics if `index >= channels()`.
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        assert!(index < self.channels, "channel {index} out of range");
        &mut self.data[index * self.frames..(index + 1) * self.frames]
    }

    /// Iterate over channels.
    pub fn iter_channels(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.channels).map(move |ch| self.channel(ch))
    }

    /// Zero every sample.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy the first `frames` frames of `src` into this buffer.
    ///
    /// Only the overlapping channels and frames are copied; everything else
    /// in `self` is zeroed. Never reallocates.
    pub fn copy_from(&mut self, src: &AudioBuffer, frames: usize) {
        let frames = frames.min(self.frames).min(src.frames);
        for ch in 0..self.channels {
            let dst = self.channel_mut(ch);
            if ch < src.channels {
                dst[..frames].copy_from_slice(&src.channel(ch)[..frames]);
                dst[frames..].fill(0.0);
            } else {
                dst.fill(0.0);
            }
        }
    }

    /// Mix `gain * src` into this buffer over the first `frames` frames.
    ///
    /// A mono source is spread over every destination channel.
    pub fn add_from(&mut self, src: &AudioBuffer, frames: usize, gain: f32) {
        if src.channels == 0 {
            return;
        }
        let frames = frames.min(self.frames).min(src.frames);
        for ch in 0..self.channels {
            let src_ch = if src.channels == 1 { 0 } else { ch };
            if src_ch >= src.channels {
                continue;
            }
            let from = &src.data[src_ch * src.frames..src_ch * src.frames + frames];
            let to = &mut self.data[ch * self.frames..ch * self.frames + frames];
            for (o, &i) in to.iter_mut().zip(from) {
                *o += i * gain;
            }
        }
    }

    /// Write the first `frames` frames interleaved into `out`.
    ///
    /// Returns the number of frames written, limited by `out.len() / channels`.
    pub fn write_interleaved(&self, out: &mut [f32], frames: usize) -> usize {
        if self.channels == 0 {
            return 0;
        }
        let frames = frames.min(self.frames).min(out.len() / self.channels);
        for frame in 0..frames {
            for ch in 0..self.channels {
                out[frame * self.channels + ch] = self.data[ch * self.frames + frame];
            }
        }
        frames
    }
}

/// Everything a node produces in one block: audio plus control events.
#[derive(Debug, Clone, PartialEq)]
pub struct Buffers {
    pub audio: AudioBuffer,
    pub events: EventBuffer,
}

impl Buffers {
    pub fn new(channels: usize, frames: usize, event_capacity: usize) -> Self {
        Self {
            audio: AudioBuffer::new(channels, frames),
            events: EventBuffer::with_capacity(event_capacity),
        }
    }

    /// Copy audio (first `frames` frames) and events from `src`.
    ///
    /// Returns the number of events that did not fit.
    pub fn copy_from(&mut self, src: &Buffers, frames: usize) -> usize {
        self.audio.copy_from(&src.audio, frames);
        self.events.copy_from(&src.events)
    }

    pub fn clear(&mut self) {
        self.audio.clear();
        self.events.clear();
    }
}
