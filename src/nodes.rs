//! Reference nodes: oscillator, gain, mixer, passthrough and delay.
//!
//! Every node here forwards the control events of its inputs unchanged.

use crate::node::{Node, PlaybackInit, ProcessArgs, SharedState};
use std::f64::consts::TAU;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn forward_events(args: &mut ProcessArgs<'_>) {
    let inputs = args.inputs;
    for input in inputs.iter() {
        args.output.events.extend_from(&input.events);
    }
}

/// Oscillator phase in cycles, shared between a node and its successor in
/// a replacement graph.
#[derive(Debug, Default)]
pub struct PhaseCell(AtomicU64);

impl PhaseCell {
    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, phase: f64) {
        self.0.store(phase.to_bits(), Ordering::Relaxed);
    }
}

/// Sine oscillator.
///
/// With a stable key the phase survives graph replacement: the node in the
/// new graph continues from the sample the old one stopped at.
#[derive(Debug)]
pub struct Sine {
    frequency: f64,
    amplitude: f32,
    key: Option<u64>,
    sample_rate: f64,
    phase: Arc<PhaseCell>,
}

impl Sine {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            amplitude: 1.0,
            key: None,
            sample_rate: 44_100.0,
            phase: Arc::new(PhaseCell::default()),
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_key(mut self, key: u64) -> Self {
        self.key = Some(key);
        self
    }

    /// Current phase in cycles, `0.0..1.0`.
    pub fn phase(&self) -> f64 {
        self.phase.get()
    }
}

impl Node for Sine {
    fn name(&self) -> &str {
        "sine"
    }

    fn initialise(&mut self, init: &PlaybackInit<'_>) {
        self.sample_rate = init.sample_rate;
        let adopted = self
            .key
            .and_then(|key| init.previous_state(key))
            .and_then(|state| Arc::clone(state).downcast::<PhaseCell>().ok());
        if let Some(phase) = adopted {
            self.phase = phase;
        }
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let frames = args.frames();
        let step = self.frequency / self.sample_rate;
        let start = self.phase.get();
        let channels = args.output.audio.channels();
        for ch in 0..channels {
            let mut phase = start;
            for sample in &mut args.output.audio.channel_mut(ch)[..frames] {
                *sample = (phase * TAU).sin() as f32 * self.amplitude;
                phase = (phase + step).fract();
            }
        }
        self.phase
            .set((start + step * frames as f64).rem_euclid(1.0));
        forward_events(args);
    }

    fn stable_key(&self) -> Option<u64> {
        self.key
    }

    fn export_state(&self) -> Option<SharedState> {
        let state: SharedState = self.phase.clone();
        Some(state)
    }
}

/// Scales its first input.
#[derive(Debug, Clone)]
pub struct Gain {
    gain: f32,
    channels: usize,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain, channels: 1 }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

impl Node for Gain {
    fn name(&self) -> &str {
        "gain"
    }

    fn output_channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let frames = args.frames();
        args.output.audio.clear();
        if let Some(input) = args.inputs.first() {
            args.output.audio.add_from(&input.audio, frames, self.gain);
        }
        forward_events(args);
    }
}

/// Sums all of its inputs.
#[derive(Debug, Clone)]
pub struct Mix {
    channels: usize,
}

impl Mix {
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl Node for Mix {
    fn name(&self) -> &str {
        "mix"
    }

    fn output_channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let frames = args.frames();
        args.output.audio.clear();
        let inputs = args.inputs;
        for input in inputs.iter() {
            args.output.audio.add_from(&input.audio, frames, 1.0);
        }
        forward_events(args);
    }
}

/// Copies its first input; silence without one.
#[derive(Debug, Clone)]
pub struct Passthrough {
    channels: usize,
}

impl Passthrough {
    pub fn new() -> Self {
        Self { channels: 1 }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for Passthrough {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn output_channels(&self) -> usize {
        self.channels
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let frames = args.frames();
        match args.inputs.first() {
            Some(input) => args.output.audio.copy_from(&input.audio, frames),
            None => args.output.audio.clear(),
        }
        forward_events(args);
    }
}

/// Delays the audio of its first input by a fixed number of samples.
///
/// Events pass through undelayed.
#[derive(Debug, Clone)]
pub struct Latency {
    delay: usize,
    channels: usize,
    lines: Vec<Vec<f32>>,
    position: usize,
}

impl Latency {
    pub fn new(delay: usize) -> Self {
        Self {
            delay,
            channels: 1,
            lines: Vec::new(),
            position: 0,
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl Node for Latency {
    fn name(&self) -> &str {
        "latency"
    }

    fn output_channels(&self) -> usize {
        self.channels
    }

    fn initialise(&mut self, _init: &PlaybackInit<'_>) {
        self.lines = vec![vec![0.0; self.delay]; self.channels];
        self.position = 0;
    }

    fn process(&mut self, args: &mut ProcessArgs<'_>) {
        let frames = args.frames();
        let input = args.inputs.first();
        let mut end = self.position;
        for ch in 0..self.channels {
            let source = input.and_then(|buffers| {
                let audio = &buffers.audio;
                match audio.channels() {
                    0 => None,
                    1 => Some(audio.channel(0)),
                    n if ch < n => Some(audio.channel(ch)),
                    _ => None,
                }
            });
            let out = &mut args.output.audio.channel_mut(ch)[..frames];
            let Some(line) = self.lines.get_mut(ch).filter(|line| !line.is_empty()) else {
                // No delay line: zero delay, or never initialised.
                match source {
                    Some(src) => {
                        for (i, o) in out.iter_mut().enumerate() {
                            *o = src.get(i).copied().unwrap_or(0.0);
                        }
                    }
                    None => out.fill(0.0),
                }
                continue;
            };
            let mut position = self.position;
            for (i, o) in out.iter_mut().enumerate() {
                let incoming = source.and_then(|src| src.get(i).copied()).unwrap_or(0.0);
                *o = line[position];
                line[position] = incoming;
                position = (position + 1) % line.len();
            }
            end = position;
        }
        self.position = end;
        forward_events(args);
    }
}
