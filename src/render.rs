//! Offline rendering: drive a player without an audio device.

use crate::buffers::Buffers;
use crate::control::EVENT_CAPACITY;
use crate::node::SampleRange;
use crate::rt::{NodePlayer, ProcessContext, ProcessStatus};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("player did not process a block: {0:?}")]
    NotProcessed(ProcessStatus),
    #[error("channel count must be greater than zero")]
    NoChannels,
    #[error("{0} channels do not fit in a WAV header")]
    TooManyChannels(usize),
    #[error("sample count {samples} is not a multiple of {channels} channels")]
    MisalignedSamples { samples: usize, channels: usize },
    #[error(transparent)]
    Wav(#[from] hound::Error),
}

/// Render `frames` frames through `player` in block-sized chunks.
///
/// Returns interleaved samples with `channels` channels. The player must
/// already have a prepared graph.
pub fn render_offline(
    player: &mut NodePlayer,
    frames: usize,
    channels: usize,
) -> Result<Vec<f32>, RenderError> {
    if channels == 0 {
        return Err(RenderError::NoChannels);
    }
    let block_size = player.block_size();
    let mut block = Buffers::new(channels, block_size, EVENT_CAPACITY);
    let mut samples = vec![0.0; frames * channels];
    let mut position = 0usize;
    while position < frames {
        let len = block_size.min(frames - position);
        let range = SampleRange::with_length(position as i64, len);
        let status = player.process(&mut ProcessContext::new(range, &mut block));
        if !status.is_processed() {
            return Err(RenderError::NotProcessed(status));
        }
        block
            .audio
            .write_interleaved(&mut samples[position * channels..], len);
        position += len;
    }
    Ok(samples)
}

/// Write interleaved samples as a 32-bit float WAV file.
pub fn write_wav(
    path: impl AsRef<Path>,
    samples: &[f32],
    channels: usize,
    sample_rate: u32,
) -> Result<(), RenderError> {
    if channels == 0 {
        return Err(RenderError::NoChannels);
    }
    let wav_channels =
        u16::try_from(channels).map_err(|_| RenderError::TooManyChannels(channels))?;
    if samples.len() % channels != 0 {
        return Err(RenderError::MisalignedSamples {
            samples: samples.len(),
            channels,
        });
    }
    let spec = hound::WavSpec {
        channels: wav_channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let path = path.as_ref();
    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    info!(
        path = %path.display(),
        frames = samples.len() / channels,
        channels,
        "wrote wav"
    );
    Ok(())
}
