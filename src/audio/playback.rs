use std::io::Cursor;

use anyhow::{Context, Result};
use rodio::source::{Source, UniformSourceIterator};
use rodio::{Decoder, OutputStream, Sink};
use tracing::info;

use crate::audio::encoder::AudioContainer;

/// Anything that can play an encoded container, e.g. the speakers or a
/// browser tab on the other end of a socket.
pub trait PlaybackSink {
    fn play(&mut self, container: AudioContainer) -> Result<()>;
}

/// Plays containers on the default output device and blocks until done.
#[derive(Debug, Default)]
pub struct SpeakerSink;

impl SpeakerSink {
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackSink for SpeakerSink {
    fn play(&mut self, container: AudioContainer) -> Result<()> {
        let bytes = container.into_bytes();
        info!(bytes = bytes.len(), "playing target audio");
        let decoder = Decoder::new_wav(Cursor::new(bytes)).context("unsupported container")?;
        play_source(decoder.convert_samples::<f32>())
    }
}

/// Keeps every container it receives; used by tests and headless runs.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub played: Vec<AudioContainer>,
}

impl PlaybackSink for CollectingSink {
    fn play(&mut self, container: AudioContainer) -> Result<()> {
        self.played.push(container);
        Ok(())
    }
}

fn play_source<S>(source: S) -> Result<()>
where
    S: Source<Item = f32> + Send + 'static,
{
    let (_stream, handle) = OutputStream::try_default().context("failed to open output stream")?;
    let sink = Sink::try_new(&handle).context("failed to create sink")?;
    sink.append(ensure_stereo(source));
    sink.set_volume(1.0);
    sink.sleep_until_end();
    Ok(())
}

fn ensure_stereo<S>(source: S) -> Box<dyn Source<Item = f32> + Send>
where
    S: Source<Item = f32> + Send + 'static,
{
    if source.channels() == 2 {
        Box::new(source)
    } else {
        let sample_rate = source.sample_rate();
        Box::new(UniformSourceIterator::new(source, 2, sample_rate))
    }
}
