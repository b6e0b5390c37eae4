use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError};
use std::sync::Arc;
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, BuildStreamError, DefaultStreamConfigError, Device, FromSample, PlayStreamError,
    Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::audio::analyser::{AnalyserSettings, SpectrumAnalyser};
use crate::audio::resample;
use crate::types::{RecordingBuffer, SpectralFrame, WaveformRecording};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),
    #[error("no audio input device available: {0}")]
    DeviceUnavailable(String),
    #[error("capture is already running")]
    AlreadyActive,
    #[error("audio backend error: {0}")]
    Backend(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub device_name: Option<String>,
    pub latency_ms: RangeInclusive<u32>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Samples quieter than this are zeroed when noise suppression is on.
    pub noise_gate_threshold: f32,
    /// Peak level the auto gain steers toward.
    pub target_peak: f32,
    pub max_gain: f32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device_name: None,
            latency_ms: default_latency_range(),
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            noise_gate_threshold: 0.01,
            target_peak: 0.5,
            max_gain: 8.0,
        }
    }
}

fn default_latency_range() -> RangeInclusive<u32> {
    100..=200
}

/// Source of raw mono samples, typically a microphone.
///
/// `start` blocks until the device (and any permission prompt) resolves and
/// returns the native sample rate.
pub trait CaptureSource {
    fn start(&mut self) -> Result<u32, CaptureError>;
    /// Samples delivered since the previous call; empty when nothing arrived.
    fn take_available(&mut self) -> Vec<f32>;
    fn stop(&mut self);
}

/// An active capture session. Owned by whoever called
/// [`SpectralCapture::start_capture`] and handed back on every poll.
pub struct CaptureHandle {
    device_rate: u32,
    analyser: SpectrumAnalyser,
    conditioner: InputConditioner,
    started: Instant,
    buffer: Option<RecordingBuffer>,
    finalized: Option<WaveformRecording>,
    last_timestamp_ms: Option<u64>,
}

impl CaptureHandle {
    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }

    pub fn frame_count(&self) -> usize {
        match (&self.buffer, &self.finalized) {
            (Some(buffer), _) => buffer.len(),
            (None, Some(recording)) => recording.len(),
            (None, None) => 0,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    fn next_timestamp(&mut self) -> u64 {
        let elapsed = self.started.elapsed().as_millis() as u64;
        let timestamp = match self.last_timestamp_ms {
            Some(last) => elapsed.max(last + 1),
            None => elapsed,
        };
        self.last_timestamp_ms = Some(timestamp);
        timestamp
    }
}

/// Turns a [`CaptureSource`] into a stream of spectral frames.
pub struct SpectralCapture<C: CaptureSource> {
    source: C,
    settings: CaptureSettings,
    analysis: AnalyserSettings,
    active: bool,
}

impl<C: CaptureSource> SpectralCapture<C> {
    pub fn new(source: C, settings: CaptureSettings, analysis: AnalyserSettings) -> Self {
        Self {
            source,
            settings,
            analysis,
            active: false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn analysis(&self) -> &AnalyserSettings {
        &self.analysis
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut C {
        &mut self.source
    }

    pub fn start_capture(&mut self) -> Result<CaptureHandle, CaptureError> {
        if self.active {
            return Err(CaptureError::AlreadyActive);
        }
        info!(
            echo_cancellation = self.settings.echo_cancellation,
            noise_suppression = self.settings.noise_suppression,
            auto_gain_control = self.settings.auto_gain_control,
            bins = self.analysis.bin_count(),
            "starting spectral capture"
        );
        if self.settings.echo_cancellation {
            debug!("echo cancellation requested; not available from the host backend");
        }
        let device_rate = match self.source.start() {
            Ok(0) => {
                self.source.stop();
                return Err(CaptureError::Backend(
                    "device reported a zero sample rate".to_string(),
                ));
            }
            Ok(rate) => rate,
            Err(err) => {
                self.source.stop();
                warn!(error = %err, "capture source failed to start");
                return Err(err);
            }
        };
        self.active = true;
        info!(device_rate, analysis_rate = self.analysis.sample_rate, "capture started");
        Ok(CaptureHandle {
            device_rate,
            analyser: SpectrumAnalyser::new(self.analysis.clone()),
            conditioner: InputConditioner::from_settings(&self.settings),
            started: Instant::now(),
            buffer: Some(RecordingBuffer::new()),
            finalized: None,
            last_timestamp_ms: None,
        })
    }

    /// Samples the current spectrum. While the handle is live the frame is
    /// also appended to its recording.
    pub fn poll_frame(&mut self, handle: &mut CaptureHandle) -> SpectralFrame {
        if handle.is_finalized() {
            let timestamp = handle.next_timestamp();
            return handle.analyser.frame(timestamp);
        }
        let mut chunk = self.source.take_available();
        if !chunk.is_empty() {
            handle.conditioner.process(&mut chunk);
            match resample::linear_resample(&chunk, handle.device_rate, self.analysis.sample_rate)
            {
                Ok(resampled) => handle.analyser.push_samples(&resampled),
                Err(err) => warn!(error = %err, "dropping capture chunk"),
            }
        }
        let timestamp = handle.next_timestamp();
        let frame = handle.analyser.frame(timestamp);
        if let Some(buffer) = handle.buffer.as_mut() {
            buffer.push(frame.clone());
            if buffer.len() % 120 == 0 {
                debug!(frames = buffer.len(), timestamp, "capture progress");
            }
        }
        frame
    }

    /// Releases the device and freezes the recording. Calling it again returns
    /// the same recording.
    pub fn stop_capture(&mut self, handle: &mut CaptureHandle) -> WaveformRecording {
        if let Some(recording) = &handle.finalized {
            return recording.clone();
        }
        if self.active {
            self.source.stop();
            self.active = false;
        }
        let recording = handle.buffer.take().unwrap_or_default().freeze();
        info!(
            frames = recording.len(),
            span_ms = recording.span_ms(),
            "capture stopped"
        );
        handle.finalized = Some(recording.clone());
        recording
    }
}

impl<C: CaptureSource> Drop for SpectralCapture<C> {
    fn drop(&mut self) {
        if self.active {
            self.source.stop();
        }
    }
}

/// Software stand-ins for the browser capture constraints.
struct InputConditioner {
    gate: Option<f32>,
    gain: Option<AutoGain>,
}

struct AutoGain {
    target_peak: f32,
    max_gain: f32,
    envelope: f32,
}

impl InputConditioner {
    fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            gate: settings
                .noise_suppression
                .then_some(settings.noise_gate_threshold.max(0.0)),
            gain: settings.auto_gain_control.then(|| AutoGain {
                target_peak: settings.target_peak.clamp(0.01, 1.0),
                max_gain: settings.max_gain.max(1.0),
                envelope: 0.0,
            }),
        }
    }

    fn process(&mut self, samples: &mut [f32]) {
        if let Some(threshold) = self.gate {
            for sample in samples.iter_mut() {
                if sample.abs() < threshold {
                    *sample = 0.0;
                }
            }
        }
        if let Some(agc) = self.gain.as_mut() {
            let peak = samples.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
            agc.envelope = peak.max(agc.envelope * 0.95);
            if agc.envelope > 1e-4 {
                let gain = (agc.target_peak / agc.envelope).min(agc.max_gain);
                for sample in samples.iter_mut() {
                    *sample = (*sample * gain).clamp(-1.0, 1.0);
                }
            }
        }
    }
}

/// Microphone capture through the default cpal host.
pub struct LiveCaptureSource {
    settings: CaptureSettings,
    live: Option<LiveCapture>,
}

impl LiveCaptureSource {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            settings: settings.clone(),
            live: None,
        }
    }
}

impl CaptureSource for LiveCaptureSource {
    fn start(&mut self) -> Result<u32, CaptureError> {
        info!(
            device = ?self.settings.device_name,
            latency_ms = ?self.settings.latency_ms,
            "opening live capture stream"
        );
        let live = LiveCapture::start(&self.settings).map_err(|err| {
            error!(device = ?self.settings.device_name, error = %err, "failed to open microphone");
            err
        })?;
        let sample_rate = live.sample_rate;
        self.live = Some(live);
        Ok(sample_rate)
    }

    fn take_available(&mut self) -> Vec<f32> {
        self.live
            .as_ref()
            .map(LiveCapture::drain)
            .unwrap_or_default()
    }

    fn stop(&mut self) {
        if let Some(capture) = self.live.take() {
            capture.stop();
        }
    }
}

struct LiveCapture {
    stream: Stream,
    receiver: Receiver<Vec<f32>>,
    finished: Arc<AtomicBool>,
    sample_rate: u32,
}

impl LiveCapture {
    fn start(settings: &CaptureSettings) -> Result<Self, CaptureError> {
        let device = select_device(settings.device_name.as_deref())?;
        let supported = device
            .default_input_config()
            .map_err(map_config_error)?;
        let stream_config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: BufferSize::Default,
        };
        let capacity = channel_capacity(stream_config.sample_rate.0, &settings.latency_ms);
        // Single producer (audio thread) feeding a single consumer (frame loop).
        let (sender, receiver) = mpsc::sync_channel::<Vec<f32>>(capacity);
        let finished = Arc::new(AtomicBool::new(false));
        let stream = match supported.sample_format() {
            SampleFormat::F32 => {
                build_typed_stream::<f32>(&device, &stream_config, sender, finished.clone())
            }
            SampleFormat::I16 => {
                build_typed_stream::<i16>(&device, &stream_config, sender, finished.clone())
            }
            SampleFormat::U16 => {
                build_typed_stream::<u16>(&device, &stream_config, sender, finished.clone())
            }
            other => {
                return Err(CaptureError::Backend(format!(
                    "unsupported input sample format {:?}",
                    other
                )))
            }
        }
        .map_err(map_build_error)?;
        stream.play().map_err(map_play_error)?;
        Ok(Self {
            stream,
            receiver,
            finished,
            sample_rate: stream_config.sample_rate.0,
        })
    }

    fn drain(&self) -> Vec<f32> {
        let mut pending = VecDeque::new();
        loop {
            match self.receiver.try_recv() {
                Ok(chunk) => pending.push_back(chunk),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        pending.into_iter().flatten().collect()
    }

    fn stop(&self) {
        self.finished.store(true, Ordering::SeqCst);
        let _ = self.stream.pause();
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Names of the input devices the default host can see.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|err| CaptureError::Backend(err.to_string()))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

fn select_device(name: Option<&str>) -> Result<Device, CaptureError> {
    let host = cpal::default_host();
    if let Some(name) = name {
        let mut devices = host
            .input_devices()
            .map_err(|err| CaptureError::Backend(err.to_string()))?;
        return devices
            .find(|device| device.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| {
                CaptureError::DeviceUnavailable(format!("input device '{}' not found", name))
            });
    }
    host.default_input_device()
        .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".to_string()))
}

fn build_typed_stream<T>(
    device: &Device,
    config: &StreamConfig,
    sender: SyncSender<Vec<f32>>,
    finished: Arc<AtomicBool>,
) -> Result<Stream, BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            emit_mono(data, channels, &sender, &finished)
        },
        |err| error!(error = %err, "audio input stream error"),
        None,
    )
}

fn emit_mono<T>(data: &[T], channels: usize, sender: &SyncSender<Vec<f32>>, finished: &AtomicBool)
where
    T: SizedSample,
    f32: FromSample<T>,
{
    if finished.load(Ordering::Relaxed) || channels == 0 {
        return;
    }
    let mut frame = Vec::with_capacity(channels);
    let mut mono = Vec::with_capacity(data.len() / channels);
    for interleaved in data.chunks(channels) {
        frame.clear();
        frame.extend(interleaved.iter().map(|&s| s.to_sample::<f32>()));
        mono.push(mix_to_mono(&frame));
    }
    // Full queue: the frame loop fell behind, drop rather than block the audio thread.
    let _ = sender.try_send(mono);
}

fn map_config_error(err: DefaultStreamConfigError) -> CaptureError {
    match err {
        DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disconnected".to_string())
        }
        other => classify_backend_message(other.to_string()),
    }
}

fn map_build_error(err: BuildStreamError) -> CaptureError {
    match err {
        BuildStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disconnected".to_string())
        }
        other => classify_backend_message(other.to_string()),
    }
}

fn map_play_error(err: PlayStreamError) -> CaptureError {
    match err {
        PlayStreamError::DeviceNotAvailable => {
            CaptureError::DeviceUnavailable("device disconnected".to_string())
        }
        other => classify_backend_message(other.to_string()),
    }
}

/// Backends report a refused microphone permission only as free text.
fn classify_backend_message(message: String) -> CaptureError {
    let lower = message.to_lowercase();
    let denied = ["permission", "denied", "not authorized", "unauthorized"]
        .iter()
        .any(|needle| lower.contains(needle));
    if denied {
        CaptureError::PermissionDenied(message)
    } else {
        CaptureError::Backend(message)
    }
}

fn channel_capacity(sample_rate: u32, latency_ms: &RangeInclusive<u32>) -> usize {
    let max_latency = (*latency_ms.end()).max(*latency_ms.start());
    let frames = (sample_rate as u64 * max_latency as u64) / 1000;
    let approx_chunks = (frames / 256).max(4);
    approx_chunks as usize
}

pub fn mix_to_mono(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().sum::<f32>() / frame.len() as f32
}

/// Scripted capture source for tests and offline runs: hands out one chunk
/// per poll, or fails to start with a fixed error.
pub struct MockCapture {
    sample_rate: u32,
    chunks: VecDeque<Vec<f32>>,
    failure: Option<CaptureError>,
    started: bool,
    start_count: usize,
    stop_count: usize,
}

impl MockCapture {
    pub fn from_samples(sample_rate: u32, samples: Vec<f32>, chunk_len: usize) -> Self {
        let mut chunks = VecDeque::new();
        if chunk_len == 0 {
            chunks.push_back(samples);
        } else {
            for chunk in samples.chunks(chunk_len) {
                chunks.push_back(chunk.to_vec());
            }
        }
        Self {
            sample_rate,
            chunks,
            failure: None,
            started: false,
            start_count: 0,
            stop_count: 0,
        }
    }

    pub fn silent(sample_rate: u32) -> Self {
        Self::from_samples(sample_rate, Vec::new(), 0)
    }

    pub fn failing(error: CaptureError) -> Self {
        Self {
            failure: Some(error),
            ..Self::silent(44_100)
        }
    }

    /// Lets a failing source succeed on the next start.
    pub fn recover(&mut self) {
        self.failure = None;
    }

    pub fn start_count(&self) -> usize {
        self.start_count
    }

    pub fn stop_count(&self) -> usize {
        self.stop_count
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}

impl CaptureSource for MockCapture {
    fn start(&mut self) -> Result<u32, CaptureError> {
        self.start_count += 1;
        if let Some(err) = self.failure.clone() {
            return Err(err);
        }
        self.started = true;
        Ok(self.sample_rate)
    }

    fn take_available(&mut self) -> Vec<f32> {
        if !self.started {
            return Vec::new();
        }
        self.chunks.pop_front().unwrap_or_default()
    }

    fn stop(&mut self) {
        self.stop_count += 1;
        self.started = false;
    }
}

impl<C: CaptureSource + ?Sized> CaptureSource for Box<C> {
    fn start(&mut self) -> Result<u32, CaptureError> {
        (**self).start()
    }

    fn take_available(&mut self) -> Vec<f32> {
        (**self).take_available()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}
