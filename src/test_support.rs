// Shared helpers for unit tests: WAV fixtures and instrumented metric backends

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f64::consts::PI;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::metrics::{BuiltinBackend, ChannelPath, MetricError, MetricFrame, MetricsBackend};

/// Encode interleaved 16-bit samples as a WAV byte buffer
pub fn wav_bytes(channels: u16, sample_rate: u32, interleaved: &[i16]) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
        for sample in interleaved {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub fn write_wav(dir: &Path, name: &str, channels: u16, sample_rate: u32, interleaved: &[i16]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, wav_bytes(channels, sample_rate, interleaved)).unwrap();
    path
}

pub fn sine(freq: f64, sample_rate: u32, secs: f64, amplitude: f64) -> Vec<i16> {
    let n = (sample_rate as f64 * secs) as usize;
    (0..n)
        .map(|i| {
            let value = amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin();
            (value * 32767.0) as i16
        })
        .collect()
}

pub fn silence(sample_rate: u32, secs: f64) -> Vec<i16> {
    vec![0; (sample_rate as f64 * secs) as usize]
}

/// Built-in backend that counts calls per channel path
#[derive(Default)]
pub struct CountingBackend {
    inner: BuiltinBackend,
    mono: AtomicUsize,
    stereo: AtomicUsize,
}

impl CountingBackend {
    /// Number of signals routed through the mono path
    pub fn mono_calls(&self) -> usize {
        self.mono.load(Ordering::SeqCst)
    }

    pub fn stereo_calls(&self) -> usize {
        self.stereo.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.mono_calls() + self.stereo_calls()
    }
}

impl MetricsBackend for CountingBackend {
    fn level_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        let counter = if path.is_stereo() { &self.stereo } else { &self.mono };
        counter.fetch_add(1, Ordering::SeqCst);
        self.inner.level_family(path, sample_rate)
    }

    fn spectral_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        self.inner.spectral_family(path, sample_rate)
    }
}

/// Backend that sleeps before delegating, for timeout tests
pub struct SlowBackend {
    pub delay: Duration,
    pub inner: BuiltinBackend,
}

impl MetricsBackend for SlowBackend {
    fn level_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        std::thread::sleep(self.delay);
        self.inner.level_family(path, sample_rate)
    }

    fn spectral_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        self.inner.spectral_family(path, sample_rate)
    }
}

/// Backend that fails for stereo signals and panics for very short ones
pub struct FaultyBackend;

impl MetricsBackend for FaultyBackend {
    fn level_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        if path.is_stereo() {
            return Err(MetricError::Backend("stereo not supported".to_string()));
        }
        if path.channels()[0].len() < 10 {
            panic!("signal too short");
        }
        BuiltinBackend::default().level_family(path, sample_rate)
    }

    fn spectral_family(&self, path: ChannelPath<'_>, sample_rate: u32) -> Result<MetricFrame, MetricError> {
        BuiltinBackend::default().spectral_family(path, sample_rate)
    }
}
