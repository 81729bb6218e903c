// Audio ingestion module
// Resolves audio sources (uploaded buffers or files on disk) into decoded signals

use hound::{SampleFormat, WavReader};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read WAV data: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Failed to stage audio buffer: {0}")]
    StagingError(#[source] std::io::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Audio contains no samples")]
    EmptySignal,
}

/// Where the bytes of an audio source live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceData {
    /// Freshly uploaded bytes, shared so clones stay cheap
    InMemory(Arc<[u8]>),

    /// A file already resident on disk
    OnDisk(PathBuf),
}

/// One unit of input to a batch: a display name plus its byte source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSource {
    name: String,
    data: SourceData,
}

impl AudioSource {
    /// Source backed by an uploaded byte buffer
    pub fn in_memory(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        AudioSource {
            name: name.into(),
            data: SourceData::InMemory(bytes.into()),
        }
    }

    /// Source backed by a file the decoder reads directly
    pub fn on_disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        AudioSource {
            name: name.into(),
            data: SourceData::OnDisk(path.into()),
        }
    }

    /// Display name, used as the `file_name` column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the audio lives
    pub fn data(&self) -> &SourceData {
        &self.data
    }
}

/// Decoded sample data for one source
#[derive(Debug, Clone)]
pub struct DecodedSignal {
    /// Sample rate in Hz (e.g., 44100, 48000)
    pub sample_rate: u32,

    /// Bit depth of the original encoding (8, 16, 24, 32)
    pub bit_depth: u16,

    /// One sample vector per channel, normalized to [-1.0, 1.0]
    pub channels: Vec<Vec<f64>>,
}

impl DecodedSignal {
    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f64> {
        let channel_count = self.channels.len();
        if channel_count == 1 {
            return self.channels[0].clone();
        }

        let mut mono = vec![0.0; self.frame_count()];
        for channel in &self.channels {
            for (acc, sample) in mono.iter_mut().zip(channel) {
                *acc += sample;
            }
        }
        for sample in &mut mono {
            *sample /= channel_count as f64;
        }

        mono
    }
}

/// Decode capability with a path-only entry point
pub trait SignalDecoder: Send + Sync {
    fn decode_path(&self, path: &Path) -> Result<DecodedSignal, DecodeError>;
}

/// WAV decoder backed by hound
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl SignalDecoder for WavDecoder {
    fn decode_path(&self, path: &Path) -> Result<DecodedSignal, DecodeError> {
        let reader = WavReader::open(path)?;
        decode_wav(reader)
    }
}

fn decode_wav<R: Read>(mut reader: WavReader<R>) -> Result<DecodedSignal, DecodeError> {
    let spec = reader.spec();
    let channels = spec.channels as usize;
    let bit_depth = spec.bits_per_sample;

    if channels == 0 {
        return Err(DecodeError::UnsupportedFormat("zero channels".to_string()));
    }

    // Read and normalize samples to f64 [-1.0, 1.0]
    let interleaved: Vec<f64> = match (spec.sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // hound yields 8-bit PCM already shifted to signed [-128, 127]
            reader
                .samples::<i8>()
                .map(|s| s.map(|s| s as f64 / 128.0))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f64 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f64 / 8388608.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f64 / 2147483648.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<Result<_, _>>()?,
        (format, depth) => {
            return Err(DecodeError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                format, depth
            )));
        }
    };

    if interleaved.len() < channels {
        return Err(DecodeError::EmptySignal);
    }

    Ok(DecodedSignal {
        sample_rate: spec.sample_rate,
        bit_depth,
        channels: deinterleave(&interleaved, channels),
    })
}

/// Split interleaved frames into per-channel vectors, dropping a trailing partial frame
fn deinterleave(samples: &[f64], channels: usize) -> Vec<Vec<f64>> {
    let frames = samples.len() / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];

    for frame in samples.chunks_exact(channels) {
        for (channel, sample) in out.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }

    out
}

/// Uploaded bytes written to a uniquely named temporary file.
/// Dropping the value removes the file, on every exit path.
struct StagedFile {
    file: NamedTempFile,
}

impl StagedFile {
    fn create(bytes: &[u8], dir: Option<&Path>) -> Result<Self, DecodeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("soundmetrics-").suffix(".wav");

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(DecodeError::StagingError)?;

        file.write_all(bytes).map_err(DecodeError::StagingError)?;
        file.flush().map_err(DecodeError::StagingError)?;

        Ok(StagedFile { file })
    }

    fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Turns any audio source into a decoded signal.
/// In-memory sources are staged to disk because the decoder only accepts paths.
#[derive(Clone)]
pub struct SignalLoader {
    decoder: Arc<dyn SignalDecoder>,
    staging_dir: Option<PathBuf>,
}

impl SignalLoader {
    /// Loader over a custom decoder
    pub fn new(decoder: Arc<dyn SignalDecoder>) -> Self {
        SignalLoader {
            decoder,
            staging_dir: None,
        }
    }

    /// Loader using the built-in WAV decoder
    pub fn wav() -> Self {
        SignalLoader::new(Arc::new(WavDecoder))
    }

    /// Stage uploaded buffers in `dir` instead of the system temp directory
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = Some(dir.into());
        self
    }

    /// Decode a source. In-memory data is staged to a temp file first
    /// and the file is removed before this returns.
    pub fn load(&self, source: &AudioSource) -> Result<DecodedSignal, DecodeError> {
        match source.data() {
            SourceData::OnDisk(path) => self.decoder.decode_path(path),
            SourceData::InMemory(bytes) => {
                let staged = StagedFile::create(bytes, self.staging_dir.as_deref())?;
                log::debug!("Staged {} at {}", source.name(), staged.path().display());
                self.decoder.decode_path(staged.path())
            }
        }
    }
}

impl Default for SignalLoader {
    fn default() -> Self {
        SignalLoader::wav()
    }
}
