// Audio module
// Source intake and WAV decoding

pub mod ingest;
pub mod intake;

pub use ingest::{
    AudioSource, DecodeError, DecodedSignal, SignalDecoder, SignalLoader, SourceData, WavDecoder,
};
pub use intake::{scan_directory, sources_from_uploads, IntakeError, Upload};
