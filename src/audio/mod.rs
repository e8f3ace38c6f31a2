//! Audio decoding and speech extraction.

pub mod vad;
pub mod wav;

pub use vad::{calculate_rms, slice_speech, SpeechExtractor};
pub use wav::{decode_wav, encode_wav};
