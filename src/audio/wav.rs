//! PCM-to-WAV wrapping for the transcription engine boundary.
//!
//! The session treats audio as an opaque byte sequence; the HTTP engine
//! expects a self-describing file upload. This helper wraps accumulated
//! 16-bit little-endian PCM in a WAV container before the upload. It is not
//! part of the session state machine.

use byteorder::{LittleEndian, ReadBytesExt};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;

/// Shape of the raw PCM stream the clients send.
#[derive(Debug, Clone, Copy)]
pub struct PcmSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl Default for PcmSpec {
    fn default() -> Self {
        // 16kHz mono 16-bit PCM, the shape Whisper-style engines expect.
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
        }
    }
}

/// Wrap raw little-endian 16-bit PCM bytes in a WAV container.
///
/// A trailing odd byte (a chunk split mid-sample by the transport) is
/// dropped rather than rejected; flushes may land on any byte boundary.
pub fn wrap_pcm(pcm: &[u8], spec: PcmSpec) -> Result<Vec<u8>, hound::Error> {
    let wav_spec = WavSpec {
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        bits_per_sample: spec.bits_per_sample,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, wav_spec)?;
        let usable = pcm.len() - (pcm.len() % 2);
        let mut samples = Cursor::new(&pcm[..usable]);
        while let Ok(sample) = samples.read_i16::<LittleEndian>() {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
