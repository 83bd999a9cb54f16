//! Turning fetched bytes into sample buffers.
//!
//! WAV goes through `hound`; everything else (MP3 in particular) is probed
//! with `symphonia`. Output is always interleaved `f32` in [-1, 1].

use std::io::Cursor;

use hound::{SampleFormat, WavReader};
use symphonia::core::audio::SampleBuffer as SymphoniaBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::SampleBuffer;

/// Whether the bytes start with a RIFF/WAVE header
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode audio bytes. `extension` is a format hint taken from the URI.
pub fn decode(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, String> {
    if is_wav(&bytes) {
        match decode_wav(&bytes) {
            Ok(buffer) => return Ok(buffer),
            // hound only reads PCM/float; let symphonia try the rest
            Err(e) => log::debug!("hound could not read WAV ({}), trying symphonia", e),
        }
    }
    decode_with_symphonia(bytes, extension)
}

fn decode_wav(bytes: &[u8]) -> Result<SampleBuffer, String> {
    let mut reader = WavReader::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let frames: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    Ok(SampleBuffer::new(frames, spec.channels, spec.sample_rate))
}

fn decode_with_symphonia(bytes: Vec<u8>, extension: Option<&str>) -> Result<SampleBuffer, String> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("unsupported format: {}", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_string())?;
    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "unknown sample rate".to_string())?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("unsupported codec: {}", e))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SymphoniaBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                log::warn!("error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("skipping corrupt packet: {}", e);
                continue;
            }
            Err(e) => return Err(e.to_string()),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            if channels == 0 {
                channels = spec.channels.count() as u16;
            }
            sample_buf = Some(SymphoniaBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err("no audio frames decoded".to_string());
    }

    Ok(SampleBuffer::new(samples, channels.max(1), sample_rate))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    /// A short mono 16-bit WAV ramp, for tests elsewhere in the crate
    pub(crate) fn wav_bytes(frames: usize, sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample((i as i16) * 100).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav() {
        let buffer = decode(wav_bytes(64, 22_050), Some("wav")).unwrap();

        assert_eq!(buffer.channels(), 1);
        assert_eq!(buffer.sample_rate(), 22_050);
        assert_eq!(buffer.frame_count(), 64);
        assert!((buffer.samples()[1] - 100.0 / 32768.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let err = decode(b"definitely not audio".to_vec(), Some("mp3")).unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn test_is_wav() {
        assert!(is_wav(&wav_bytes(4, 8_000)));
        assert!(!is_wav(b"ID3\x04 some mp3"));
    }
}
