//! Sample file decoding via symphonia, with rubato resampling to the
//! output device rate. The whole file is decoded up front; the engine's
//! cache keeps the result for reuse.
//!
//! Supported formats: WAV (PCM 16/24/32 and float), AIFF, FLAC, OGG
//! Vorbis.

use std::fs::File;
use std::path::Path;

use rubato::{FftFixedIn, Resampler};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::buffer::AudioBuffer;
use crate::error::SamplerError;

/// Decode `path` fully and resample to `target_rate`.
pub fn load_sample_file(path: &Path, target_rate: u32) -> Result<AudioBuffer, SamplerError> {
    let file = File::open(path)
        .map_err(|e| SamplerError::load_failed(path, format!("open failed: {e}")))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SamplerError::load_failed(path, format!("unsupported format: {e}")))?;

    let mut reader = probed.format;
    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| SamplerError::load_failed(path, "no audio track"))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| SamplerError::load_failed(path, "unknown sample rate"))?;
    let channels = codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(1)
        .max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| SamplerError::load_failed(path, format!("decoder init: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match reader.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(SamplerError::load_failed(path, format!("read: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // Skip a corrupt frame, keep the rest of the file.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(SamplerError::load_failed(path, format!("decode: {e}"))),
        };
        append_interleaved_f32(&decoded, &mut samples)
            .map_err(|message| SamplerError::load_failed(path, message))?;
    }

    if samples.is_empty() {
        return Err(SamplerError::load_failed(path, "no audio frames decoded"));
    }

    let samples = if sample_rate != target_rate {
        resample_interleaved(&samples, channels, sample_rate, target_rate)
            .map_err(|message| SamplerError::load_failed(path, message))?
    } else {
        samples
    };

    Ok(AudioBuffer::from_interleaved(samples, channels, target_rate))
}

/// Convert one decoded packet to interleaved f32, appending to `out`.
fn append_interleaved_f32(buffer: &AudioBufferRef, out: &mut Vec<f32>) -> Result<(), String> {
    macro_rules! interleave {
        ($buf:expr, $convert:expr) => {{
            let planes = $buf.planes();
            let plane_slice = planes.planes();
            let frames = $buf.frames();
            out.reserve(frames * plane_slice.len());
            for frame in 0..frames {
                for plane in plane_slice {
                    out.push($convert(plane[frame]));
                }
            }
        }};
    }

    match buffer {
        AudioBufferRef::F32(buf) => interleave!(buf, |s: f32| s),
        AudioBufferRef::F64(buf) => interleave!(buf, |s: f64| s as f32),
        AudioBufferRef::S16(buf) => interleave!(buf, |s: i16| s as f32 / 32768.0),
        AudioBufferRef::S24(buf) => {
            interleave!(buf, |s: symphonia::core::sample::i24| s.0 as f32 / 8388608.0)
        }
        AudioBufferRef::S32(buf) => interleave!(buf, |s: i32| s as f32 / 2147483648.0),
        AudioBufferRef::U8(buf) => interleave!(buf, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => return Err("unsupported sample format".to_string()),
    }
    Ok(())
}

/// Resample interleaved samples from `input_rate` to `output_rate`,
/// trimming the tail padding introduced by the final chunk.
fn resample_interleaved(
    input: &[f32],
    channels: usize,
    input_rate: u32,
    output_rate: u32,
) -> Result<Vec<f32>, String> {
    const CHUNK_SIZE: usize = 1024;

    let mut resampler = FftFixedIn::<f32>::new(
        input_rate as usize,
        output_rate as usize,
        CHUNK_SIZE,
        2,
        channels,
    )
    .map_err(|e| format!("resampler init: {e}"))?;

    let input_frames = input.len() / channels;
    let ratio = output_rate as f64 / input_rate as f64;
    let expected_frames = (input_frames as f64 * ratio).round() as usize;

    // Deinterleave into per-channel buffers.
    let mut planar: Vec<Vec<f32>> = vec![Vec::with_capacity(input_frames); channels];
    for (i, sample) in input.iter().enumerate() {
        planar[i % channels].push(*sample);
    }
    // Pad to a whole number of chunks; the excess is trimmed below.
    let padded = input_frames.div_ceil(CHUNK_SIZE) * CHUNK_SIZE;
    for plane in &mut planar {
        plane.resize(padded, 0.0);
    }

    let mut output: Vec<f32> = Vec::with_capacity(expected_frames * channels);
    let mut offset = 0;
    while offset < padded {
        let chunk: Vec<&[f32]> = planar
            .iter()
            .map(|plane| &plane[offset..offset + CHUNK_SIZE])
            .collect();
        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| format!("resample: {e}"))?;
        let frames = resampled.first().map(|p| p.len()).unwrap_or(0);
        for frame in 0..frames {
            for plane in &resampled {
                output.push(plane[frame]);
            }
        }
        offset += CHUNK_SIZE;
    }

    output.truncate(expected_frames * channels);
    Ok(output)
}
