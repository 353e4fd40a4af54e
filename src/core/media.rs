//! Audio duration lookup for the processing estimate
//!
//! The container is recognised from its content, not the file name. Formats
//! we cannot recognise report [`MediaError::Unsupported`] and the estimate
//! stays indeterminate.

use lofty::file::AudioFile as _;
use lofty::probe::Probe;
use std::io::Cursor;
use std::time::Duration;

use super::errors::MediaError;
use crate::api::AudioFile;

/// Read the playback duration of an audio file from its metadata
pub fn read_duration(file: &AudioFile) -> Result<Duration, MediaError> {
    let detected = Probe::new(Cursor::new(file.data.as_slice()))
        .guess_file_type()
        .map_err(|e| MediaError::Malformed(e.to_string()))?;
    if detected.file_type().is_none() {
        let format = file.extension().unwrap_or_else(|| "unknown".to_string());
        return Err(MediaError::Unsupported(format));
    }

    let tagged = detected
        .read()
        .map_err(|e| MediaError::Malformed(e.to_string()))?;
    let duration = tagged.properties().duration();
    if duration.is_zero() {
        return Err(MediaError::Malformed("no audio frames".into()));
    }
    Ok(duration)
}

#[cfg(test)]
pub(crate) fn wav_bytes(sample_rate: u32, seconds: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits: u16 = 16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits / 8);
    let data_len = byte_rate * seconds;

    let mut out = Vec::new();
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&(channels * bits / 8).to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.resize(out.len() + data_len as usize, 0);
    out
}
