//! Audio and video metadata read from container headers.
//!
//! MP4/QuickTime files are read with the `mp4` box parser, which exposes the
//! movie header (duration, creation time) and track dimensions. Everything
//! else goes through the symphonia format reader. Neither path decodes media.

use std::io::Cursor;

use chrono::DateTime;
use serde_json::json;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{Extracted, FileFacts, MetadataExtractor};
use crate::domain::evidence::MetadataMap;
use crate::error::ExtractionError;

/// Seconds between the MP4 epoch (1904-01-01) and the Unix epoch
const MP4_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Strategy for `video/*`
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoExtractor;

/// Strategy for `audio/*`
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioExtractor;

impl MetadataExtractor for VideoExtractor {
    fn name(&self) -> &'static str {
        "video"
    }

    fn extract(&self, file: &FileFacts<'_>, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let header = match read_mp4(bytes) {
            Ok(header) => header,
            Err(mp4_error) => {
                let stream = read_stream_info(file, bytes).map_err(|_| ExtractionError::Unreadable {
                    kind: "video",
                    reason: mp4_error,
                })?;
                VideoHeader {
                    duration: stream.duration,
                    ..Default::default()
                }
            }
        };

        let metadata = MetadataMap::from([
            ("duration".to_string(), json!(header.duration)),
            ("width".to_string(), json!(header.width)),
            ("height".to_string(), json!(header.height)),
            ("creationTime".to_string(), json!(header.creation_time)),
            ("lastModified".to_string(), file.last_modified_json()),
        ]);

        Ok(Extracted { metadata, raw: None })
    }
}

impl MetadataExtractor for AudioExtractor {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn extract(&self, file: &FileFacts<'_>, bytes: &[u8]) -> Result<Extracted, ExtractionError> {
        let stream = read_stream_info(file, bytes).map_err(|reason| ExtractionError::Unreadable {
            kind: "audio",
            reason,
        })?;

        let metadata = MetadataMap::from([
            ("duration".to_string(), json!(stream.duration)),
            ("sampleRate".to_string(), json!(stream.sample_rate)),
            ("channels".to_string(), json!(stream.channels)),
            ("lastModified".to_string(), file.last_modified_json()),
        ]);

        Ok(Extracted { metadata, raw: None })
    }
}

#[derive(Debug, Default)]
struct VideoHeader {
    duration: Option<f64>,
    width: Option<u16>,
    height: Option<u16>,
    creation_time: Option<String>,
}

fn read_mp4(bytes: &[u8]) -> Result<VideoHeader, String> {
    let reader = mp4::Mp4Reader::read_header(Cursor::new(bytes), bytes.len() as u64)
        .map_err(|e| e.to_string())?;

    let duration = reader.duration().as_secs_f64();
    let video_track = reader
        .tracks()
        .values()
        .find(|track| matches!(track.track_type(), Ok(mp4::TrackType::Video)));

    // Zero means the muxer did not record a time
    let creation_time = reader
        .moov
        .mvhd
        .creation_time
        .checked_sub(MP4_EPOCH_OFFSET)
        .filter(|_| reader.moov.mvhd.creation_time != 0)
        .and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0))
        .map(|t| t.to_rfc3339());

    Ok(VideoHeader {
        duration: (duration > 0.0).then_some(duration),
        width: video_track.map(|t| t.width()).filter(|w| *w > 0),
        height: video_track.map(|t| t.height()).filter(|h| *h > 0),
        creation_time,
    })
}

#[derive(Debug, Default)]
struct StreamInfo {
    duration: Option<f64>,
    sample_rate: Option<u32>,
    channels: Option<usize>,
}

fn read_stream_info(file: &FileFacts<'_>, bytes: &[u8]) -> Result<StreamInfo, String> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = file.extension() {
        hint.with_extension(&ext);
    }
    if !file.media_type.is_empty() {
        hint.mime_type(file.media_type);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| e.to_string())?;

    let track = probed
        .format
        .default_track()
        .ok_or_else(|| "no playable track".to_string())?;
    let params = &track.codec_params;

    let duration = match (params.time_base, params.n_frames) {
        (Some(time_base), Some(frames)) => {
            let time = time_base.calc_time(frames);
            Some(time.seconds as f64 + time.frac)
        }
        _ => None,
    };

    Ok(StreamInfo {
        duration,
        sample_rate: params.sample_rate,
        channels: params.channels.map(|c| c.count()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Mono 16-bit PCM WAV of `seconds` of silence
    fn wav(sample_rate: u32, seconds: u32) -> Vec<u8> {
        let data_len = sample_rate * 2 * seconds;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVEfmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&1u16.to_le_bytes()); // mono
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        out.resize(44 + data_len as usize, 0);
        out
    }

    fn facts(name: &'static str, media_type: &'static str) -> FileFacts<'static> {
        FileFacts {
            name,
            media_type,
            size: 0,
            last_modified: None,
        }
    }

    #[test]
    fn test_wav_duration_and_format() {
        let bytes = wav(8000, 2);
        let extracted = AudioExtractor
            .extract(&facts("interview.wav", "audio/wav"), &bytes)
            .unwrap();

        let duration = extracted.metadata["duration"].as_f64().unwrap();
        assert!((duration - 2.0).abs() < 1e-6);
        assert_eq!(extracted.metadata["sampleRate"], 8000);
        assert_eq!(extracted.metadata["channels"], 1);
        assert!(extracted.metadata["lastModified"].is_null());
    }

    #[test]
    fn test_unreadable_video_headers() {
        let err = VideoExtractor
            .extract(&facts("clip.mp4", "video/mp4"), b"definitely not a movie")
            .unwrap_err();
        assert!(matches!(err, ExtractionError::Unreadable { kind: "video", .. }));
    }
}
