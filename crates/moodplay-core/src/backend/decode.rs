//! symphonia decoding shared by both backends.
//!
//! `decode_clip` decodes a whole file to `f32` for the clip backend.
//! `PcmReader` decodes incrementally to signed 16-bit little-endian PCM for
//! the streaming worker, and can be reopened part-way through a file for
//! seeking. `inspect` reads the facts the streaming backend needs up front.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use lofty::prelude::*;
use lofty::probe::Probe;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecType, Decoder, DecoderOptions, CODEC_TYPE_MP3, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::error::{PlaybackError, Result};
use crate::output::{frames_to_micros, ClipBuffer, PcmFormat};

fn unsupported(path: &Path, e: impl std::fmt::Display) -> PlaybackError {
    PlaybackError::UnsupportedFormat(format!("{}: {}", path.display(), e))
}

/// Probe `source` as the contents of `path`.
fn probe(path: &Path, source: Box<dyn MediaSource>) -> Result<Box<dyn FormatReader>> {
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map(|probed| probed.format)
        .map_err(|e| unsupported(path, e))
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = File::open(path)?;
    probe(path, Box::new(file))
}

/// The default track's id and a decoder for it.
fn make_decoder(path: &Path, format: &dyn FormatReader) -> Result<(u32, Box<dyn Decoder>)> {
    let track = format
        .default_track()
        .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| unsupported(path, "no audio track"))?;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| unsupported(path, e))?;
    Ok((track.id, decoder))
}

/// What to do with an error from `next_packet` or `decode`.
enum Step {
    End,
    Skip,
}

fn classify(err: SymphoniaError) -> Result<Step> {
    match err {
        SymphoniaError::IoError(ref e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(Step::End),
        SymphoniaError::ResetRequired => Ok(Step::End),
        SymphoniaError::DecodeError(msg) => {
            log::warn!("moodplay: skipping undecodable packet: {}", msg);
            Ok(Step::Skip)
        }
        other => Err(PlaybackError::Decode(other.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Source facts
// ---------------------------------------------------------------------------

/// Facts about a streamed source, read once when it is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub format: PcmFormat,
    pub codec: CodecType,
    /// None when neither the container nor the tags report a length.
    pub total_micros: Option<u64>,
    /// File length in bytes.
    pub total_bytes: u64,
}

impl SourceInfo {
    /// Whether a reader can restart decoding from an arbitrary byte offset.
    /// MPEG audio resynchronises on the next frame header; containers need
    /// their headers and cannot.
    pub fn byte_seekable(&self) -> bool {
        self.codec == CODEC_TYPE_MP3
    }

    /// Byte offset proportional to `target_micros`.
    pub fn byte_offset(&self, target_micros: u64) -> Option<u64> {
        let total = self.total_micros.filter(|&t| t > 0)?;
        let target = target_micros.min(total);
        Some((target as u128 * self.total_bytes as u128 / total as u128) as u64)
    }
}

/// Probe `path` for its PCM format, codec and length.
pub fn inspect(path: &Path) -> Result<SourceInfo> {
    let total_bytes = std::fs::metadata(path)?.len();
    let mut reader = PcmReader::open(path)?;
    let track_frames = reader
        .format
        .default_track()
        .and_then(|t| t.codec_params.n_frames);
    let codec = reader
        .format
        .default_track()
        .map(|t| t.codec_params.codec)
        .unwrap_or(CODEC_TYPE_NULL);
    let format = reader.pcm_format()?;

    let total_micros = tagged_duration_micros(path)
        .or_else(|| track_frames.map(|n| frames_to_micros(n, format.sample_rate)))
        .filter(|&t| t > 0);

    Ok(SourceInfo {
        format,
        codec,
        total_micros,
        total_bytes,
    })
}

/// Duration from lofty's audio properties. Sniffs the content rather than
/// trusting the extension.
fn tagged_duration_micros(path: &Path) -> Option<u64> {
    let tagged = Probe::open(path).ok()?.guess_file_type().ok()?.read().ok()?;
    let micros = tagged.properties().duration().as_micros() as u64;
    Some(micros).filter(|&d| d > 0)
}

// ---------------------------------------------------------------------------
// Whole-file decode
// ---------------------------------------------------------------------------

/// Decode an entire file into memory.
pub fn decode_clip(path: &Path) -> Result<ClipBuffer> {
    let mut format = open_format(path)?;
    let (track_id, mut decoder) = make_decoder(path, format.as_ref())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut layout: Option<(u32, u16)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(e) => match classify(e)? {
                Step::End => break,
                Step::Skip => continue,
            },
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => match classify(e)? {
                Step::End => break,
                Step::Skip => continue,
            },
        };

        let spec = *decoded.spec();
        layout.get_or_insert((spec.rate, spec.channels.count() as u16));
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let (sample_rate, channels) = layout.ok_or_else(|| unsupported(path, "no audio frames"))?;
    log::debug!(
        "moodplay: decoded {} ({}Hz/{}ch, {} samples)",
        path.display(),
        sample_rate,
        channels,
        samples.len()
    );
    Ok(ClipBuffer {
        samples: samples.into(),
        sample_rate,
        channels,
    })
}

// ---------------------------------------------------------------------------
// Incremental PCM
// ---------------------------------------------------------------------------

/// Incremental decoder yielding interleaved s16le PCM.
pub struct PcmReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    pcm: Option<PcmFormat>,
    /// Decoded bytes not yet handed out.
    pending: Vec<u8>,
    pending_pos: usize,
    exhausted: bool,
}

impl PcmReader {
    /// Open `path` from the start.
    pub fn open(path: &Path) -> Result<Self> {
        let format = open_format(path)?;
        Self::from_format(path, format)
    }

    /// Reopen `path` positioned near `target_micros`.
    ///
    /// MPEG audio restarts at the proportional byte offset. Other sources
    /// reopen from the start and use a coarse time seek. A seek past the end
    /// yields an exhausted reader.
    pub fn open_at(path: &Path, info: &SourceInfo, target_micros: u64) -> Result<Self> {
        if target_micros == 0 {
            return Self::open(path);
        }
        if info.byte_seekable() {
            if let Some(offset) = info.byte_offset(target_micros) {
                let mut file = File::open(path)?;
                file.seek(SeekFrom::Start(offset))?;
                match probe(path, Box::new(ReadOnlySource::new(file))) {
                    Ok(format) => {
                        log::debug!("moodplay: reopened {} at byte {}", path.display(), offset);
                        return Self::from_format(path, format);
                    }
                    Err(e) => {
                        log::warn!("moodplay: byte seek failed ({}), using time seek", e);
                    }
                }
            }
        }

        let mut reader = Self::open(path)?;
        let time = Time::new(target_micros / 1_000_000, (target_micros % 1_000_000) as f64 / 1e6);
        let seek = reader.format.seek(
            SeekMode::Coarse,
            SeekTo::Time {
                time,
                track_id: Some(reader.track_id),
            },
        );
        match seek {
            Ok(seeked) => {
                reader.decoder.reset();
                log::debug!(
                    "moodplay: time seek in {} landed at ts {}",
                    path.display(),
                    seeked.actual_ts
                );
            }
            Err(e) => {
                log::warn!("moodplay: seek in {} failed: {}", path.display(), e);
                reader.exhausted = true;
            }
        }
        Ok(reader)
    }

    fn from_format(path: &Path, format: Box<dyn FormatReader>) -> Result<Self> {
        let (track_id, decoder) = make_decoder(path, format.as_ref())?;
        let pcm = format.default_track().and_then(|t| {
            let rate = t.codec_params.sample_rate?;
            let channels = t.codec_params.channels?.count() as u16;
            Some(PcmFormat::new(rate, channels))
        });
        Ok(Self {
            format,
            decoder,
            track_id,
            pcm,
            pending: Vec::new(),
            pending_pos: 0,
            exhausted: false,
        })
    }

    /// Output format. Decodes ahead when the container leaves it unstated.
    pub fn pcm_format(&mut self) -> Result<PcmFormat> {
        if self.pcm.is_none() {
            self.fill()?;
        }
        self.pcm
            .ok_or_else(|| PlaybackError::UnsupportedFormat("stream carries no audio frames".into()))
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending_pos >= self.pending.len()
    }

    /// Fill `buf` with PCM. Returns 0 only at end of stream. Fills whole
    /// frames as long as `buf.len()` is a multiple of the frame size.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pending_pos >= self.pending.len() {
                if self.exhausted || !self.fill()? {
                    break;
                }
                continue;
            }
            let n = (buf.len() - filled).min(self.pending.len() - self.pending_pos);
            buf[filled..filled + n].copy_from_slice(&self.pending[self.pending_pos..self.pending_pos + n]);
            self.pending_pos += n;
            filled += n;
        }
        Ok(filled)
    }

    /// Decode the next packet into `pending`. False at end of stream.
    fn fill(&mut self) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(e) => match classify(e)? {
                    Step::End => {
                        self.exhausted = true;
                        return Ok(false);
                    }
                    Step::Skip => continue,
                },
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(e) => match classify(e)? {
                    Step::End => {
                        self.exhausted = true;
                        return Ok(false);
                    }
                    Step::Skip => continue,
                },
            };

            let spec = *decoded.spec();
            let layout = PcmFormat::new(spec.rate, spec.channels.count() as u16);
            match self.pcm {
                None => self.pcm = Some(layout),
                Some(pcm) if pcm != layout => {
                    return Err(PlaybackError::Decode(format!(
                        "stream format changed from {}Hz/{}ch to {}Hz/{}ch",
                        pcm.sample_rate, pcm.channels, layout.sample_rate, layout.channels
                    )));
                }
                Some(_) => {}
            }

            let mut sample_buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);
            self.pending.clear();
            self.pending_pos = 0;
            for s in sample_buf.samples() {
                self.pending.extend_from_slice(&s.to_le_bytes());
            }
            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
    }
}
