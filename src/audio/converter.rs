// aaxtract - Audible AAX to M4B/M4A converter
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Conversion driver
//!
//! Glues the subsystems together, strictly in order: parse, resolve and
//! validate the activation, derive keys, open the muxer, then pump every
//! sample through read-decrypt-write, one at a time. The pipeline is
//! single-threaded; AES on one core outruns storage for audiobook-sized
//! samples, so added concurrency would only complicate the fast-start
//! bookkeeping.
//!
//! Output is written to a `.partial` file and renamed into place on
//! success, so an aborted conversion never leaves behind something that
//! looks like a finished book. Re-running a conversion overwrites the
//! existing output.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::audio::metadata::Chapter;
use crate::audio::OutputFormat;
use crate::container::AaxInput;
use crate::crypto::activation::ActivationBytes;
use crate::crypto::drm::{derive_file_keys, validate};
use crate::crypto::sample::decrypt_sample;
use crate::error::{AaxError, ErrorKind, Result};
use crate::file::paths::{build_output_path, OutputNaming};
use crate::mux::writer::packet_from_ticks;
use crate::mux::{AudioTrackConfig, Mp4Muxer, AUDIO_TRACK_ID};

/// Progress is reported once per this many samples, plus at completion.
const PROGRESS_GRANULARITY: usize = 500;

/// Immutable per-conversion settings.
///
/// The driver reads no process-wide state; everything it needs arrives
/// here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertOptions {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    /// 8-hex activation code; conversion fails without one.
    pub activation_code: Option<String>,
    /// Put the output directly into `output_dir`.
    pub flat_folder_structure: bool,
    /// Insert a series directory between author and title when known.
    pub series_title_in_folder_structure: bool,
    /// Keep source chapter titles; otherwise they become "Chapter N".
    pub use_named_chapters: bool,
    /// Also write the cover image as a side file next to the output.
    pub extract_cover_image: bool,
    /// Also write a cue sheet next to the output.
    pub write_cue_sheet: bool,
}

impl ConvertOptions {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            output_dir: PathBuf::from("."),
            output_format: OutputFormat::M4b,
            activation_code: None,
            flat_folder_structure: false,
            series_title_in_folder_structure: false,
            use_named_chapters: true,
            extract_cover_image: false,
            write_cue_sheet: false,
        }
    }
}

/// The driver-facing conversion result shape.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
}

impl ConversionReport {
    fn from_result(result: &Result<PathBuf>) -> Self {
        match result {
            Ok(path) => Self {
                success: true,
                output_path: Some(path.clone()),
                error: None,
                error_kind: None,
            },
            Err(err) => Self {
                success: false,
                output_path: None,
                error: Some(err.to_string()),
                error_kind: Some(err.kind()),
            },
        }
    }
}

/// Convert one book and fold the outcome into a [`ConversionReport`].
pub fn run_conversion(options: ConvertOptions) -> ConversionReport {
    let converter = AaxConverter::new(options);
    let result = converter.convert_sync();
    ConversionReport::from_result(&result)
}

/// AAX conversion driver.
pub struct AaxConverter {
    options: ConvertOptions,
}

impl AaxConverter {
    pub fn new(options: ConvertOptions) -> Self {
        Self { options }
    }

    /// Run the conversion on the current thread.
    pub fn convert_sync(&self) -> Result<PathBuf> {
        self.convert_with_progress(|_| {})
    }

    /// Run the conversion, reporting completed fraction to `progress`.
    pub fn convert_with_progress<F>(&self, progress: F) -> Result<PathBuf>
    where
        F: Fn(f32),
    {
        let mut partial: Option<PathBuf> = None;
        let result = self.convert_inner(&mut partial, &progress);

        if result.is_err() {
            if let Some(partial) = partial {
                if partial.exists() {
                    match fs::remove_file(&partial) {
                        Ok(()) => info!("removed partial output {}", partial.display()),
                        Err(e) => {
                            warn!("could not remove partial output {}: {}", partial.display(), e)
                        }
                    }
                }
            }
        }
        result
    }

    /// Run the conversion on the blocking pool, for async hosts.
    pub async fn convert(&self) -> Result<PathBuf> {
        let options = self.options.clone();
        tokio::task::spawn_blocking(move || AaxConverter::new(options).convert_sync())
            .await
            .map_err(|e| {
                AaxError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?
    }

    fn convert_inner<F>(&self, partial_out: &mut Option<PathBuf>, progress: &F) -> Result<PathBuf>
    where
        F: Fn(f32),
    {
        let format = self.options.output_format;
        if !format.is_mp4_family() {
            return Err(AaxError::UnsupportedOutputFormat(format.name().to_string()));
        }

        let input_path = &self.options.input_path;
        if !input_path.is_file() {
            return Err(AaxError::FileNotFound(input_path.display().to_string()));
        }

        let mut input = AaxInput::open(input_path)?;

        let code = self
            .options
            .activation_code
            .as_deref()
            .ok_or(AaxError::MissingActivation)?;
        let adrm = input.require_adrm()?.to_vec();
        let activation = resolve_activation(&adrm, code)?;
        let keys = derive_file_keys(&adrm, &activation)?;

        let title = input
            .metadata
            .title
            .clone()
            .unwrap_or_else(|| fallback_title(input_path));
        let output_path = build_output_path(
            &self.options.output_dir,
            &OutputNaming {
                author: input.metadata.author.as_deref(),
                series: None,
                title: &title,
            },
            format.extension(),
            self.options.flat_folder_structure,
            self.options.series_title_in_folder_structure,
        );
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let partial_path = partial_path_for(&output_path);
        *partial_out = Some(partial_path.clone());

        let audio = input.audio_track();
        let track_config = AudioTrackConfig {
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            timescale: audio.timescale,
            codec_config: audio.codec_config.clone(),
        };
        let timescale = audio.timescale;
        let sample_count = audio.samples.len();

        let mut muxer = Mp4Muxer::new(
            BufWriter::new(fs::File::create(&partial_path)?),
            format,
            track_config,
        )?;
        muxer.set_metadata(input.metadata.clone());
        let chapters = output_chapters(&input.chapters, self.options.use_named_chapters);
        muxer.set_chapters(chapters.clone());

        info!(
            "converting {} -> {} ({} samples)",
            input_path.display(),
            output_path.display(),
            sample_count
        );

        let mut cumulative_ticks = 0u64;
        for i in 0..sample_count {
            let entry = input.audio_track().samples[i];
            let ciphertext = input.read_sample(&entry)?;
            let plaintext = decrypt_sample(&ciphertext, &keys);
            let packet = packet_from_ticks(
                &plaintext,
                cumulative_ticks,
                entry.duration,
                timescale,
                entry.keyframe,
            );
            muxer.write_packet(AUDIO_TRACK_ID, &packet)?;
            cumulative_ticks += entry.duration as u64;

            if i % PROGRESS_GRANULARITY == 0 {
                progress(i as f32 / sample_count.max(1) as f32);
            }
        }

        // The source handle is released before the muxer finalizes.
        let metadata = input.metadata.clone();
        drop(input);

        muxer.finalize()?;
        fs::rename(&partial_path, &output_path)?;
        *partial_out = None;
        progress(1.0);

        self.write_side_files(&output_path, &metadata, &chapters);

        info!("conversion finished: {}", output_path.display());
        Ok(output_path)
    }

    /// Best-effort side files; failures are logged, never fatal.
    fn write_side_files(
        &self,
        output_path: &Path,
        metadata: &crate::audio::BookMetadata,
        chapters: &[Chapter],
    ) {
        if self.options.extract_cover_image {
            match &metadata.cover {
                Some(cover) => {
                    let cover_path = output_path
                        .parent()
                        .unwrap_or_else(|| Path::new("."))
                        .join(format!("cover.{}", cover.extension()));
                    if let Err(e) = fs::write(&cover_path, cover.data()) {
                        warn!("could not write {}: {}", cover_path.display(), e);
                    }
                }
                None => warn!("no cover image in source; skipping cover extraction"),
            }
        }

        if self.options.write_cue_sheet && !chapters.is_empty() {
            if let Err(e) = crate::file::cue::write_cue_sheet(
                output_path,
                metadata.title.as_deref(),
                metadata.author.as_deref(),
                chapters,
            ) {
                warn!("could not write cue sheet: {}", e);
            }
        }
    }
}

/// Validate the activation against the file, retrying once with the
/// lowercased textual form re-decoded. No other mutations are attempted.
fn resolve_activation(adrm: &[u8], code: &str) -> Result<ActivationBytes> {
    let first = ActivationBytes::from_hex(code)?;
    if validate(adrm, &first) {
        return Ok(first);
    }
    let lowered = code.trim().to_lowercase();
    let second = ActivationBytes::from_hex(&lowered)?;
    if validate(adrm, &second) {
        return Ok(second);
    }
    Err(AaxError::ActivationMismatch)
}

/// Rename chapters to "Chapter N" unless named chapters were requested.
fn output_chapters(chapters: &[Chapter], use_named: bool) -> Vec<Chapter> {
    chapters
        .iter()
        .enumerate()
        .map(|(i, chapter)| Chapter {
            title: if use_named {
                chapter.title.clone()
            } else {
                format!("Chapter {}", i + 1)
            },
            start_seconds: chapter.start_seconds,
            end_seconds: chapter.end_seconds,
        })
        .collect()
}

/// The input's base name, used when the book carries no title tag.
fn fallback_title(input_path: &Path) -> String {
    input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audiobook".to_string())
}

/// `<output>.partial`, the staging name while the muxer is writing.
fn partial_path_for(output_path: &Path) -> PathBuf {
    let mut name = output_path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp3_rejected_before_touching_input() {
        let mut options = ConvertOptions::new("/nonexistent/book.aax");
        options.output_format = OutputFormat::Mp3;
        let err = AaxConverter::new(options).convert_sync().unwrap_err();
        assert!(matches!(err, AaxError::UnsupportedOutputFormat(_)));
    }

    #[test]
    fn test_missing_input_reported() {
        let mut options = ConvertOptions::new("/nonexistent/book.aax");
        options.activation_code = Some("1CEB00DA".into());
        let err = AaxConverter::new(options).convert_sync().unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_report_folds_error() {
        let report = run_conversion(ConvertOptions::new("/nonexistent/book.aax"));
        assert!(!report.success);
        assert!(report.output_path.is_none());
        assert_eq!(report.error_kind, Some(ErrorKind::FileNotFound));
    }

    #[test]
    fn test_numbered_chapters() {
        let chapters = vec![
            Chapter {
                title: "Prologue".into(),
                start_seconds: 0.0,
                end_seconds: 5.0,
            },
            Chapter {
                title: "The Plot".into(),
                start_seconds: 5.0,
                end_seconds: 9.0,
            },
        ];
        let named = output_chapters(&chapters, true);
        assert_eq!(named[0].title, "Prologue");
        let numbered = output_chapters(&chapters, false);
        assert_eq!(numbered[0].title, "Chapter 1");
        assert_eq!(numbered[1].title, "Chapter 2");
        assert_eq!(numbered[1].start_seconds, 5.0);
    }

    #[test]
    fn test_fallback_title_from_stem() {
        assert_eq!(fallback_title(Path::new("/books/My Book.aax")), "My Book");
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path_for(Path::new("/out/book.m4b")),
            PathBuf::from("/out/book.m4b.partial")
        );
    }

    #[test]
    fn test_invalid_activation_format_surfaces() {
        let adrm = vec![0u8; 88];
        let err = resolve_activation(&adrm, "xyz").unwrap_err();
        assert!(matches!(err, AaxError::InvalidActivationFormat(_)));
    }

    #[test]
    fn test_mismatch_after_retry() {
        let adrm = vec![0u8; 88];
        let err = resolve_activation(&adrm, "1CEB00DA").unwrap_err();
        assert!(matches!(err, AaxError::ActivationMismatch));
    }
}
