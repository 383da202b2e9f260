//! Rendering parsed subtitle content into caption and text formats.
//! A single converter dispatches over a closed set of render targets;
//! adding a format means one variant and one match arm.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::subtitle::SubtitleContent;

/// The supported render targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Format {
    Txt,
    Srt,
    Vtt,
    Lrc,
}

impl Format {
    /// The tag and file extension of the format.
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Txt => "txt",
            Format::Srt => "srt",
            Format::Vtt => "vtt",
            Format::Lrc => "lrc",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "txt" => Ok(Format::Txt),
            "srt" => Ok(Format::Srt),
            "vtt" => Ok(Format::Vtt),
            "lrc" => Ok(Format::Lrc),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Render `content` in the requested format.
/// Pure: identical content always yields byte-identical output.
pub fn render(content: &SubtitleContent, format: Format) -> String {
    match format {
        Format::Txt => render_txt(content),
        Format::Srt => render_srt(content),
        Format::Vtt => render_vtt(content),
        Format::Lrc => render_lrc(content),
    }
}

/// Plain text: segment texts joined by newline, timestamps dropped.
fn render_txt(content: &SubtitleContent) -> String {
    let mut out = String::new();
    for segment in &content.segments {
        out.push_str(&segment.text);
        out.push('\n');
    }
    out
}

/// SRT: numeric index, comma-millisecond timing, blank line separators.
fn render_srt(content: &SubtitleContent) -> String {
    let mut out = String::new();
    for (i, segment) in content.segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            srt_time(segment.start_ms),
            srt_time(segment.end_ms),
            segment.text
        ));
    }
    out
}

/// WebVTT: header, dot-millisecond timing, no numeric index.
fn render_vtt(content: &SubtitleContent) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for segment in &content.segments {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            vtt_time(segment.start_ms),
            vtt_time(segment.end_ms),
            segment.text
        ));
    }
    out
}

/// LRC: one `[mm:ss.xx]` line per segment start; end times have no
/// representation in the format and are discarded.
fn render_lrc(content: &SubtitleContent) -> String {
    let mut out = String::new();
    for segment in &content.segments {
        out.push_str(&format!("[{}]{}\n", lrc_time(segment.start_ms), segment.text));
    }
    out
}

/// Format milliseconds as `HH:MM:SS,mmm`.
fn srt_time(ms: u64) -> String {
    let h = ms / 3_600_000;
    let m = (ms % 3_600_000) / 60_000;
    let s = (ms % 60_000) / 1000;
    let ms = ms % 1000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Format milliseconds as `HH:MM:SS.mmm`.
fn vtt_time(ms: u64) -> String {
    srt_time(ms).replace(',', ".")
}

/// Format milliseconds as `mm:ss.xx`, centisecond precision.
fn lrc_time(ms: u64) -> String {
    let m = ms / 60_000;
    let s = (ms % 60_000) / 1000;
    let cs = (ms % 1000) / 10;
    format!("{m:02}:{s:02}.{cs:02}")
}
