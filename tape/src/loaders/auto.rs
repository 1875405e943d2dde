//! Auto-detect image file format and load

use super::{Native18, Packed12, Packed16, TapeImageLoader, TapeImageSaver};
use crate::{TapeFormat, TapeImage};

use anyhow::Result;
use log::*;
use strum::IntoEnumIterator;

/// Attach-time format selection, from the attach switches:
/// R forces 12b, S forces 16b, T suppresses autosizing
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FormatHint {
    /// Detect by file-size signature, defaulting to native 18b
    #[default]
    Autosize,
    /// Treat as native 18b regardless of file size
    NoAutosize,
    /// Force a specific format
    Force(TapeFormat),
}

pub struct Autodetect {}

impl Autodetect {
    /// Detects the format from the exact file-size signatures; everything
    /// else is treated as native 18b
    pub fn detect(data: &[u8]) -> TapeFormat {
        TapeFormat::iter()
            .find(|t| *t != TapeFormat::Native18 && t.file_size() == data.len())
            .unwrap_or(TapeFormat::Native18)
    }

    /// Detach-time write-back: saves the image through the inverse of its
    /// load-time transcoder iff it was written to and is writable.
    /// Returns whether anything was saved.
    pub fn flush_file(img: &TapeImage, filename: &str) -> Result<bool> {
        if !img.is_dirty() || img.write_protect() {
            return Ok(false);
        }
        info!("Writing back '{}' ({})", img.title(), img.format());
        Self::save_file(img, filename)?;
        Ok(true)
    }

    pub fn load_with_hint(
        data: &[u8],
        filename: Option<&str>,
        hint: FormatHint,
    ) -> Result<TapeImage> {
        let format = match hint {
            FormatHint::Autosize => Self::detect(data),
            FormatHint::NoAutosize => TapeFormat::Native18,
            FormatHint::Force(f) => f,
        };
        debug!(
            "Attaching '{}' as {} ({} bytes)",
            filename.unwrap_or_default(),
            format,
            data.len()
        );
        match format {
            TapeFormat::Native18 => Native18::load(data, filename),
            TapeFormat::Packed16 => Packed16::load(data, filename),
            TapeFormat::Packed12 => Packed12::load(data, filename),
        }
    }
}

impl TapeImageLoader for Autodetect {
    fn load(data: &[u8], filename: Option<&str>) -> Result<TapeImage> {
        Self::load_with_hint(data, filename, FormatHint::Autosize)
    }
}

impl TapeImageSaver for Autodetect {
    /// Writes an image back through the inverse of its load-time transcoder
    fn write(img: &TapeImage, w: &mut impl std::io::Write) -> Result<()> {
        match img.format() {
            TapeFormat::Native18 => Native18::write(img, w),
            TapeFormat::Packed16 => Packed16::write(img, w),
            TapeFormat::Packed12 => Packed12::write(img, w),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_signature() {
        assert_eq!(
            Autodetect::detect(&vec![0u8; TapeFormat::Packed16.file_size()]),
            TapeFormat::Packed16
        );
        assert_eq!(
            Autodetect::detect(&vec![0u8; TapeFormat::Packed12.file_size()]),
            TapeFormat::Packed12
        );
        assert_eq!(Autodetect::detect(&[0u8; 1024]), TapeFormat::Native18);
        assert_eq!(Autodetect::detect(&[]), TapeFormat::Native18);
    }

    #[test]
    fn flush_only_when_dirty_and_writable() {
        let path = std::env::temp_dir().join("reel_tape_flush_test.tap");
        let path = path.to_str().unwrap();

        let mut img = TapeImage::blank(TapeFormat::Native18, "flush");
        assert!(!Autodetect::flush_file(&img, path).unwrap());

        img.write_word(42, 0o123456);
        img.set_write_protect(true);
        assert!(!Autodetect::flush_file(&img, path).unwrap());

        img.set_write_protect(false);
        assert!(Autodetect::flush_file(&img, path).unwrap());
        let back = Autodetect::load_file(path).unwrap();
        assert_eq!(back.read_word(42), 0o123456);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn hint_overrides_signature() {
        let data = vec![0u8; TapeFormat::Packed16.file_size()];
        let img = Autodetect::load_with_hint(&data, None, FormatHint::NoAutosize).unwrap();
        assert_eq!(img.format(), TapeFormat::Native18);

        let img = Autodetect::load_with_hint(&[0u8; 6], None, FormatHint::Force(TapeFormat::Packed12))
            .unwrap();
        assert_eq!(img.format(), TapeFormat::Packed12);
    }
}
