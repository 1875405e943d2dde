//! Native 18b/36b image format
//!
//! One 18-bit word per 32-bit little-endian on-disk word, upper bits unused.

use super::{TapeImageLoader, TapeImageSaver};
use crate::{TapeFormat, TapeImage, TapeWord, WORD_MASK};

use anyhow::{bail, Result};

/// Native 18b/36b image loader
pub struct Native18 {}

impl TapeImageLoader for Native18 {
    fn load(data: &[u8], filename: Option<&str>) -> Result<TapeImage> {
        if data.len() % 4 != 0 {
            bail!("18b image length {} not a multiple of 4", data.len());
        }
        let words: Vec<TapeWord> = data
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()) & WORD_MASK)
            .collect();
        if words.len() > TapeFormat::Native18.capacity_words() {
            bail!("18b image exceeds tape capacity: {} words", words.len());
        }

        Ok(TapeImage::from_words(
            TapeFormat::Native18,
            words,
            filename.unwrap_or_default(),
        ))
    }
}

impl TapeImageSaver for Native18 {
    fn write(img: &TapeImage, w: &mut impl std::io::Write) -> Result<()> {
        for &word in img.words() {
            w.write_all(&word.to_le_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_full() {
        let cap = TapeFormat::Native18.capacity_words();
        let mut data = Vec::with_capacity(cap * 4);
        for i in 0..cap {
            data.extend_from_slice(&((i as u32) & WORD_MASK).to_le_bytes());
        }

        let img = Native18::load(&data, Some("rt.tap")).unwrap();
        assert_eq!(img.read_word(100), 100);
        assert_eq!(img.read_word(cap - 1), ((cap - 1) as u32) & WORD_MASK);
        assert_eq!(Native18::save_vec(&img).unwrap(), data);
    }

    #[test]
    fn short_file_zero_fills() {
        let data = [0x34, 0x12, 0x00, 0x00, 0xff, 0xff, 0x03, 0x00];
        let img = Native18::load(&data, None).unwrap();
        assert_eq!(img.read_word(0), 0x1234);
        assert_eq!(img.read_word(1), 0o777777);
        assert_eq!(img.read_word(2), 0);
    }

    #[test]
    fn rejects_ragged_length() {
        assert!(Native18::load(&[0u8; 5], None).is_err());
    }
}
