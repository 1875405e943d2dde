//! 16b image format
//!
//! One on-disk 16-bit little-endian word per tape word, zero-extended to
//! 18 bits in memory. The upper two bits of a written tape word do not
//! survive a detach in this format.

use super::{TapeImageLoader, TapeImageSaver};
use crate::{TapeFormat, TapeImage, TapeWord};

use anyhow::{bail, Result};

/// 16b packed image loader
pub struct Packed16 {}

impl TapeImageLoader for Packed16 {
    fn load(data: &[u8], filename: Option<&str>) -> Result<TapeImage> {
        if data.len() % 2 != 0 {
            bail!("16b image length {} not a multiple of 2", data.len());
        }
        let words: Vec<TapeWord> = data
            .chunks_exact(2)
            .map(|c| u32::from(u16::from_le_bytes(c.try_into().unwrap())))
            .collect();
        if words.len() > TapeFormat::Packed16.capacity_words() {
            bail!("16b image exceeds tape capacity: {} words", words.len());
        }

        Ok(TapeImage::from_words(
            TapeFormat::Packed16,
            words,
            filename.unwrap_or_default(),
        ))
    }
}

impl TapeImageSaver for Packed16 {
    fn write(img: &TapeImage, w: &mut impl std::io::Write) -> Result<()> {
        for &word in img.words() {
            w.write_all(&((word & 0xFFFF) as u16).to_le_bytes())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_full() {
        let cap = TapeFormat::Packed16.capacity_words();
        let mut data = Vec::with_capacity(cap * 2);
        for i in 0..cap {
            data.extend_from_slice(&((i & 0xFFFF) as u16).to_le_bytes());
        }
        assert_eq!(data.len(), TapeFormat::Packed16.file_size());

        let img = Packed16::load(&data, None).unwrap();
        assert_eq!(img.read_word(0x1234), 0x1234);
        assert_eq!(Packed16::save_vec(&img).unwrap(), data);
    }

    #[test]
    fn zero_extends() {
        let img = Packed16::load(&[0xff, 0xff], None).unwrap();
        assert_eq!(img.read_word(0), 0o177777);
    }
}
