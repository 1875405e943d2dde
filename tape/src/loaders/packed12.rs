//! 12b image format
//!
//! Each on-disk word is 12 bits in a 16-bit little-endian cell. Three
//! consecutive 12-bit words A, B, C pack into two 18-bit tape words as
//! `(A<<6 | B>>6, (B & 077)<<12 | C)`; a detach applies the inverse.

use super::{TapeImageLoader, TapeImageSaver};
use crate::{TapeFormat, TapeImage, TapeWord};

use anyhow::{bail, Result};
use itertools::Itertools;

/// 12b packed image loader
pub struct Packed12 {}

impl TapeImageLoader for Packed12 {
    fn load(data: &[u8], filename: Option<&str>) -> Result<TapeImage> {
        if data.len() % 2 != 0 {
            bail!("12b image length {} not a multiple of 2", data.len());
        }
        let mut disk: Vec<TapeWord> = data
            .chunks_exact(2)
            .map(|c| u32::from(u16::from_le_bytes(c.try_into().unwrap())) & 0o7777)
            .collect();
        // 2-of-3 packing operates on whole triplets
        disk.resize(disk.len().div_ceil(3) * 3, 0);

        let words: Vec<TapeWord> = disk
            .into_iter()
            .tuples()
            .flat_map(|(a, b, c)| [(a << 6) | (b >> 6), ((b & 0o77) << 12) | c])
            .collect();
        if words.len() > TapeFormat::Packed12.capacity_words() {
            bail!("12b image exceeds tape capacity: {} words", words.len());
        }

        Ok(TapeImage::from_words(
            TapeFormat::Packed12,
            words,
            filename.unwrap_or_default(),
        ))
    }
}

impl TapeImageSaver for Packed12 {
    fn write(img: &TapeImage, w: &mut impl std::io::Write) -> Result<()> {
        for (x, y) in img.words().iter().tuples() {
            for disk in [x >> 6, ((x & 0o77) << 6) | ((y >> 12) & 0o77), y & 0o7777] {
                w.write_all(&(disk as u16).to_le_bytes())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing() {
        // 0o1234 0o5670 0o4321 -> 0o123456, 0o704321
        let data = [0x9cu8, 0x02, 0xb8, 0x0b, 0xd1, 0x08];
        let img = Packed12::load(&data, None).unwrap();
        assert_eq!(img.read_word(0), 0o123456);
        assert_eq!(img.read_word(1), 0o704321);
    }

    #[test]
    fn roundtrip_full() {
        let cap_disk = TapeFormat::Packed12.file_size() / 2;
        let mut data = Vec::with_capacity(cap_disk * 2);
        for i in 0..cap_disk {
            data.extend_from_slice(&((i & 0o7777) as u16).to_le_bytes());
        }

        let img = Packed12::load(&data, None).unwrap();
        assert_eq!(Packed12::save_vec(&img).unwrap(), data);
    }
}
