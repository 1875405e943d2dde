mod auto;
mod native18;
mod packed12;
mod packed16;

use std::path::Path;

pub use auto::Autodetect;
pub use auto::FormatHint;
pub use native18::Native18;
pub use packed12::Packed12;
pub use packed16::Packed16;

use crate::TapeImage;

use anyhow::Result;

/// A loader to read a specific on-disk format and transcode it into a
/// usable TapeImage
pub trait TapeImageLoader {
    fn load(data: &[u8], filename: Option<&str>) -> Result<TapeImage>;

    fn load_file(filename: &str) -> Result<TapeImage> {
        Self::load(
            &std::fs::read(filename)?,
            Path::new(filename).file_name().and_then(|s| s.to_str()),
        )
    }
}

/// A saver to write a TapeImage back through the inverse transcoder
pub trait TapeImageSaver {
    fn write(img: &TapeImage, w: &mut impl std::io::Write) -> Result<()>;

    fn save_vec(img: &TapeImage) -> Result<Vec<u8>> {
        let mut v = vec![];
        Self::write(img, &mut v)?;
        Ok(v)
    }

    fn save_file(img: &TapeImage, filename: &str) -> Result<()> {
        let mut f = std::fs::File::create(filename)?;
        Self::write(img, &mut f)?;
        Ok(())
    }
}
