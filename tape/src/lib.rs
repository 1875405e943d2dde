pub mod loaders;

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// An 18-bit tape word, right-justified in a host word
pub type TapeWord = u32;

/// Mask for the 18 significant bits of a `TapeWord`
pub const WORD_MASK: TapeWord = 0o777777;

/// Words in the header and in the trailer of every block frame
pub const HT_WORDS: u32 = 5;

/// Frame slot of the forward block number (header)
pub const BLOCK_NUM_WORD: u32 = 1;

/// Frame slot of the reverse checksum (header)
/// The forward checksum and reverse block number sit at the mirror slots
/// in the trailer.
pub const CHECKSUM_WORD: u32 = 4;

/// Length of the unrecorded end zone at either reel end, in tape lines
/// (10 ft at 300 lines/inch)
pub const END_ZONE_LINES: u32 = 36_000;

/// Types of emulated DECtape media
#[derive(Copy, Clone, EnumIter, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TapeFormat {
    /// Native 18-bit words, stored on disk as 32-bit little-endian
    Native18,
    /// 16-bit little-endian on disk, zero-extended to 18 bits in memory
    Packed16,
    /// 12-bit words in 16-bit little-endian on disk, 2-of-3 packed into
    /// 18-bit words in memory
    Packed12,
}

impl TapeFormat {
    /// Gets the amount of 18-bit data words per block, as stored in memory
    pub fn block_words(self) -> u32 {
        match self {
            Self::Native18 | Self::Packed16 => 256,
            Self::Packed12 => 86,
        }
    }

    /// Gets the amount of blocks on a reel
    pub fn tape_blocks(self) -> u32 {
        match self {
            Self::Native18 | Self::Packed16 => 578,
            Self::Packed12 => 1474,
        }
    }

    /// Gets the amount of tape lines (3-bit cells) occupied by one word
    pub fn word_lines(self) -> u32 {
        match self {
            Self::Native18 | Self::Packed16 => 6,
            Self::Packed12 => 4,
        }
    }

    /// Gets the amount of word slots in a block frame, header and trailer
    /// included
    pub fn frame_words(self) -> u32 {
        2 * HT_WORDS + self.block_words()
    }

    /// Gets the length of one block frame in tape lines
    pub fn lines_per_block(self) -> u32 {
        self.frame_words() * self.word_lines()
    }

    /// Gets the line at which the forward end zone starts
    pub fn fwd_end_zone_line(self) -> u32 {
        END_ZONE_LINES + self.tape_blocks() * self.lines_per_block()
    }

    /// Gets the physical end of the tape: the far edge of the forward
    /// end zone. A drive integrated past this line has run off the reel.
    pub fn total_lines(self) -> u32 {
        self.fwd_end_zone_line() + END_ZONE_LINES
    }

    /// Gets the logical capacity of a reel in 18-bit words
    pub fn capacity_words(self) -> usize {
        self.tape_blocks() as usize * self.block_words() as usize
    }

    /// Gets the amount of on-disk words per block (the 12b format stores
    /// three 12-bit words for every two native words)
    pub fn disk_block_words(self) -> usize {
        match self {
            Self::Native18 | Self::Packed16 => 256,
            Self::Packed12 => 129,
        }
    }

    /// Gets the exact on-disk size of a full image, used as the autosize
    /// signature
    pub fn file_size(self) -> usize {
        match self {
            Self::Native18 => self.capacity_words() * 4,
            Self::Packed16 => self.capacity_words() * 2,
            Self::Packed12 => self.tape_blocks() as usize * self.disk_block_words() * 2,
        }
    }
}

impl std::fmt::Display for TapeFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Native18 => "18b/36b native",
                Self::Packed16 => "16b packed",
                Self::Packed12 => "12b packed",
            }
        )
    }
}

/// Complement-obverse of an 18-bit word: every bit inverted and the six
/// 3-bit lines reversed in order. This is what a drive reads when it passes
/// a forward-written word while moving in reverse. Involutive.
pub fn complement_obverse(w: TapeWord) -> TapeWord {
    let t = w ^ WORD_MASK;
    ((t >> 15) & 0o7)
        | ((t >> 9) & 0o70)
        | ((t >> 3) & 0o700)
        | ((t & 0o700) << 3)
        | ((t & 0o70) << 9)
        | ((t & 0o7) << 15)
}

/// 18-bit 1's-complement checksum over a block's data words: accumulator
/// seeded with all-ones, end-around carry on every add, final result
/// inverted
pub fn block_checksum(words: &[TapeWord]) -> TapeWord {
    let mut csum: TapeWord = WORD_MASK;
    for &w in words {
        csum += w & WORD_MASK;
        if csum > WORD_MASK {
            csum = (csum + 1) & WORD_MASK;
        }
    }
    csum ^ WORD_MASK
}

/// An in-memory loaded tape image
///
/// Always 18-bit words regardless of the on-disk format; the loaders
/// transcode at attach/detach time.
#[derive(Clone, Serialize, Deserialize)]
pub struct TapeImage {
    format: TapeFormat,
    words: Vec<TapeWord>,

    /// Some way to represent what is on this reel (e.g. the filename)
    title: String,

    /// One past the highest word address ever written
    hwmark: usize,

    /// Reel is write-protected
    write_protect: bool,
}

impl TapeImage {
    /// Creates a new, zeroed image for the specified format
    pub fn blank(format: TapeFormat, title: &str) -> Self {
        Self {
            format,
            words: vec![0; format.capacity_words()],
            title: title.to_owned(),
            hwmark: 0,
            write_protect: false,
        }
    }

    /// Creates an image from transcoded words, zero-filling up to capacity.
    /// Word count in excess of capacity is a loader bug.
    pub(crate) fn from_words(format: TapeFormat, mut words: Vec<TapeWord>, title: &str) -> Self {
        assert!(words.len() <= format.capacity_words());
        words.resize(format.capacity_words(), 0);
        Self {
            format,
            words,
            title: title.to_owned(),
            hwmark: 0,
            write_protect: false,
        }
    }

    pub fn format(&self) -> TapeFormat {
        self.format
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Reads the 18-bit word at a logical word address
    /// (`block * block_words + word_in_block`)
    pub fn read_word(&self, addr: usize) -> TapeWord {
        self.words[addr]
    }

    /// Writes the 18-bit word at a logical word address and advances the
    /// high-water mark
    pub fn write_word(&mut self, addr: usize, w: TapeWord) {
        self.words[addr] = w & WORD_MASK;
        if addr + 1 > self.hwmark {
            self.hwmark = addr + 1;
        }
    }

    /// Generates the word read at a header/trailer frame slot of a block.
    /// Only four slots carry a value; the tape image itself stores no
    /// header or trailer words.
    pub fn header_word(&self, block: u32, frame_word: u32) -> TapeWord {
        let last = self.format.frame_words() - 1;
        if frame_word == BLOCK_NUM_WORD {
            return block & WORD_MASK;
        }
        if frame_word == CHECKSUM_WORD {
            // Unwritten reverse checksum sentinel, to be replaced by software
            return WORD_MASK;
        }
        if frame_word == last - CHECKSUM_WORD {
            return block_checksum(self.block_data(block));
        }
        if frame_word == last - BLOCK_NUM_WORD {
            return complement_obverse(block & WORD_MASK);
        }
        0
    }

    /// Gets the data words of one block
    pub fn block_data(&self, block: u32) -> &[TapeWord] {
        let bs = self.format.block_words() as usize;
        let base = block as usize * bs;
        &self.words[base..base + bs]
    }

    /// Check if the image was written to since attach
    pub fn is_dirty(&self) -> bool {
        self.hwmark > 0
    }

    /// One past the highest word address ever written
    pub fn hwmark(&self) -> usize {
        self.hwmark
    }

    pub fn write_protect(&self) -> bool {
        self.write_protect
    }

    pub fn set_write_protect(&mut self, wp: bool) {
        self.write_protect = wp;
    }

    pub(crate) fn words(&self) -> &[TapeWord] {
        &self.words
    }
}
