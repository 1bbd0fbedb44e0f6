//! VP8 boolean arithmetic decoder.
//!
//! Every compressed partition of a VP8 frame is a stream of booleans coded
//! against 8-bit probabilities. The decoder keeps a 64-bit window of upcoming
//! bits with the active byte in the top 8 bits, so a single comparison against
//! the split point decides each symbol.
//!
//! Running past the end of the buffer never fails: zero bytes are shifted in
//! and [`BoolDecoder::is_corrupt`] reports the overrun once the caller is done.

/// Bits held in the value window.
const VALUE_BITS: i32 = 64;

/// Boolean arithmetic decoder for VP8.
#[derive(Debug, Clone)]
pub struct BoolDecoder<'a> {
    /// Input data buffer.
    data: &'a [u8],
    /// Next byte to load.
    pos: usize,
    /// Window of upcoming bits, MSB aligned.
    value: u64,
    /// Bits loaded into the window beyond the active byte.
    count: i32,
    /// Current range, 128..=255 between symbols.
    range: u32,
    /// Total normalization shifts performed.
    consumed: usize,
}

impl<'a> BoolDecoder<'a> {
    /// Create a decoder over one partition.
    pub fn new(data: &'a [u8]) -> Self {
        let mut decoder = Self {
            data,
            pos: 0,
            value: 0,
            count: -8,
            range: 255,
            consumed: 0,
        };
        decoder.fill();
        decoder
    }

    /// Load whole bytes into the window until it is full.
    fn fill(&mut self) {
        let mut shift = VALUE_BITS - 8 - (self.count + 8);
        while shift >= 0 {
            let byte = match self.data.get(self.pos) {
                Some(&b) => {
                    self.pos += 1;
                    b
                }
                None => 0,
            };
            self.value |= (byte as u64) << shift;
            self.count += 8;
            shift -= 8;
        }
    }

    /// Read a single boolean whose probability of being `false` is `prob / 256`.
    #[inline]
    pub fn read_bool(&mut self, prob: u8) -> bool {
        let split = 1 + (((self.range - 1) * prob as u32) >> 8);
        if self.count < 0 {
            self.fill();
        }

        let big_split = (split as u64) << (VALUE_BITS - 8);
        let bit = if self.value >= big_split {
            self.range -= split;
            self.value -= big_split;
            true
        } else {
            self.range = split;
            false
        };

        let shift = (self.range as u8).leading_zeros();
        self.range <<= shift;
        self.value <<= shift;
        self.count -= shift as i32;
        self.consumed += shift as usize;

        bit
    }

    /// Read a single bit at even probability.
    #[inline]
    pub fn read_flag(&mut self) -> bool {
        self.read_bool(128)
    }

    /// Read an `n`-bit unsigned literal, MSB first.
    pub fn read_literal(&mut self, n: u8) -> u32 {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.read_flag() as u32;
        }
        value
    }

    /// Read an `n`-bit magnitude followed by a sign bit.
    pub fn read_signed(&mut self, n: u8) -> i32 {
        let magnitude = self.read_literal(n) as i32;
        if self.read_flag() {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Read a presence flag and, if set, a signed value; absent values are 0.
    pub fn read_optional_signed(&mut self, n: u8) -> i32 {
        if self.read_flag() {
            self.read_signed(n)
        } else {
            0
        }
    }

    /// Current range.
    pub fn range(&self) -> u32 {
        self.range
    }

    /// Number of bits shifted out of the window so far.
    pub fn bits_consumed(&self) -> usize {
        self.consumed
    }

    /// True once more bits were consumed than the buffer holds.
    ///
    /// The final byte of a partition only ever serves as look-ahead, so
    /// reading into it counts as an overrun.
    pub fn is_corrupt(&self) -> bool {
        let available = self.data.len() * 8;
        available < 8 || self.consumed > available - 8
    }
}

/// Boolean arithmetic encoder producing streams [`BoolDecoder`] reads back.
///
/// Used to build synthetic frames for tests and tooling.
#[derive(Debug, Clone)]
pub struct BoolEncoder {
    /// Output buffer.
    output: Vec<u8>,
    /// Low end of the current interval.
    low: u64,
    /// Current range.
    range: u32,
    /// Bits pending before the next byte can be emitted.
    count: i32,
}

impl BoolEncoder {
    /// Create a new boolean encoder.
    pub fn new() -> Self {
        Self {
            output: Vec::new(),
            low: 0,
            range: 255,
            count: -24,
        }
    }

    /// Write a boolean whose probability of being `false` is `prob / 256`.
    pub fn write_bool(&mut self, bit: bool, prob: u8) {
        let split = 1 + (((self.range - 1) * prob as u32) >> 8);
        if bit {
            self.low += split as u64;
            self.range -= split;
        } else {
            self.range = split;
        }

        let mut shift = (self.range as u8).leading_zeros() as i32;
        self.range <<= shift;
        self.count += shift;

        if self.count >= 0 {
            let offset = shift - self.count;
            if (self.low << (offset - 1)) & 0x8000_0000 != 0 {
                self.propagate_carry();
            }
            self.output.push(((self.low >> (24 - offset)) & 0xff) as u8);
            self.low = (self.low << offset) & 0x00ff_ffff;
            shift = self.count;
            self.count -= 8;
        }

        self.low <<= shift;
    }

    fn propagate_carry(&mut self) {
        for byte in self.output.iter_mut().rev() {
            if *byte == 0xff {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    /// Write a bit at even probability.
    pub fn write_flag(&mut self, bit: bool) {
        self.write_bool(bit, 128);
    }

    /// Write the low `n` bits of `value`, MSB first.
    pub fn write_literal(&mut self, value: u32, n: u8) {
        for i in (0..n).rev() {
            self.write_flag((value >> i) & 1 != 0);
        }
    }

    /// Write an `n`-bit magnitude followed by a sign bit.
    pub fn write_signed(&mut self, value: i32, n: u8) {
        self.write_literal(value.unsigned_abs(), n);
        self.write_flag(value < 0);
    }

    /// Write a presence flag and, for non-zero values, a signed value.
    pub fn write_optional_signed(&mut self, value: i32, n: u8) {
        self.write_flag(value != 0);
        if value != 0 {
            self.write_signed(value, n);
        }
    }

    /// Flush pending state and return the coded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..32 {
            self.write_flag(false);
        }
        self.output
    }
}

impl Default for BoolEncoder {
    fn default() -> Self {
        Self::new()
    }
}
