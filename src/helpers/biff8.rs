//! Record reader for BIFF8, the stream format inside `.xls` workbooks.
//!
//! A record is a 2-byte type, a 2-byte length and its body. Bodies longer
//! than 8224 bytes spill into `CONTINUE` records, which [`Biff8Reader::next`]
//! merges into one logical record made of several chunks.

use crate::error::ParseError;
use crate::helpers::bytes::to_u16;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use std::ops::Range;

pub(crate) const CONTINUE: u16 = 60;

pub(crate) struct Biff8Reader {
    /// Code page of 8-bit strings written by legacy producers.
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Start of the next record header
    pointer: usize,
    /// Body chunks of the current record
    chunks: Vec<Range<usize>>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at the end of
    /// the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, ParseError> {
        let Some(kind) = to_u16(&self.buffer, self.pointer) else {
            return Ok(None);
        };
        self.index = 0;
        self.offset = 0;
        self.chunks.clear();
        let body = self.take_body()?;
        self.chunks.push(body);
        while to_u16(&self.buffer, self.pointer) == Some(CONTINUE) {
            let chunk = self.take_body()?;
            self.chunks.push(chunk);
        }
        Ok(Some(kind))
    }

    /// Reads the length at `pointer + 2` and advances past the body.
    fn take_body(&mut self) -> Result<Range<usize>, ParseError> {
        let size = to_u16(&self.buffer, self.pointer + 2).ok_or(ParseError::RecordTooShort(2))?;
        let lower = self.pointer + 4;
        let upper = (lower + usize::from(size)).min(self.buffer.len());
        self.pointer = lower + usize::from(size);
        Ok(lower..upper)
    }

    /// Positions the reader at a record header, as stored in `BOUNDSHEET8`.
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
        self.chunks.clear();
    }

    /// Up to `length` bytes of the current chunk. Moves to the next chunk
    /// once this one is used up.
    fn read_span(&mut self, length: usize) -> Range<usize> {
        while let Some(chunk) = self.chunks.get(self.index) {
            let source = chunk.start + self.offset;
            if source >= chunk.end {
                self.index += 1;
                self.offset = 0;
                continue;
            }
            let target = chunk.end.min(source + length);
            if target == chunk.end {
                self.index += 1;
                self.offset = 0;
            } else {
                self.offset += target - source;
            }
            return source..target;
        }
        0..0
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut array = [0u8; N];
        let mut filled = 0usize;
        while filled < N {
            let span = self.read_span(N - filled);
            if span.is_empty() {
                Err(ParseError::RecordTooShort(N - filled))?
            }
            let length = span.len();
            array[filled..filled + length].copy_from_slice(&self.buffer[span]);
            filled += length;
        }
        Ok(array)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), ParseError> {
        let mut remaining = length;
        while remaining > 0 {
            let span = self.read_span(remaining);
            if span.is_empty() {
                Err(ParseError::RecordTooShort(remaining))?
            }
            remaining -= span.len();
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, ParseError> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, ParseError> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, ParseError> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, ParseError> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, ParseError> {
        self.read_array().map(f64::from_le_bytes)
    }

    /// Last two bytes of the current record, such as the closing column of
    /// a `MULRK`.
    pub(crate) fn trailing_u16(&self) -> Result<u16, ParseError> {
        let chunk = self
            .chunks
            .iter()
            .rev()
            .find(|chunk| chunk.len() >= 2)
            .ok_or(ParseError::RecordTooShort(2))?;
        to_u16(&self.buffer, chunk.end - 2).ok_or(ParseError::RecordTooShort(2))
    }

    /// Decodes an RK value: a 30-bit integer or the high bits of a double,
    /// optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<String, ParseError> {
        let value = self.read_u32()?;
        let is_percentage = value & 0x01 != 0;
        let is_integer = value & 0x02 != 0;

        let number = if is_integer {
            f64::from((value as i32) >> 2)
        } else {
            f64::from_bits(u64::from(value & 0xFFFF_FFFC) << 32)
        };
        Ok(match (is_integer, is_percentage) {
            (true, false) => ((value as i32) >> 2).to_string(),
            (_, true) => (number / 100.0).to_string(),
            (false, false) => number.to_string(),
        })
    }

    /// `ShortXLUnicodeString`: 1-byte character count.
    pub(crate) fn read_short_string(&mut self) -> Result<String, ParseError> {
        let chars = usize::from(self.read_u8()?);
        self.read_string(chars, false)
    }

    /// `XLUnicodeString`: 2-byte character count.
    pub(crate) fn read_string_u16(&mut self) -> Result<String, ParseError> {
        let chars = usize::from(self.read_u16()?);
        self.read_string(chars, false)
    }

    /// `XLUnicodeRichExtendedString`, as stored in the shared string table.
    /// Formatting runs and phonetic data are skipped.
    pub(crate) fn read_rich_string(&mut self) -> Result<String, ParseError> {
        let chars = usize::from(self.read_u16()?);
        self.read_string(chars, true)
    }

    /// Character data may be cut at a chunk boundary; the next chunk then
    /// starts with a fresh option byte saying how wide its characters are.
    fn read_string(&mut self, chars: usize, is_extended: bool) -> Result<String, ParseError> {
        let flags = self.read_u8()?;
        let runs = if is_extended && flags & 0x08 != 0 {
            usize::from(self.read_u16()?)
        } else {
            0
        };
        let phonetic_size = if is_extended && flags & 0x04 != 0 {
            self.read_u32()? as usize
        } else {
            0
        };

        let mut is_wide = flags & 0x01 != 0;
        let mut remaining = chars;
        let mut content = String::new();
        while remaining > 0 {
            let width = if is_wide { 2 } else { 1 };
            let span = self.read_span(remaining * width);
            let read = span.len() / width;
            content.push_str(&decode(self.encoding, &self.buffer[span], is_wide));
            remaining -= read;
            if remaining > 0 {
                is_wide = self.read_u8()? & 0x01 != 0;
            }
        }

        self.skip(4 * runs)?;
        self.skip(phonetic_size)?;
        Ok(content)
    }
}

/// Wide characters are UTF-16LE. Compressed characters are the low bytes of
/// UTF-16 code units, unless a legacy code page says otherwise.
fn decode(encoding: &'static Encoding, bytes: &[u8], is_wide: bool) -> String {
    if is_wide {
        UTF_16LE.decode_without_bom_handling(bytes).0.into_owned()
    } else if encoding == UTF_16LE {
        bytes.iter().map(|byte| char::from(*byte)).collect()
    } else {
        encoding.decode_without_bom_handling(bytes).0.into_owned()
    }
}

/// Loops over the records of a [`Biff8Reader`], dispatching on the record
/// type and ignoring unmatched ones. `break` leaves the loop.
#[macro_export]
macro_rules! match_biff8_records {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}
