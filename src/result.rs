//! Typed access to prepared statement results.
//!
//! Every result column is fetched as text into its own [`ColumnBuffer`].
//! A buffer that was too small for the last value is grown and refetched
//! by the connection before the row is handed to the callback, so getters
//! never see truncated data.

use std::str;

use crate::driver::ColumnMeta;
use crate::error::{Error, Result};

/// Initial buffer size for columns whose server-reported length is unknown
/// or larger than this.
pub const INITIAL_COLUMN_CAPACITY: usize = 256;

// ============================================================================
// Column Buffer
// ============================================================================

/// Decode slot of one result column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBuffer {
    buffer: Vec<u8>,
    is_null: bool,
    length: usize,
}

impl ColumnBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: vec![0; capacity],
            is_null: true,
            length: 0,
        }
    }

    /// Bytes the buffer can hold without a refetch.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Full length of the last fetched value.
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Whether the last fetched value did not fit.
    #[inline]
    pub fn is_truncated(&self) -> bool {
        !self.is_null && self.length > self.buffer.len()
    }

    /// Store a fetched value, truncated to the capacity.
    pub fn fill(&mut self, value: &[u8]) {
        let n = value.len().min(self.buffer.len());
        self.buffer[..n].copy_from_slice(&value[..n]);
        self.length = value.len();
        self.is_null = false;
    }

    /// Store a fetched NULL.
    pub fn set_null(&mut self) {
        self.is_null = true;
        self.length = 0;
    }

    /// Grow to the length of the last fetched value. Never shrinks.
    pub(crate) fn grow(&mut self) {
        if self.length > self.buffer.len() {
            self.buffer.resize(self.length, 0);
        }
    }

    /// The fetched value, or `None` for NULL.
    pub fn value(&self) -> Option<&[u8]> {
        if self.is_null {
            return None;
        }
        Some(&self.buffer[..self.length.min(self.buffer.len())])
    }
}

// ============================================================================
// Statement Result
// ============================================================================

/// Typed view of the current row of an executed prepared statement.
///
/// Column indices are 1-based; names match exactly and case-sensitively.
#[derive(Debug)]
pub struct StatementResult {
    meta: Vec<ColumnMeta>,
    columns: Vec<ColumnBuffer>,
}

impl StatementResult {
    pub fn new(meta: Vec<ColumnMeta>) -> Self {
        let columns = meta
            .iter()
            .map(|m| {
                let capacity = match m.length {
                    0 => INITIAL_COLUMN_CAPACITY,
                    n => n.min(INITIAL_COLUMN_CAPACITY),
                };
                ColumnBuffer::with_capacity(capacity)
            })
            .collect();
        Self { meta, columns }
    }

    #[inline]
    pub fn column_count(&self) -> usize {
        self.meta.len()
    }

    pub fn columns(&self) -> &[ColumnMeta] {
        &self.meta
    }

    pub(crate) fn buffers_mut(&mut self) -> &mut [ColumnBuffer] {
        &mut self.columns
    }

    /// Buffer of 1-based column `index`.
    pub fn buffer(&self, index: usize) -> Result<&ColumnBuffer> {
        let count = self.columns.len();
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .ok_or(Error::ColumnIndex { index, count })
    }

    /// 1-based index of the first column called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.meta.iter().position(|m| m.name == name).map(|i| i + 1)
    }

    fn index_by_name(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::ColumnName(name.to_string()))
    }

    pub fn get_blob(&self, index: usize) -> Result<Option<&[u8]>> {
        Ok(self.buffer(index)?.value())
    }

    pub fn get_string(&self, index: usize) -> Result<Option<&str>> {
        match self.buffer(index)?.value() {
            Some(bytes) => Ok(Some(str::from_utf8(bytes)?)),
            None => Ok(None),
        }
    }

    /// Integer value of the column text, parsed like `strtol`.
    pub fn get_int(&self, index: usize) -> Result<Option<i32>> {
        Ok(self
            .buffer(index)?
            .value()
            .map(|v| parse_int_prefix(v).clamp(i32::MIN as i64, i32::MAX as i64) as i32))
    }

    /// 64-bit integer value of the column text, parsed like `strtoll`.
    pub fn get_llong(&self, index: usize) -> Result<Option<i64>> {
        Ok(self.buffer(index)?.value().map(parse_int_prefix))
    }

    /// Floating point value of the column text, parsed like `strtod`.
    pub fn get_double(&self, index: usize) -> Result<Option<f64>> {
        Ok(self.buffer(index)?.value().map(parse_double_prefix))
    }

    pub fn get_blob_by_name(&self, name: &str) -> Result<Option<&[u8]>> {
        self.get_blob(self.index_by_name(name)?)
    }

    pub fn get_string_by_name(&self, name: &str) -> Result<Option<&str>> {
        self.get_string(self.index_by_name(name)?)
    }

    pub fn get_int_by_name(&self, name: &str) -> Result<Option<i32>> {
        self.get_int(self.index_by_name(name)?)
    }

    pub fn get_llong_by_name(&self, name: &str) -> Result<Option<i64>> {
        self.get_llong(self.index_by_name(name)?)
    }

    pub fn get_double_by_name(&self, name: &str) -> Result<Option<f64>> {
        self.get_double(self.index_by_name(name)?)
    }
}

// ============================================================================
// Numeric prefix parsing
// ============================================================================

fn skip_space(s: &[u8]) -> &[u8] {
    let start = s.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(s.len());
    &s[start..]
}

/// Leading optional sign and decimal digits; anything after is ignored.
/// Saturates on overflow, yields 0 when there are no digits.
pub(crate) fn parse_int_prefix(s: &[u8]) -> i64 {
    let s = skip_space(s);
    let (negative, digits) = match s.first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for &b in digits.iter().take_while(|b| b.is_ascii_digit()) {
        let digit = (b - b'0') as i64;
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Longest prefix that reads as a decimal float; 0.0 when there is none.
pub(crate) fn parse_double_prefix(s: &[u8]) -> f64 {
    let s = skip_space(s);
    let mut end = 0;

    if matches!(s.first(), Some(b'-' | b'+')) {
        end += 1;
    }
    let int_start = end;
    while s.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;
    if s.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while s.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        if mantissa_digits > 0 {
            end = frac_end;
        }
    }
    if mantissa_digits == 0 {
        return 0.0;
    }

    // exponent only counts when digits follow
    if matches!(s.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(s.get(exp_end), Some(b'-' | b'+')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while s.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    str::from_utf8(&s[..end])
        .ok()
        .and_then(|t| t.parse().ok())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with(values: &[Option<&str>]) -> StatementResult {
        let meta = (0..values.len())
            .map(|i| ColumnMeta::new(format!("c{}", i + 1), 0))
            .collect();
        let mut result = StatementResult::new(meta);
        for (buffer, value) in result.buffers_mut().iter_mut().zip(values) {
            match value {
                Some(v) => buffer.fill(v.as_bytes()),
                None => buffer.set_null(),
            }
        }
        result
    }

    #[test]
    fn test_parse_int_prefix() {
        assert_eq!(parse_int_prefix(b"42"), 42);
        assert_eq!(parse_int_prefix(b"  -17abc"), -17);
        assert_eq!(parse_int_prefix(b"+8.9"), 8);
        assert_eq!(parse_int_prefix(b"abc"), 0);
        assert_eq!(parse_int_prefix(b""), 0);
        assert_eq!(parse_int_prefix(b"99999999999999999999999"), i64::MAX);
        assert_eq!(parse_int_prefix(b"-99999999999999999999999"), i64::MIN);
    }

    #[test]
    fn test_parse_double_prefix() {
        assert_eq!(parse_double_prefix(b"3.25"), 3.25);
        assert_eq!(parse_double_prefix(b"-1.5e2xyz"), -150.0);
        assert_eq!(parse_double_prefix(b"7e"), 7.0);
        assert_eq!(parse_double_prefix(b".5"), 0.5);
        assert_eq!(parse_double_prefix(b"12."), 12.0);
        assert_eq!(parse_double_prefix(b"."), 0.0);
        assert_eq!(parse_double_prefix(b"-"), 0.0);
        assert_eq!(parse_double_prefix(b"n/a"), 0.0);
    }

    #[test]
    fn test_typed_getters() {
        let result = result_with(&[Some("777"), Some("12345678901"), Some("2.5 kg"), Some("hello")]);

        assert_eq!(result.get_int(1).unwrap(), Some(777));
        assert_eq!(result.get_llong(2).unwrap(), Some(12_345_678_901));
        assert_eq!(result.get_int(2).unwrap(), Some(i32::MAX));
        assert_eq!(result.get_double(3).unwrap(), Some(2.5));
        assert_eq!(result.get_string(4).unwrap(), Some("hello"));
        assert_eq!(result.get_blob(4).unwrap(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_null_propagates_through_every_getter() {
        let result = result_with(&[None]);

        assert_eq!(result.get_int(1).unwrap(), None);
        assert_eq!(result.get_llong(1).unwrap(), None);
        assert_eq!(result.get_double(1).unwrap(), None);
        assert_eq!(result.get_string(1).unwrap(), None);
        assert_eq!(result.get_blob(1).unwrap(), None);
    }

    #[test]
    fn test_empty_string_is_not_null() {
        let result = result_with(&[Some("")]);
        assert_eq!(result.get_string(1).unwrap(), Some(""));
        assert_eq!(result.get_int(1).unwrap(), Some(0));
    }

    #[test]
    fn test_index_bounds() {
        let result = result_with(&[Some("1")]);
        assert!(matches!(result.get_int(0), Err(Error::ColumnIndex { index: 0, count: 1 })));
        assert!(result.get_string(2).is_err());
    }

    #[test]
    fn test_lookup_by_name() {
        let mut result = StatementResult::new(vec![
            ColumnMeta::new("id", 11),
            ColumnMeta::new("name", 64),
            ColumnMeta::new("id", 11),
        ]);
        result.buffers_mut()[0].fill(b"1");
        result.buffers_mut()[1].fill(b"alice");
        result.buffers_mut()[2].fill(b"2");

        assert_eq!(result.index_of("id"), Some(1));
        assert_eq!(result.index_of("ID"), None);
        assert_eq!(result.get_int_by_name("id").unwrap(), Some(1));
        assert_eq!(result.get_string_by_name("name").unwrap(), Some("alice"));
        assert!(matches!(result.get_int_by_name("missing"), Err(Error::ColumnName(_))));
    }

    #[test]
    fn test_buffer_growth() {
        let mut buffer = ColumnBuffer::with_capacity(4);
        buffer.fill(b"abcdefgh");
        assert!(buffer.is_truncated());
        assert_eq!(buffer.value(), Some(&b"abcd"[..]));

        buffer.grow();
        assert_eq!(buffer.capacity(), 8);
        buffer.fill(b"abcdefgh");
        assert!(!buffer.is_truncated());
        assert_eq!(buffer.value(), Some(&b"abcdefgh"[..]));

        // shorter values never shrink the buffer
        buffer.fill(b"ab");
        buffer.grow();
        assert_eq!(buffer.capacity(), 8);
        assert_eq!(buffer.value(), Some(&b"ab"[..]));
    }

    #[test]
    fn test_initial_capacity_follows_metadata() {
        let result = StatementResult::new(vec![
            ColumnMeta::new("a", 11),
            ColumnMeta::new("b", 0),
            ColumnMeta::new("c", 1 << 20),
        ]);
        assert_eq!(result.buffer(1).unwrap().capacity(), 11);
        assert_eq!(result.buffer(2).unwrap().capacity(), INITIAL_COLUMN_CAPACITY);
        assert_eq!(result.buffer(3).unwrap().capacity(), INITIAL_COLUMN_CAPACITY);
    }
}
