//! Prepared statement input parameters.
//!
//! A [`ParamSet`] is created by a successful prepare when the statement has
//! at least one placeholder. Slots are addressed 1-based, like the
//! placeholders they bind, and the set never changes size.

use bytes::Bytes;
use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::{Error, Result};

/// Wire type a slot is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Slot was never set
    Null,
    String,
    Int,
    LongLong,
    Double,
    Timestamp,
    Blob,
}

/// Calendar timestamp decomposed in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl Timestamp {
    /// Decompose in UTC. Years before 1 BCE cannot be bound.
    pub fn from_datetime(value: DateTime<Utc>) -> Option<Self> {
        let year = u32::try_from(value.year()).ok()?;
        Some(Self {
            year,
            month: value.month(),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        })
    }
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// NULL, bound with the type of the setter that produced it
    Null(ParamType),
    String(Bytes),
    Int(i32),
    LongLong(i64),
    Double(f64),
    Timestamp(Timestamp),
    Blob(Bytes),
}

impl Param {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Param::Null(_))
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            Param::Null(ty) => *ty,
            Param::String(_) => ParamType::String,
            Param::Int(_) => ParamType::Int,
            Param::LongLong(_) => ParamType::LongLong,
            Param::Double(_) => ParamType::Double,
            Param::Timestamp(_) => ParamType::Timestamp,
            Param::Blob(_) => ParamType::Blob,
        }
    }

    /// Byte length sent for variable-length values.
    pub fn length(&self) -> usize {
        match self {
            Param::String(b) | Param::Blob(b) => b.len(),
            _ => 0,
        }
    }
}

impl Default for Param {
    fn default() -> Self {
        Param::Null(ParamType::Null)
    }
}

// ============================================================================
// Parameter Set
// ============================================================================

/// Fixed-size, 1-indexed parameter buffer of one prepared statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSet {
    slots: Vec<Param>,
}

impl ParamSet {
    /// Create `size` unset slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![Param::default(); size],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All slots in placeholder order.
    pub fn as_slice(&self) -> &[Param] {
        &self.slots
    }

    /// Value bound at 1-based `index`.
    pub fn get(&self, index: usize) -> Option<&Param> {
        index.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    fn slot(&mut self, index: usize) -> Result<&mut Param> {
        let size = self.slots.len();
        index
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .ok_or(Error::ParamIndex { index, size })
    }

    /// Bind a string; `None` binds NULL. The bytes are copied at call time.
    pub fn set_string(&mut self, index: usize, value: Option<&str>) -> Result<()> {
        *self.slot(index)? = match value {
            Some(s) => Param::String(Bytes::copy_from_slice(s.as_bytes())),
            None => Param::Null(ParamType::String),
        };
        Ok(())
    }

    pub fn set_int(&mut self, index: usize, value: i32) -> Result<()> {
        *self.slot(index)? = Param::Int(value);
        Ok(())
    }

    pub fn set_llong(&mut self, index: usize, value: i64) -> Result<()> {
        *self.slot(index)? = Param::LongLong(value);
        Ok(())
    }

    pub fn set_double(&mut self, index: usize, value: f64) -> Result<()> {
        *self.slot(index)? = Param::Double(value);
        Ok(())
    }

    /// Bind a Unix timestamp (seconds), decomposed in UTC.
    pub fn set_timestamp(&mut self, index: usize, secs: i64) -> Result<()> {
        let slot = self.slot(index)?;
        let timestamp = DateTime::from_timestamp(secs, 0)
            .and_then(Timestamp::from_datetime)
            .ok_or(Error::Timestamp(secs))?;
        *slot = Param::Timestamp(timestamp);
        Ok(())
    }

    pub fn set_datetime(&mut self, index: usize, value: DateTime<Utc>) -> Result<()> {
        let slot = self.slot(index)?;
        let timestamp = Timestamp::from_datetime(value).ok_or(Error::Timestamp(value.timestamp()))?;
        *slot = Param::Timestamp(timestamp);
        Ok(())
    }

    /// Bind binary data; `None` binds NULL. The bytes are copied at call time.
    pub fn set_blob(&mut self, index: usize, value: Option<&[u8]>) -> Result<()> {
        *self.slot(index)? = match value {
            Some(b) => Param::Blob(Bytes::copy_from_slice(b)),
            None => Param::Null(ParamType::Blob),
        };
        Ok(())
    }
}
