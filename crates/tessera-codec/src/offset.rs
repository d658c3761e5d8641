//! Offset-table arithmetic.
//!
//! An offset-table slot holds a position *relative to the variable block*,
//! never an absolute buffer position. [`RelativeOffset`] keeps the two apart
//! at the type level and [`VariableBlock`] is the only place they combine.

use crate::error::{DecodeError, DecodeErrorKind};

/// A signed slot value from the offset table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeOffset(i32);

impl RelativeOffset {
    /// Slot value for an absent field.
    pub const ABSENT: Self = Self(-1);

    /// Wraps a raw slot read from the wire.
    pub fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// The raw value to write into a slot.
    pub fn into_raw(self) -> i32 {
        self.0
    }

    pub fn is_absent(self) -> bool {
        self == Self::ABSENT
    }
}

/// Where one record's variable block begins in a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableBlock {
    start: usize,
}

impl VariableBlock {
    /// `record_start + variable_block_start`.
    pub fn new(record_start: usize, variable_block_start: usize) -> Self {
        Self {
            start: record_start.saturating_add(variable_block_start),
        }
    }

    /// Absolute position of the variable block.
    pub fn start(self) -> usize {
        self.start
    }

    /// Resolves a slot to an absolute position inside a buffer of
    /// `readable` bytes.
    ///
    /// Negative slots are [`DecodeErrorKind::InvalidOffset`]; positions at or
    /// beyond the extent are [`DecodeErrorKind::OffsetOutOfBounds`].
    pub fn resolve(self, offset: RelativeOffset, readable: usize) -> Result<usize, DecodeError> {
        let raw = offset.into_raw();
        if raw < 0 {
            return Err(DecodeErrorKind::InvalidOffset { offset: raw }.into());
        }
        let position = self.start.saturating_add(raw as usize);
        if position >= readable {
            return Err(DecodeErrorKind::OffsetOutOfBounds { position, readable }.into());
        }
        Ok(position)
    }

    /// Relative offset for a payload about to be written at `cursor`.
    ///
    /// Returns `None` when the distance does not fit a slot.
    pub fn relative(self, cursor: usize) -> Option<RelativeOffset> {
        let distance = cursor.checked_sub(self.start)?;
        i32::try_from(distance).ok().map(RelativeOffset)
    }
}
