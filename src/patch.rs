use std::fmt;

use crate::{
    pattern::{Pattern, Segment},
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    Applied,
    AlreadyApplied,
    LengthMismatch { patch: usize, original: usize },
    StringTooLong { patch: usize, original: usize },
    /// `position` is relative to the patch offset.
    ByteMismatch { position: usize, expected: u8, found: u8 },
}

impl PatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PatchOutcome::Applied | PatchOutcome::AlreadyApplied)
    }
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::Applied => write!(f, "applied"),
            PatchOutcome::AlreadyApplied => write!(f, "already applied"),
            PatchOutcome::LengthMismatch { patch, original } => write!(
                f,
                "patch ({} bytes) and original ({} bytes) have different length",
                patch, original
            ),
            PatchOutcome::StringTooLong { patch, original } => write!(
                f,
                "string length ({}) is too long for original ({})",
                patch, original
            ),
            PatchOutcome::ByteMismatch {
                position,
                expected,
                found,
            } => write!(
                f,
                "byte mismatch at +0x{:X}, expected: 0x{:02X}, got: 0x{:02X}",
                position, expected, found
            ),
        }
    }
}

/// Writes `patch` into `buffer` at `offset`, after checking the bytes that are
/// there against `original`.
///
/// An already patched location is reported as [`PatchOutcome::AlreadyApplied`]
/// before `original` is looked at, so a script can be run again on its own
/// output. In string mode the patch may be shorter than `original`; the bytes
/// in between are zeroed. The buffer is only modified when the outcome is
/// [`PatchOutcome::Applied`].
pub fn apply(
    buffer: &mut [u8],
    offset: usize,
    patch: &Pattern,
    original: Option<&Pattern>,
    string_mode: bool,
) -> Result<PatchOutcome> {
    if let Some(original) = original {
        if string_mode && patch.len() > original.len() {
            let outcome = PatchOutcome::StringTooLong {
                patch: patch.len(),
                original: original.len(),
            };
            log::info!("{}", outcome);
            return Ok(outcome);
        }
        if !string_mode && patch.len() != original.len() {
            let outcome = PatchOutcome::LengthMismatch {
                patch: patch.len(),
                original: original.len(),
            };
            log::info!("{}", outcome);
            return Ok(outcome);
        }
    }

    let span = original.map_or(0, Pattern::len).max(patch.len());
    if offset
        .checked_add(span)
        .map_or(true, |end| end > buffer.len())
    {
        return Err(Error::OffsetOutOfRange {
            offset,
            len: span,
            size: buffer.len(),
        });
    }

    if patch.is_matching(&buffer[offset..]) {
        log::info!("Patch at 0x{:X} is already applied", offset);
        return Ok(PatchOutcome::AlreadyApplied);
    }

    if let Some(original) = original {
        if let Some(position) = original.first_mismatch(&buffer[offset..]) {
            let expected = original.bytes()[position];
            let found = buffer[offset + position];
            log::info!(
                "Byte mismatch at location 0x{:X}, expected: 0x{:02X}, got: 0x{:02X}",
                offset + position,
                expected,
                found
            );
            return Ok(PatchOutcome::ByteMismatch {
                position,
                expected,
                found,
            });
        }
    }

    let target = &mut buffer[offset..offset + span];
    for segment in patch.segments() {
        if let Segment::Literal { start, len } = *segment {
            target[start..start + len].copy_from_slice(&patch.bytes()[start..start + len]);
        }
    }
    if string_mode {
        target[patch.len()..].fill(0x00);
    }

    Ok(PatchOutcome::Applied)
}
