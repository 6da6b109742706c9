use crate::{
    patch::{self, PatchOutcome},
    pattern::Pattern,
    scan::{self, ScanStrategy},
    Error, Result,
};

/// What a search-and-patch pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultiReport {
    /// Offsets handed to the patcher, in order.
    pub offsets: Vec<usize>,
    /// Nothing matched the original, but the patched bytes were found instead.
    pub already_applied: bool,
}

/// Owns the file contents for the length of one run. Every patch of a run goes
/// through here, one after the other, each seeing what the previous one wrote.
pub struct Session {
    buffer: Vec<u8>,
    strategy: ScanStrategy,
}

impl Session {
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            buffer,
            strategy: ScanStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn find(&self, pattern: &Pattern, max_hits: Option<usize>) -> Vec<usize> {
        scan::search(&self.buffer, pattern, max_hits, self.strategy)
    }

    /// Applies `patch` at `offset`, failing unless it is applied or was already.
    pub fn patch_at(
        &mut self,
        offset: usize,
        patch: &Pattern,
        original: Option<&Pattern>,
        string_mode: bool,
    ) -> Result<PatchOutcome> {
        log::debug!("To ({}): {}", patch.len(), patch);
        if let Some(original) = original {
            log::debug!("From ({}): {}", original.len(), original);
        }
        log::debug!("Offset: 0x{:X}", offset);

        let outcome = patch::apply(&mut self.buffer, offset, patch, original, string_mode)?;
        log::debug!("Result: {}", outcome);
        match outcome.is_success() {
            true => Ok(outcome),
            false => Err(Error::Rejected { offset, outcome }),
        }
    }

    /// Patches every occurrence of `original`, up to `max_hits`.
    pub fn patch_all(
        &mut self,
        original: &Pattern,
        patch: &Pattern,
        max_hits: Option<usize>,
        string_mode: bool,
    ) -> Result<MultiReport> {
        let offsets = self.find(original, max_hits);
        if offsets.is_empty() {
            if self.find(patch, Some(1)).is_empty() {
                return Err(Error::NoMatchFound);
            }
            log::info!("No matches, but patch was already found.");
            return Ok(MultiReport {
                offsets,
                already_applied: true,
            });
        }

        for &offset in &offsets {
            log::info!("Patching offset 0x{:X}", offset);
            self.patch_at(offset, patch, Some(original), string_mode)?;
        }

        Ok(MultiReport {
            offsets,
            already_applied: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::PatchType;

    fn hex(str: &str) -> Pattern {
        Pattern::from_hex(str).unwrap()
    }

    #[test]
    fn test_patch_at() {
        let mut session = Session::new(vec![0x74, 0x05, 0x00]);
        assert_eq!(
            PatchOutcome::Applied,
            session
                .patch_at(0, &hex("EB 05"), Some(&hex("74 05")), false)
                .unwrap()
        );
        assert_eq!(vec![0xEB, 0x05, 0x00], session.into_bytes());
    }

    #[test]
    fn test_patch_at_rejected() {
        let mut session = Session::new(vec![0x75, 0x05, 0x00]);
        let err = session
            .patch_at(1, &hex("EB 05"), Some(&hex("74 05")), false)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                offset: 1,
                outcome: PatchOutcome::ByteMismatch {
                    position: 0,
                    expected: 0x74,
                    found: 0x05
                }
            }
        ));
        assert_eq!(&[0x75, 0x05, 0x00], session.bytes());
    }

    #[test]
    fn test_patch_all() {
        let mut session = Session::new(vec![0x74, 0x05, 0x00, 0x74, 0x05, 0x74, 0x06]);
        let report = session
            .patch_all(&hex("74 05"), &hex("EB 05"), None, false)
            .unwrap();
        assert_eq!(vec![0, 3], report.offsets);
        assert!(!report.already_applied);
        assert_eq!(
            &[0xEB, 0x05, 0x00, 0xEB, 0x05, 0x74, 0x06],
            session.bytes()
        );

        let report = session
            .patch_all(&hex("74 05"), &hex("EB 05"), None, false)
            .unwrap();
        assert!(report.already_applied);
        assert!(report.offsets.is_empty());
    }

    #[test]
    fn test_patch_all_max_hits() {
        let mut session = Session::new(vec![0x74, 0x05, 0x74, 0x05, 0x74, 0x05]);
        let report = session
            .patch_all(&hex("74 05"), &hex("EB 05"), Some(2), false)
            .unwrap();
        assert_eq!(vec![0, 2], report.offsets);
        assert_eq!(&[0xEB, 0x05, 0xEB, 0x05, 0x74, 0x05], session.bytes());
    }

    #[test]
    fn test_patch_all_self_overlapping() {
        for strategy in [ScanStrategy::Stepwise, ScanStrategy::PrefixSkip] {
            let mut session = Session::new(vec![0x90; 4]).with_strategy(strategy);
            let report = session
                .patch_all(&hex("90 90"), &hex("CC CC"), None, false)
                .unwrap();
            assert_eq!(vec![0, 2], report.offsets);
            assert_eq!(&[0xCC; 4], session.bytes());
        }
    }

    #[test]
    fn test_patch_all_no_match() {
        let mut session = Session::new(vec![0x00; 8]);
        assert!(matches!(
            session.patch_all(&hex("74 05"), &hex("EB 05"), None, false),
            Err(Error::NoMatchFound)
        ));
    }

    #[test]
    fn test_patch_all_strings() {
        let mut session = Session::new(b"\0Hello\0Hello\0".to_vec());
        let original = Pattern::parse("Hello", PatchType::StringUtf8).unwrap();
        let patch = Pattern::parse("Hi", PatchType::StringUtf8).unwrap();
        session.patch_all(&original, &patch, None, true).unwrap();
        assert_eq!(b"\0Hi\0\0\0\0Hi\0\0\0\0".to_vec(), session.into_bytes());
    }

    #[test]
    fn test_find_prefix_skip() {
        let session = Session::new(vec![0xAA, 0xAA, 0xAA, 0xBB]);
        assert_eq!(vec![1], session.find(&hex("AA AA BB"), None));
        let session = session.with_strategy(ScanStrategy::PrefixSkip);
        assert!(session.find(&hex("AA AA BB"), None).is_empty());
    }
}
