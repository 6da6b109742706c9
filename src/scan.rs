use crate::pattern::Pattern;

/// Where a scan resumes after a candidate fails to match.
///
/// After a hit both resume past the whole hit, so hits never overlap and each
/// one can be patched without disturbing the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanStrategy {
    /// Resume at the byte after the failed candidate's start.
    #[default]
    Stepwise,
    /// Resume after the prefix the failed candidate did match. Faster on
    /// repetitive data but can step over a valid hit starting inside it.
    PrefixSkip,
}

pub struct Scanner<'a> {
    bytes: &'a [u8],
    pattern: Pattern,
    strategy: ScanStrategy,
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(pattern: Pattern, bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pattern,
            strategy: ScanStrategy::default(),
            pos: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: ScanStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let anchor = self.pattern.anchor()?;
        let size = self.pattern.len();
        let last = self.bytes.len().checked_sub(size)?;

        while self.pos <= last {
            let start = self.pos
                + self.bytes[self.pos..=last]
                    .iter()
                    .position(|b| *b == anchor)?;
            let view = &self.bytes[start..start + size];

            match self.pattern.first_mismatch(view) {
                None => {
                    self.pos = start + size;
                    return Some((start, view));
                }
                Some(matched) => {
                    if matched > 3 {
                        log::debug!("Possible hit failed at 0x{:X}", start);
                    }
                    self.pos = match self.strategy {
                        ScanStrategy::Stepwise => start + 1,
                        ScanStrategy::PrefixSkip => start + matched.max(1),
                    };
                }
            }
        }

        None
    }
}

/// Offsets of up to `max_hits` occurrences of `pattern` (all of them on `None`),
/// in increasing order.
pub fn search(
    bytes: &[u8],
    pattern: &Pattern,
    max_hits: Option<usize>,
    strategy: ScanStrategy,
) -> Vec<usize> {
    if pattern.anchor().is_none() {
        log::error!("The first byte of a search pattern can't be a wildcard or missing");
        return Vec::new();
    }

    log::debug!(
        "Performing search in {} bytes for {}",
        bytes.len(),
        pattern
    );

    let limit = max_hits.unwrap_or(usize::MAX);
    let mut hits = Vec::new();
    for (pos, _) in pattern.scan(bytes).with_strategy(strategy) {
        if hits.len() >= limit {
            break;
        }
        log::info!("Successful hit at 0x{:X}", pos);
        hits.push(pos);
        if hits.len() >= limit {
            log::info!("Max hits reached: {}", limit);
            return hits;
        }
    }

    log::info!("{} hits", hits.len());
    hits
}
