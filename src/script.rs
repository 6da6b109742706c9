//! INI-like batch scripts.
//!
//! ```ini
//! ; skip the region check
//! [RegionCheck]
//! Type=Binary
//! Mode=Multi
//! Original=0x74,0x05,0x??
//! Patch=0xEB,0x05,0x??
//! MaximumHits=1
//!
//! [Title]
//! Type=StringUTF8
//! Mode=MultiTable
//! Hello world=Hi world
//! ```
//!
//! Every section is one unit: it either completes or fails as a whole before
//! the next one starts, although bytes already written by a failing `Multi`
//! or `MultiTable` section stay written.

use std::str::FromStr;

use crate::{parse_offset, Error, PatchType, Pattern, Result, Session};

/// Keys that configure a `MultiTable` section rather than being one of its rows.
const TABLE_SETTINGS: [&str; 5] = ["Type", "Mode", "MaximumHits", "Enabled", "StringTrim"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionMode {
    Single,
    Multi,
    MultiTable,
}

impl FromStr for SectionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" => Ok(Self::Multi),
            "multitable" => Ok(Self::MultiTable),
            _ => Err(Error::InvalidMode(s.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    name: String,
    line: usize,
    entries: Vec<(String, String)>,
}

impl Section {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Blank, `1` and `true` keep a section enabled.
    pub fn is_enabled(&self) -> bool {
        match self.get("Enabled").map(str::trim) {
            None | Some("") | Some("1") => true,
            Some(other) => other.eq_ignore_ascii_case("true"),
        }
    }

    fn string_trim(&self) -> bool {
        self.get("StringTrim")
            .and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            })
            .unwrap_or(true)
    }

    /// Missing, unparsable or non-positive values mean every hit.
    fn max_hits(&self) -> Option<usize> {
        self.get("MaximumHits")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|hits| *hits > 0)
            .and_then(|hits| usize::try_from(hits).ok())
    }

    fn text(&self, key: &'static str) -> Option<&str> {
        let value = self.get(key)?;
        Some(match self.string_trim() {
            true => value.trim(),
            false => value,
        })
    }

    /// Decodes the section into something that can run, parsing every pattern.
    fn unit(&self) -> Result<Unit> {
        let kind: PatchType = self.get("Type").ok_or(Error::MissingKey("Type"))?.parse()?;
        let mode: SectionMode = self.get("Mode").ok_or(Error::MissingKey("Mode"))?.parse()?;

        log::debug!("Mode: {:?}", mode);
        log::debug!("Type: {}", kind);

        let job = match mode {
            SectionMode::Single => {
                let patch = self.text("Patch").ok_or(Error::MissingKey("Patch"))?;
                let original = self.text("Original").filter(|s| !s.is_empty());
                let offset = parse_offset(self.get("Offset").ok_or(Error::MissingKey("Offset"))?)?;
                Job::Single {
                    offset,
                    patch: Pattern::parse(patch, kind)?,
                    original: original.map(|s| Pattern::parse(s, kind)).transpose()?,
                }
            }
            SectionMode::Multi => {
                let patch = self.text("Patch").ok_or(Error::MissingKey("Patch"))?;
                let original = self
                    .text("Original")
                    .filter(|s| !s.is_empty())
                    .ok_or(Error::MissingKey("Original"))?;
                Job::Table {
                    rows: vec![(Pattern::parse(original, kind)?, Pattern::parse(patch, kind)?)],
                    max_hits: self.max_hits(),
                }
            }
            SectionMode::MultiTable => {
                let trim = self.string_trim();
                let rows = self
                    .entries()
                    .filter(|(key, _)| !TABLE_SETTINGS.contains(key))
                    .map(|(original, patch)| -> Result<(Pattern, Pattern)> {
                        let (original, patch) = match trim {
                            true => (original.trim(), patch.trim()),
                            false => (original, patch),
                        };
                        Ok((Pattern::parse(original, kind)?, Pattern::parse(patch, kind)?))
                    })
                    .collect::<Result<Vec<_>>>()?;
                Job::Table {
                    rows,
                    max_hits: self.max_hits(),
                }
            }
        };

        Ok(Unit {
            string_mode: kind.is_string(),
            job,
        })
    }
}

struct Unit {
    string_mode: bool,
    job: Job,
}

enum Job {
    Single {
        offset: usize,
        patch: Pattern,
        original: Option<Pattern>,
    },
    /// Search-and-patch, one row per original/patch pair.
    Table {
        rows: Vec<(Pattern, Pattern)>,
        max_hits: Option<usize>,
    },
}

impl Unit {
    fn run(&self, session: &mut Session) -> Result<()> {
        match &self.job {
            Job::Single {
                offset,
                patch,
                original,
            } => {
                session.patch_at(*offset, patch, original.as_ref(), self.string_mode)?;
            }
            Job::Table { rows, max_hits } => {
                for (original, patch) in rows {
                    if self.string_mode {
                        log::info!("Searching for string: {}", original);
                    }
                    session.patch_all(original, patch, *max_hits, self.string_mode)?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ScriptReport {
    pub applied: Vec<String>,
    pub disabled: Vec<String>,
    /// Only filled when running with `continue_on_error`.
    pub failed: Vec<(String, Error)>,
}

impl ScriptReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    sections: Vec<Section>,
}

impl Script {
    pub fn parse(src: &str) -> Result<Self> {
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        let mut sections: Vec<Section> = Vec::new();

        for (idx, raw) in src.lines().enumerate() {
            let line = idx + 1;
            let raw = raw.strip_suffix('\r').unwrap_or(raw);
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
                continue;
            }

            if let Some(header) = trimmed.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .ok_or_else(|| script_error(line, "unterminated section header"))?
                    .trim();
                if sections.iter().any(|s| s.name == name) {
                    return Err(script_error(line, format!("duplicate section [{}]", name)));
                }
                sections.push(Section {
                    name: name.to_owned(),
                    line,
                    entries: Vec::new(),
                });
                continue;
            }

            let (key, value) = raw
                .split_once('=')
                .ok_or_else(|| script_error(line, "expected key=value"))?;
            let key = key.trim();
            let section = sections
                .last_mut()
                .ok_or_else(|| script_error(line, "key outside of a section"))?;
            if section.get(key).is_some() {
                return Err(script_error(
                    line,
                    format!("duplicate key {:?} in [{}]", key, section.name),
                ));
            }
            section.entries.push((key.to_owned(), value.to_owned()));
        }

        Ok(Self { sections })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn run(&self, session: &mut Session, continue_on_error: bool) -> Result<ScriptReport> {
        self.run_with(session, continue_on_error, |_| {})
    }

    /// Runs every section in order, calling `after_each` once a section is done
    /// with, whatever its result. The first failure aborts the run unless
    /// `continue_on_error` is set.
    pub fn run_with<F>(
        &self,
        session: &mut Session,
        continue_on_error: bool,
        mut after_each: F,
    ) -> Result<ScriptReport>
    where
        F: FnMut(&Section),
    {
        let mut report = ScriptReport::default();

        for section in &self.sections {
            log::info!("Processing: {}", section.name);

            if !section.is_enabled() {
                log::info!("{} is disabled, continuing...", section.name);
                report.disabled.push(section.name.clone());
                after_each(section);
                continue;
            }

            match section.unit().and_then(|unit| unit.run(session)) {
                Ok(()) => report.applied.push(section.name.clone()),
                Err(err) => {
                    log::error!("Error processing patch: {}: {}", section.name, err);
                    if !continue_on_error {
                        return Err(Error::Section {
                            name: section.name.clone(),
                            source: Box::new(err),
                        });
                    }
                    log::info!("Continue on error is set, continuing...");
                    report.failed.push((section.name.clone(), err));
                }
            }

            after_each(section);
        }

        Ok(report)
    }
}

fn script_error(line: usize, reason: impl Into<String>) -> Error {
    Error::Script {
        line,
        reason: reason.into(),
    }
}
