//! Hierarchy levels and visible-to sets.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Hierarchy Level
// ---------------------------------------------------------------------------

/// Authority tier of a worker, and the tier a case has been raised to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum HierarchyLevel {
    Worker = 1,
    HeadOfDirectorate = 2,
    HeadOfService = 3,
    PastorInCharge = 4,
}

impl HierarchyLevel {
    pub const ALL: [HierarchyLevel; 4] = [
        HierarchyLevel::Worker,
        HierarchyLevel::HeadOfDirectorate,
        HierarchyLevel::HeadOfService,
        HierarchyLevel::PastorInCharge,
    ];

    pub fn from_number(n: i64) -> Option<Self> {
        match n {
            1 => Some(HierarchyLevel::Worker),
            2 => Some(HierarchyLevel::HeadOfDirectorate),
            3 => Some(HierarchyLevel::HeadOfService),
            4 => Some(HierarchyLevel::PastorInCharge),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        self as u8
    }

    /// The level directly above, or `None` at the ceiling.
    pub fn next(self) -> Option<Self> {
        Self::from_number(i64::from(self.number()) + 1)
    }

    pub fn name(self) -> &'static str {
        match self {
            HierarchyLevel::Worker => "Worker",
            HierarchyLevel::HeadOfDirectorate => "Head of Directorate",
            HierarchyLevel::HeadOfService => "Head of Service",
            HierarchyLevel::PastorInCharge => "Pastor in Charge",
        }
    }
}

impl std::fmt::Display for HierarchyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl From<HierarchyLevel> for u8 {
    fn from(level: HierarchyLevel) -> u8 {
        level.number()
    }
}

impl TryFrom<u8> for HierarchyLevel {
    type Error = Error;

    fn try_from(n: u8) -> Result<Self> {
        Self::from_number(i64::from(n))
            .ok_or_else(|| Error::Validation(format!("hierarchy level out of range: {n}")))
    }
}

impl TryFrom<i64> for HierarchyLevel {
    type Error = Error;

    fn try_from(n: i64) -> Result<Self> {
        Self::from_number(n)
            .ok_or_else(|| Error::Validation(format!("hierarchy level out of range: {n}")))
    }
}

// ---------------------------------------------------------------------------
// Level Set
// ---------------------------------------------------------------------------

/// A set of hierarchy levels, stored as a 4-bit mask (bit 0 = level 1).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<u8>", try_from = "Vec<u8>")]
pub struct LevelSet(u8);

impl LevelSet {
    pub const EMPTY: LevelSet = LevelSet(0);
    pub const ALL: LevelSet = LevelSet(0b1111);

    pub fn of(levels: &[HierarchyLevel]) -> Self {
        levels.iter().fold(Self::EMPTY, |set, &l| set.with(l))
    }

    pub fn single(level: HierarchyLevel) -> Self {
        Self::EMPTY.with(level)
    }

    /// Every level from 1 up to and including `top`.
    pub fn up_to(top: HierarchyLevel) -> Self {
        HierarchyLevel::ALL
            .into_iter()
            .filter(|&l| l <= top)
            .fold(Self::EMPTY, |set, l| set.with(l))
    }

    #[must_use]
    pub fn with(self, level: HierarchyLevel) -> Self {
        Self(self.0 | bit(level))
    }

    pub fn contains(self, level: HierarchyLevel) -> bool {
        self.0 & bit(level) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Narrowest addressed audience.
    pub fn min(self) -> Option<HierarchyLevel> {
        self.iter().next()
    }

    pub fn iter(self) -> impl Iterator<Item = HierarchyLevel> {
        HierarchyLevel::ALL
            .into_iter()
            .filter(move |&l| self.contains(l))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: i64) -> Result<Self> {
        if (0..=0b1111).contains(&bits) {
            Ok(Self(bits as u8))
        } else {
            Err(Error::Validation(format!("level mask out of range: {bits}")))
        }
    }

    /// Audience of a first message: the sender's level, plus the subject's
    /// level when the subject sits below the sender.
    pub fn initial_audience(sender: HierarchyLevel, subject: HierarchyLevel) -> Self {
        let set = Self::single(sender);
        if subject < sender {
            set.with(subject)
        } else {
            set
        }
    }

    /// Audience of the system message posted when a case reaches `level`.
    /// Widens with each step: 1 -> {1,2}, 2 -> {1,2,3}, 3 and 4 -> {1,2,3,4}.
    pub fn escalation_audience(level: HierarchyLevel) -> Self {
        Self::up_to(level.next().unwrap_or(HierarchyLevel::PastorInCharge))
    }
}

fn bit(level: HierarchyLevel) -> u8 {
    1 << (level.number() - 1)
}

impl std::fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.iter().map(|l| l.number())).finish()
    }
}

/// Comma-separated level numbers, e.g. `1,2,3`.
impl std::fmt::Display for LevelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self.iter().map(|l| l.number().to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for LevelSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .try_fold(Self::EMPTY, |set, part| {
                let n: u8 = part
                    .parse()
                    .map_err(|_| Error::Validation(format!("not a hierarchy level: {part:?}")))?;
                Ok(set.with(HierarchyLevel::try_from(n)?))
            })
    }
}

impl From<LevelSet> for Vec<u8> {
    fn from(set: LevelSet) -> Vec<u8> {
        set.iter().map(HierarchyLevel::number).collect()
    }
}

impl TryFrom<Vec<u8>> for LevelSet {
    type Error = Error;

    fn try_from(levels: Vec<u8>) -> Result<Self> {
        levels.into_iter().try_fold(Self::EMPTY, |set, n| {
            Ok(set.with(HierarchyLevel::try_from(n)?))
        })
    }
}
