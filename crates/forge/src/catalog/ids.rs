//! Padded identifier formats used inside deliverables
//!
//! Every id is a prefix plus a zero-padded number (`B07`, `E03`, `S12`,
//! `P02`, `CL_PRE_04`). Parsing is loose so the canonicalizer can repair
//! `B7` or `cl_live_3`; [`IdPattern::is_canonical`] is strict.

use once_cell::sync::Lazy;
use regex::Regex;

static LOOSE_SIMPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([A-Za-z])\s*[-_]?\s*(\d{1,4})\s*$").unwrap());
static LOOSE_CHECKLIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*cl[\s_-]*(pre|live|post)[\s_-]*(\d{1,4})\s*$").unwrap()
});
static STRICT_SIMPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]\d{2}$").unwrap());
static STRICT_CHECKLIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CL_(PRE|LIVE|POST)_\d{2}$").unwrap());

/// Checklist categories, in run order
pub const CHECKLIST_CATEGORIES: [&str; 3] = ["PRE", "LIVE", "POST"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPattern {
    /// `B01`-`B21`
    Block,
    /// `E01`-`E10`
    Email,
    /// `S01`-`S24`
    Social,
    /// `P01`-`P08`
    Proof,
    /// `CL_{PRE|LIVE|POST}_01`-`CL_*_20`
    Checklist,
}

/// The parts of an identifier, independent of its padding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    pub category: Option<&'static str>,
    pub number: u32,
}

impl IdPattern {
    fn prefix(&self) -> &'static str {
        match self {
            IdPattern::Block => "B",
            IdPattern::Email => "E",
            IdPattern::Social => "S",
            IdPattern::Proof => "P",
            IdPattern::Checklist => "CL",
        }
    }

    /// Inclusive numeric range
    pub fn range(&self) -> (u32, u32) {
        match self {
            IdPattern::Block => (1, 21),
            IdPattern::Email => (1, 10),
            IdPattern::Social => (1, 24),
            IdPattern::Proof => (1, 8),
            IdPattern::Checklist => (1, 20),
        }
    }

    /// Human description used in error details and repair prompts
    pub fn describe(&self) -> String {
        let (min, max) = self.range();
        match self {
            IdPattern::Checklist => format!(
                "CL_<PRE|LIVE|POST>_<two digits>, numbered {:02}-{:02}",
                min, max
            ),
            _ => format!(
                "{p} followed by exactly two digits, {p}{:02}-{p}{:02}",
                min,
                max,
                p = self.prefix()
            ),
        }
    }

    /// Parse any reasonably shaped id, ignoring padding and case
    pub fn parse(&self, raw: &str) -> Option<ParsedId> {
        match self {
            IdPattern::Checklist => {
                let caps = LOOSE_CHECKLIST.captures(raw)?;
                let category = caps.get(1)?.as_str().to_ascii_uppercase();
                let category = CHECKLIST_CATEGORIES
                    .iter()
                    .copied()
                    .find(|c| *c == category)?;
                let number = caps.get(2)?.as_str().parse().ok()?;
                Some(ParsedId {
                    category: Some(category),
                    number,
                })
            }
            _ => {
                let caps = LOOSE_SIMPLE.captures(raw)?;
                if !caps.get(1)?.as_str().eq_ignore_ascii_case(self.prefix()) {
                    return None;
                }
                let number = caps.get(2)?.as_str().parse().ok()?;
                Some(ParsedId {
                    category: None,
                    number,
                })
            }
        }
    }

    pub fn in_range(&self, number: u32) -> bool {
        let (min, max) = self.range();
        (min..=max).contains(&number)
    }

    pub fn render(&self, parsed: &ParsedId) -> String {
        match (self, parsed.category) {
            (IdPattern::Checklist, Some(category)) => {
                format!("CL_{}_{:02}", category, parsed.number)
            }
            _ => format!("{}{:02}", self.prefix(), parsed.number),
        }
    }

    /// Canonical form of `raw` when its number is in range; `None` otherwise
    pub fn normalize(&self, raw: &str) -> Option<String> {
        let parsed = self.parse(raw)?;
        if !self.in_range(parsed.number) {
            return None;
        }
        Some(self.render(&parsed))
    }

    pub fn is_canonical(&self, raw: &str) -> bool {
        let shape_ok = match self {
            IdPattern::Checklist => STRICT_CHECKLIST.is_match(raw),
            _ => STRICT_SIMPLE.is_match(raw) && raw.starts_with(self.prefix()),
        };
        shape_ok
            && self
                .parse(raw)
                .map(|p| self.in_range(p.number))
                .unwrap_or(false)
    }

    /// Numeric ordering key; checklist ids order by category first
    pub fn sort_key(&self, raw: &str) -> Option<f64> {
        let parsed = self.parse(raw)?;
        let rank = parsed
            .category
            .and_then(|c| CHECKLIST_CATEGORIES.iter().position(|k| *k == c))
            .unwrap_or(0);
        Some((rank as f64) * 10_000.0 + parsed.number as f64)
    }
}
