use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Maximum number of meeting slots, so that availability fits a 64-bit mask.
pub const MAX_SLOTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSizeBounds {
    pub min: usize,
    pub max: usize,
}

impl GroupSizeBounds {
    pub fn contains(&self, size: usize) -> bool {
        (self.min..=self.max).contains(&size)
    }
}

/// A positive rational number kept in lowest terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    numer: i64,
    denom: i64,
}

impl Ratio {
    pub fn new(numer: i64, denom: i64) -> Result<Self> {
        if numer <= 0 || denom <= 0 {
            return Err(Error::Config(format!(
                "weight {numer}/{denom} must be strictly positive"
            )));
        }
        let g = gcd(numer, denom);
        Ok(Self {
            numer: numer / g,
            denom: denom / g,
        })
    }

    pub fn numer(&self) -> i64 {
        self.numer
    }

    pub fn denom(&self) -> i64 {
        self.denom
    }

    fn from_decimal(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("cannot parse weight {s:?}"));
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let denom = u32::try_from(frac_part.len())
            .ok()
            .and_then(|n| 10i64.checked_pow(n))
            .ok_or_else(invalid)?;
        let numer = format!("{int_part}{frac_part}")
            .parse::<i64>()
            .map_err(|_| invalid())?;
        Self::new(numer, denom)
    }
}

impl FromStr for Ratio {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((n, d)) => {
                let parse = |v: &str| {
                    v.trim()
                        .parse::<i64>()
                        .map_err(|_| Error::Config(format!("cannot parse weight {s:?}")))
                };
                Self::new(parse(n)?, parse(d)?)
            }
            None => Self::from_decimal(s),
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numer, self.denom)
    }
}

pub fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

/// Least common multiple, `None` on overflow. The lcm of nothing is 1.
pub fn lcm<I: IntoIterator<Item = i64>>(values: I) -> Option<i64> {
    values.into_iter().try_fold(1i64, |acc, v| {
        if v == 0 {
            return Some(0);
        }
        if acc == 0 {
            return Some(0);
        }
        (acc / gcd(acc, v)).checked_mul(v.abs())
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub student_mapping: BTreeMap<i64, i64>,
    pub company_mapping: BTreeMap<i64, i64>,
    pub skill_importance: BTreeMap<String, Ratio>,
    pub time_availability: Vec<String>,
    pub group_size: GroupSizeBounds,
}

#[derive(Deserialize)]
struct RawConfig {
    student_mapping: BTreeMap<String, i64>,
    company_mapping: BTreeMap<String, i64>,
    #[serde(default)]
    skill_importance: BTreeMap<String, RawWeight>,
    #[serde(alias = "time_avaliability")]
    time_availability: Vec<String>,
    group_size: GroupSizeBounds,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWeight {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawWeight {
    fn to_ratio(&self) -> Result<Ratio> {
        match self {
            RawWeight::Integer(n) => Ratio::new(*n, 1),
            // Shortest round-trip representation, so 0.1 reads as 1/10.
            RawWeight::Float(f) if f.is_finite() => Ratio::from_decimal(&f.to_string()),
            RawWeight::Float(f) => Err(Error::Config(format!("invalid weight {f}"))),
            RawWeight::Text(s) => s.parse(),
        }
    }
}

fn parse_mapping(name: &str, raw: BTreeMap<String, i64>) -> Result<BTreeMap<i64, i64>> {
    if raw.is_empty() {
        return Err(Error::Config(format!("{name} cannot be empty")));
    }
    raw.into_iter()
        .map(|(k, v)| {
            k.trim()
                .parse::<i64>()
                .map(|k| (k, v))
                .map_err(|_| Error::Config(format!("{name} key {k:?} is not an integer")))
        })
        .collect()
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let student_mapping = parse_mapping("student_mapping", raw.student_mapping)?;
        let company_mapping = parse_mapping("company_mapping", raw.company_mapping)?;
        if let Some((k, v)) = company_mapping.iter().find(|&(_, &v)| v < 1) {
            return Err(Error::Config(format!(
                "company_mapping value {v} for {k} must be at least 1"
            )));
        }
        let skill_importance = raw
            .skill_importance
            .iter()
            .map(|(skill, w)| Ok((skill.clone(), w.to_ratio()?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        if raw.time_availability.is_empty() {
            return Err(Error::Config("time_availability cannot be empty".into()));
        }
        if raw.time_availability.len() > MAX_SLOTS {
            return Err(Error::Config(format!(
                "at most {MAX_SLOTS} time slots are supported"
            )));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = raw.time_availability.iter().find(|s| !seen.insert(*s)) {
            return Err(Error::Config(format!("duplicate time slot {dup:?}")));
        }
        let group_size = raw.group_size;
        if group_size.min < 1 || group_size.min > group_size.max {
            return Err(Error::Config(format!(
                "group_size must satisfy 1 <= min <= max, got {}..{}",
                group_size.min, group_size.max
            )));
        }
        Ok(Config {
            student_mapping,
            company_mapping,
            skill_importance,
            time_availability: raw.time_availability,
            group_size,
        })
    }
}

impl Config {
    /// Load the configuration, as TOML if the extension says so and as JSON otherwise.
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml(&content),
            _ => Self::from_json(&content),
        }
    }

    pub fn from_json(content: &str) -> Result<Config> {
        serde_json::from_str::<RawConfig>(content)?.try_into()
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str::<RawConfig>(content)
            .map_err(|e| Error::Config(e.to_string()))?
            .try_into()
    }

    pub fn importance(&self, skill: &str) -> Option<Ratio> {
        self.skill_importance.get(skill).copied()
    }
}
