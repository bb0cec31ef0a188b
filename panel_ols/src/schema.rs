//! Column-name normalization.
//!
//! Every raw table is read schema-on-read: a [`ColumnSchema`] lists the
//! semantic roles a builder needs, each with an ordered list of synonyms, and
//! [`ColumnSchema::resolve`] turns the vendor's column labels into a
//! [`ColumnMap`] or a [`SchemaMismatch`] naming what could not be found.

use std::collections::HashSet;
use std::fmt;

use regex::Regex;

/// Semantic role a raw column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Date,
    Hour,
    SettlementPoint,
    Price,
    Load,
    Zone,
    Category,
    Value,
    Fuel,
    Total,
    Cdd,
    Hdd,
    RenewableShare,
    DstFlag,
    TimeZone,
}

impl Role {
    pub fn name(&self) -> &'static str {
        match self {
            Role::Date => "date",
            Role::Hour => "hour",
            Role::SettlementPoint => "settlement_point",
            Role::Price => "price",
            Role::Load => "load",
            Role::Zone => "zone",
            Role::Category => "datatype",
            Role::Value => "value",
            Role::Fuel => "fuel",
            Role::Total => "total",
            Role::Cdd => "cdd",
            Role::Hdd => "hdd",
            Role::RenewableShare => "renewable_share",
            Role::DstFlag => "dst_flag",
            Role::TimeZone => "time_zone",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How far the matcher may stray from the literal synonyms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPolicy {
    /// Trimmed, case-insensitive equality only.
    Exact,
    /// Equality first, then `^<synonym>(_?\w+)?$` to accept suffixed labels
    /// such as `Price_t` or `PRICE2022`.
    ExactThenPattern,
}

#[derive(Debug, Clone)]
pub struct RoleRule {
    pub role: Role,
    pub synonyms: Vec<&'static str>,
    pub required: bool,
}

/// Outcome of a failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaMismatch {
    pub missing: Vec<String>,
    pub available: Vec<String>,
}

/// Role → original column label for one source table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    entries: Vec<(Role, String)>,
}

impl ColumnMap {
    pub fn get(&self, role: Role) -> Option<&str> {
        self.entries
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, label)| label.as_str())
    }

    /// Labels claimed by any role.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, label)| label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    rules: Vec<RoleRule>,
    policy: MatchPolicy,
}

impl ColumnSchema {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { rules: Vec::new(), policy }
    }

    pub fn required(mut self, role: Role, synonyms: &[&'static str]) -> Self {
        self.rules.push(RoleRule { role, synonyms: synonyms.to_vec(), required: true });
        self
    }

    pub fn optional(mut self, role: Role, synonyms: &[&'static str]) -> Self {
        self.rules.push(RoleRule { role, synonyms: synonyms.to_vec(), required: false });
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Resolve every rule against `columns`, in rule order.
    ///
    /// A column claimed by an earlier rule is never handed to a later one, so
    /// `Load` cannot also be picked up as the `Total` of the same table.
    pub fn resolve<S: AsRef<str>>(&self, columns: &[S]) -> Result<ColumnMap, SchemaMismatch> {
        let mut claimed: HashSet<usize> = HashSet::new();
        let mut map = ColumnMap::default();
        let mut missing = Vec::new();

        for rule in &self.rules {
            match match_index(columns, &rule.synonyms, self.policy, &claimed) {
                Some(idx) => {
                    claimed.insert(idx);
                    map.entries.push((rule.role, columns[idx].as_ref().to_string()));
                }
                None if rule.required => missing.push(rule.role.name().to_string()),
                None => {}
            }
        }

        if missing.is_empty() {
            Ok(map)
        } else {
            Err(SchemaMismatch {
                missing,
                available: columns.iter().map(|c| c.as_ref().to_string()).collect(),
            })
        }
    }
}

/// Lower-cased, trimmed form used for every comparison.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Find the first column answering to any of `keywords` under `policy`.
pub fn find_column<S: AsRef<str>>(
    columns: &[S],
    keywords: &[&str],
    policy: MatchPolicy,
) -> Option<String> {
    match_index(columns, keywords, policy, &HashSet::new()).map(|idx| columns[idx].as_ref().to_string())
}

fn match_index<S: AsRef<str>>(
    columns: &[S],
    synonyms: &[&str],
    policy: MatchPolicy,
    claimed: &HashSet<usize>,
) -> Option<usize> {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_label(c.as_ref())).collect();

    for synonym in synonyms {
        let wanted = normalize_label(synonym);
        if let Some(idx) = normalized
            .iter()
            .enumerate()
            .position(|(i, label)| !claimed.contains(&i) && *label == wanted)
        {
            return Some(idx);
        }
    }

    if policy == MatchPolicy::Exact {
        return None;
    }

    for synonym in synonyms {
        let Some(pattern) = suffix_pattern(synonym) else {
            continue;
        };
        if let Some(idx) = normalized
            .iter()
            .enumerate()
            .position(|(i, label)| !claimed.contains(&i) && pattern.is_match(label))
        {
            return Some(idx);
        }
    }

    None
}

fn suffix_pattern(keyword: &str) -> Option<Regex> {
    let escaped = regex::escape(&normalize_label(keyword));
    Regex::new(&format!(r"(?i)^{escaped}(_?\w+)?$")).ok()
}
