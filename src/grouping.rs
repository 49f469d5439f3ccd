use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{PairTags, ReadLayout, SampleFileName, UnitKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMembers {
    Single(String),
    /// Role slots in pair-tag order; a slot stays `None` when no file carried that tag.
    Paired {
        first: Option<String>,
        second: Option<String>,
    },
    Lanes(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingUnit {
    pub key: UnitKey,
    pub members: UnitMembers,
}

impl ProcessingUnit {
    pub fn files(&self) -> Vec<&str> {
        match &self.members {
            UnitMembers::Single(file) => vec![file.as_str()],
            UnitMembers::Paired { first, second } => [first, second]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect(),
            UnitMembers::Lanes(files) => files.iter().map(String::as_str).collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.members {
            UnitMembers::Single(_) => true,
            UnitMembers::Paired { first, second } => first.is_some() && second.is_some(),
            UnitMembers::Lanes(files) => !files.is_empty(),
        }
    }
}

/// Anomalies noticed while grouping. None of them stop the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupingReport {
    /// Files replaced by a later file with the same key and role.
    pub overwritten: Vec<String>,
    /// Files whose role tag matched neither pair tag.
    pub unmatched: Vec<String>,
    /// Paired units missing one of their two roles.
    pub incomplete: Vec<UnitKey>,
    pub malformed: Vec<String>,
}

impl GroupingReport {
    pub fn warning_count(&self) -> usize {
        self.overwritten.len() + self.unmatched.len() + self.incomplete.len() + self.malformed.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupedUnits {
    pub units: Vec<ProcessingUnit>,
    pub report: GroupingReport,
}

pub struct UnitGrouper<'a> {
    layout: &'a ReadLayout,
}

impl<'a> UnitGrouper<'a> {
    pub fn new(layout: &'a ReadLayout) -> Self {
        Self { layout }
    }

    /// Partitions `files` into units keyed by their first four name fields.
    /// Units come back in key order.
    pub fn group<S: AsRef<str>>(&self, files: &[S]) -> GroupedUnits {
        let mut report = GroupingReport::default();
        let mut units = BTreeMap::<UnitKey, UnitMembers>::new();

        for file in files {
            let file = file.as_ref();
            match self.layout {
                ReadLayout::Single => {
                    let Ok(key) = SampleFileName::key_only(file) else {
                        report.malformed.push(file.to_string());
                        continue;
                    };
                    let previous = units.insert(key, UnitMembers::Single(file.to_string()));
                    if let Some(UnitMembers::Single(previous)) = previous {
                        report.overwritten.push(previous);
                    }
                }
                ReadLayout::Paired(tags) => {
                    let Ok(parsed) = file.parse::<SampleFileName>() else {
                        report.malformed.push(file.to_string());
                        continue;
                    };
                    assign_role(&mut units, &mut report, tags, parsed);
                }
            }
        }

        report.incomplete = units
            .iter()
            .filter(|(_, members)| {
                matches!(
                    members,
                    UnitMembers::Paired { first, second } if first.is_none() || second.is_none()
                )
            })
            .map(|(key, _)| key.clone())
            .collect();

        GroupedUnits {
            units: units
                .into_iter()
                .map(|(key, members)| ProcessingUnit { key, members })
                .collect(),
            report,
        }
    }
}

fn assign_role(
    units: &mut BTreeMap<UnitKey, UnitMembers>,
    report: &mut GroupingReport,
    tags: &PairTags,
    parsed: SampleFileName,
) {
    let slots = units
        .entry(parsed.key)
        .or_insert(UnitMembers::Paired {
            first: None,
            second: None,
        });
    let UnitMembers::Paired { first, second } = slots else {
        return;
    };
    let slot = if parsed.role == tags.first {
        first
    } else if parsed.role == tags.second {
        second
    } else {
        report.unmatched.push(parsed.file_name);
        return;
    };
    if let Some(previous) = slot.replace(parsed.file_name) {
        report.overwritten.push(previous);
    }
}
