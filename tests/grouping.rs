use rnaseq_utilities::domain::{PairTags, ReadLayout, UnitKey};
use rnaseq_utilities::grouping::{UnitGrouper, UnitMembers};

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn paired_files_form_one_unit() {
    let layout = ReadLayout::Paired(PairTags::new("r_1", "r_2"));
    let grouped =
        UnitGrouper::new(&layout).group(&names(&["A.1.B.2.r_1.fq.gz", "A.1.B.2.r_2.fq.gz"]));

    assert_eq!(grouped.units.len(), 1);
    let unit = &grouped.units[0];
    assert_eq!(unit.key, UnitKey::new("A.1.B.2"));
    assert_eq!(
        unit.members,
        UnitMembers::Paired {
            first: Some("A.1.B.2.r_1.fq.gz".to_string()),
            second: Some("A.1.B.2.r_2.fq.gz".to_string()),
        }
    );
    assert!(unit.is_complete());
    assert_eq!(grouped.report.warning_count(), 0);
}

#[test]
fn single_duplicate_key_keeps_last_file() {
    let grouped = UnitGrouper::new(&ReadLayout::Single).group(&names(&["X.fq.gz", "X.fq.gz"]));

    assert_eq!(grouped.units.len(), 1);
    assert_eq!(grouped.units[0].key, UnitKey::new("X"));
    assert_eq!(grouped.report.overwritten, vec!["X.fq.gz"]);
}

#[test]
fn single_files_sharing_a_prefix_collapse() {
    let grouped = UnitGrouper::new(&ReadLayout::Single)
        .group(&names(&["S.1.F.4.r_1.fq.gz", "S.1.F.4.r_2.fq.gz", "S.2.F.4.r_1.fq.gz"]));

    let keys = grouped
        .units
        .iter()
        .map(|unit| unit.key.as_str())
        .collect::<Vec<_>>();
    assert_eq!(keys, vec!["S.1.F.4", "S.2.F.4"]);
    assert_eq!(
        grouped.units[0].members,
        UnitMembers::Single("S.1.F.4.r_2.fq.gz".to_string())
    );
    assert_eq!(grouped.report.overwritten, vec!["S.1.F.4.r_1.fq.gz"]);
}

#[test]
fn unmatched_role_is_reported_and_pair_left_incomplete() {
    let layout = ReadLayout::Paired(PairTags::new("r_1", "r_2"));
    let grouped = UnitGrouper::new(&layout)
        .group(&names(&["A.1.B.2.r_1.fq.gz", "A.1.B.2.r_3.fq.gz", "short.fq.gz"]));

    assert_eq!(grouped.units.len(), 1);
    assert_eq!(grouped.report.unmatched, vec!["A.1.B.2.r_3.fq.gz"]);
    assert_eq!(grouped.report.malformed, vec!["short.fq.gz"]);
    assert_eq!(grouped.report.incomplete, vec![UnitKey::new("A.1.B.2")]);
    assert!(!grouped.units[0].is_complete());
    assert_eq!(grouped.units[0].files(), vec!["A.1.B.2.r_1.fq.gz"]);
}

#[test]
fn paired_grouping_is_a_partition() {
    let layout = ReadLayout::Paired(PairTags::new("r_1", "r_2"));
    let files = names(&[
        "L1.i701.HX.s_1.r_1.fq.gz",
        "L1.i701.HX.s_1.r_2.fq.gz",
        "L1.i701.HX.s_1.r_1.extra.fq.gz",
        "L1.i702.HX.s_1.r_1.fq.gz",
        "L1.i702.HX.s_1.r_2.fq.gz",
        "L1.i701.HX.s_2.r_1.fq.gz",
        "L1.i701.HX.s_2.r_2.fq.gz",
        "L1.i703.HX.s_1.r_9.fq.gz",
        "L1.bad.fq.gz",
    ]);
    let grouped = UnitGrouper::new(&layout).group(&files);

    let mut seen = grouped
        .units
        .iter()
        .flat_map(|unit| unit.files())
        .map(str::to_string)
        .chain(grouped.report.unmatched.iter().cloned())
        .chain(grouped.report.malformed.iter().cloned())
        .chain(grouped.report.overwritten.iter().cloned())
        .collect::<Vec<_>>();
    seen.sort();
    let mut expected = files.clone();
    expected.sort();
    assert_eq!(seen, expected);

    for unit in &grouped.units {
        for file in unit.files() {
            assert!(file.starts_with(unit.key.as_str()));
        }
    }
}

#[test]
fn paired_duplicate_role_keeps_last_file() {
    let layout = ReadLayout::Paired(PairTags::new("r_1", "r_2"));
    let grouped = UnitGrouper::new(&layout).group(&names(&[
        "A.1.B.2.r_1.fq.gz",
        "A.1.B.2.r_1.extra.fq.gz",
        "A.1.B.2.r_2.fq.gz",
    ]));

    assert_eq!(grouped.units.len(), 1);
    assert_eq!(
        grouped.units[0].files(),
        vec!["A.1.B.2.r_1.extra.fq.gz", "A.1.B.2.r_2.fq.gz"]
    );
    assert_eq!(grouped.report.overwritten, vec!["A.1.B.2.r_1.fq.gz"]);
    assert_eq!(grouped.report.warning_count(), 1);
}
