//! # Triple grouping
//!
//! Assembles raw file names into ordered frame triples, either positionally
//! (stride-3 windows over the sorted listing) or by a shared
//! `<prefix>_<1|2|3>` naming pattern. Both modes fail soft per group: one
//! incomplete group never blocks the others.

use crate::error::{Error, Result};
use log::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

static ORDINAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)_([123])\.(?i:jpe?g|png)$").expect("valid pattern"));

/// Grouping strategy for a directory listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub enum GroupingMode {
    /// Sorted listing sliced into consecutive non-overlapping windows of 3.
    Positional,
    /// `<prefix>_<1|2|3>.<ext>` groups with a dense ordinal presence check.
    Pattern,
}

impl FromStr for GroupingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "positional" => Ok(Self::Positional),
            "pattern" => Ok(Self::Pattern),
            other => Err(Error::Config(format!("unknown grouping mode `{other}`"))),
        }
    }
}

/// A grouped triple of input paths, earliest first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TripleGroup {
    pub key: String,
    pub paths: [PathBuf; 3],
}

/// A pattern group that was not emitted because ordinals were missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedGroup {
    pub key: String,
    pub missing: Vec<u8>,
}

/// Check whether a file name carries an accepted image extension.
pub fn is_image_file(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".jpg") || lower.ends_with(".jpeg") || lower.ends_with(".png")
}

/// Group image file names of one directory into frame triples.
///
/// Returns the emitted groups along with pattern groups skipped for missing
/// ordinals. Positional leftovers that do not fill a window of three are
/// dropped.
///
/// # Arguments
///
/// * `dir` - directory the names belong to; joined into the group paths.
/// * `names` - file names to group; non-image names are ignored.
/// * `mode` - grouping strategy.
pub fn group_files(
    dir: &Path,
    names: &[String],
    mode: GroupingMode,
) -> (Vec<TripleGroup>, Vec<SkippedGroup>) {
    match mode {
        GroupingMode::Positional => (group_positional(dir, names), vec![]),
        GroupingMode::Pattern => group_pattern(dir, names),
    }
}

fn group_positional(dir: &Path, names: &[String]) -> Vec<TripleGroup> {
    let mut sorted: Vec<&String> = names.iter().filter(|n| is_image_file(n)).collect();
    sorted.sort();

    let leftover = sorted.len() % 3;
    if leftover != 0 {
        debug!(
            "dropping {} trailing file(s) in {}",
            leftover,
            dir.display()
        );
    }

    sorted
        .chunks_exact(3)
        .map(|window| TripleGroup {
            key: stem(window[1]).into(),
            paths: [
                dir.join(window[0].as_str()),
                dir.join(window[1].as_str()),
                dir.join(window[2].as_str()),
            ],
        })
        .collect()
}

fn group_pattern(dir: &Path, names: &[String]) -> (Vec<TripleGroup>, Vec<SkippedGroup>) {
    // BTreeMap keeps group emission order deterministic.
    let mut groups: BTreeMap<String, [Option<String>; 3]> = BTreeMap::new();

    for name in names.iter().filter(|n| is_image_file(n)) {
        if let Some(caps) = ORDINAL_PATTERN.captures(name) {
            let prefix = caps[1].to_string();
            let ordinal: usize = caps[2].parse().expect("single digit ordinal");
            groups.entry(prefix).or_default()[ordinal - 1] = Some(name.clone());
        }
    }

    let mut emitted = vec![];
    let mut skipped = vec![];

    for (key, slots) in groups {
        match slots {
            [Some(first), Some(second), Some(third)] => emitted.push(TripleGroup {
                paths: [dir.join(first), dir.join(second), dir.join(third)],
                key,
            }),
            _ => {
                let missing = slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.is_none())
                    .map(|(i, _)| i as u8 + 1)
                    .collect();
                skipped.push(SkippedGroup { key, missing });
            }
        }
    }

    (emitted, skipped)
}

fn stem(name: &str) -> &str {
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pattern_mode_requires_all_ordinals() {
        let names = names(&["A_1.jpg", "A_2.jpg", "A_3.jpg", "B_1.jpg", "B_2.jpg"]);
        let (groups, skipped) = group_files(Path::new("in"), &names, GroupingMode::Pattern);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "A");
        assert_eq!(groups[0].paths[2], Path::new("in").join("A_3.jpg"));

        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].key, "B");
        assert_eq!(skipped[0].missing, vec![3]);
    }

    #[test]
    fn pattern_mode_ignores_non_matching_names() {
        let names = names(&["C_1.jpg", "C_2.jpg", "C_3.jpg", "notes.txt", "C.jpg"]);
        let (groups, skipped) = group_files(Path::new("in"), &names, GroupingMode::Pattern);

        assert_eq!(groups.len(), 1);
        assert!(skipped.is_empty());
    }

    #[test]
    fn positional_mode_slices_sorted_listing() {
        // Deliberately unsorted input.
        let names = names(&[
            "f004.jpg", "f001.jpg", "f006.jpg", "f002.jpg", "f003.jpg", "f005.jpg",
        ]);
        let (groups, skipped) = group_files(Path::new("in"), &names, GroupingMode::Positional);

        assert!(skipped.is_empty());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, "f002");
        assert_eq!(groups[0].paths[0], Path::new("in").join("f001.jpg"));
        assert_eq!(groups[1].paths[2], Path::new("in").join("f006.jpg"));
    }

    #[test]
    fn positional_mode_drops_leftovers() {
        let names = names(&["a.jpg", "b.jpg", "c.jpg", "d.jpg", "e.jpg"]);
        let (groups, _) = group_files(Path::new("in"), &names, GroupingMode::Positional);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, "b");
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        assert!(is_image_file("IMG_0001.JPG"));
        assert!(is_image_file("shot.Jpeg"));
        assert!(is_image_file("shot.PNG"));
        assert!(!is_image_file("shot.tiff"));
        assert!(!is_image_file("notes.txt"));

        let names = names(&["A_1.JPG", "A_2.jpg", "A_3.PNG"]);
        let (groups, _) = group_files(Path::new("in"), &names, GroupingMode::Pattern);
        assert_eq!(groups.len(), 1);
    }
}
