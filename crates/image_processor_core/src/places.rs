use std::collections::BTreeSet;

use percent_encoding::percent_decode_str;

use crate::media::{file_name, join_key, parent_folder, split_extension};

const THUMBNAIL_FOLDER: &str = "thumbnail";
const STAGING_PREFIX: &str = ".renumber-";

/// One object move, executed as copy then delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameStep {
    pub from: String,
    pub to: String,
}

/// Place values are stored form-encoded (`+` for spaces, `%XX` escapes).
pub fn decode_place(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

pub fn is_thumbnail_folder(folder: &str) -> bool {
    folder
        .trim_matches('/')
        .rsplit('/')
        .next()
        .is_some_and(|segment| segment.eq_ignore_ascii_case(THUMBNAIL_FOLDER))
}

/// Folders whose JPEGs get renumbered after a run. The bucket root and
/// thumbnail folders are never renumbered.
pub fn folders_to_renumber(places: &[String]) -> Vec<String> {
    places
        .iter()
        .map(|place| parent_folder(place))
        .filter(|folder| !folder.trim_matches('/').is_empty())
        .filter(|folder| !is_thumbnail_folder(folder))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Top-level folder names touched by a run; these match catalog entry names.
pub fn catalog_folders(places: &[String]) -> BTreeSet<String> {
    places
        .iter()
        .filter_map(|place| parent_folder(place).split('/').next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_jpg_key(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with(".jpg")
}

/// Renames the JPEGs directly inside `folder` to `1.jpg`, `2.jpg`, ... in
/// sorted key order, keeping each file's extension spelling.
///
/// When a target name is still held by an object that has yet to move, every
/// changing object is first parked under a staging name so nothing is
/// overwritten before it has been copied away.
pub fn plan_folder_renumbering(folder: &str, keys: &[String]) -> Vec<RenameStep> {
    let folder = folder.trim_end_matches('/');
    let mut candidates: Vec<&str> = keys
        .iter()
        .map(String::as_str)
        .filter(|key| parent_folder(key) == folder && is_jpg_key(key))
        .collect();
    candidates.sort_unstable();
    candidates.dedup();

    let moves: Vec<(&str, String, &str)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(index, key)| {
            let (_, extension) = split_extension(file_name(*key));
            let target = join_key(folder, &format!("{}{extension}", index + 1));
            (target != *key).then_some((*key, target, extension))
        })
        .collect();

    let sources: BTreeSet<&str> = moves.iter().map(|(source, _, _)| *source).collect();
    let collides = moves
        .iter()
        .any(|(_, target, _)| sources.contains(target.as_str()));

    if !collides {
        return moves
            .into_iter()
            .map(|(source, target, _)| RenameStep {
                from: source.to_string(),
                to: target,
            })
            .collect();
    }

    // Staging names must not land on any listed key or final target, which
    // also covers objects left staged by an interrupted earlier run.
    let mut taken: BTreeSet<String> = keys.iter().cloned().collect();
    taken.extend(moves.iter().map(|(_, target, _)| target.clone()));
    let mut next_stage = 0usize;
    let mut staged: Vec<String> = Vec::with_capacity(moves.len());
    for (_, _, extension) in &moves {
        let stage = loop {
            let candidate = join_key(folder, &format!("{STAGING_PREFIX}{next_stage}{extension}"));
            next_stage += 1;
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(stage.clone());
        staged.push(stage);
    }

    let mut steps = Vec::with_capacity(moves.len() * 2);
    for ((source, _, _), stage) in moves.iter().zip(&staged) {
        steps.push(RenameStep {
            from: source.to_string(),
            to: stage.clone(),
        });
    }
    for ((_, target, _), stage) in moves.iter().zip(staged) {
        steps.push(RenameStep {
            from: stage,
            to: target.clone(),
        });
    }
    steps
}
