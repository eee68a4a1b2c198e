//! Cross-site submission reconciliation and the folder-association heuristic
//! for submissions that still have to be uploaded.

use std::collections::HashSet;

use tracing::debug;

use crate::contract::{Folder, Submission, SubmissionId};
use crate::error::Result;
use crate::folders::{destination_for, FolderMatch};
use crate::matcher::{match_objects, MatchPolicy};
use crate::tables::ContentType;

/// A source submission paired with its destination counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionMatch {
    pub source: Submission,
    pub destination: Submission,
    pub score: f64,
}

/// An unmapped submission and the destination folder it should be filed in.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderAssociation {
    pub submission: Submission,
    pub folder: Folder,
}

fn title(submission: &Submission) -> &str {
    &submission.title
}

/// Split submissions into one bucket per content type, preserving order.
///
/// Fails on the first submission whose kind is not in the type table.
pub fn partition_by_type(submissions: &[Submission]) -> Result<[Vec<Submission>; 3]> {
    let mut buckets: [Vec<Submission>; 3] = Default::default();
    for submission in submissions {
        let slot = match submission.content_type()? {
            ContentType::Visual => 0,
            ContentType::Literary => 1,
            ContentType::Multimedia => 2,
        };
        buckets[slot].push(submission.clone());
    }
    Ok(buckets)
}

/// Pair destination submissions with source submissions by title, within
/// each content type.
pub fn map_submissions(
    source: &[Submission],
    destination: &[Submission],
    policy: MatchPolicy,
) -> Result<Vec<SubmissionMatch>> {
    let source_buckets = partition_by_type(source)?;
    let dest_buckets = partition_by_type(destination)?;

    let mut mapping = Vec::new();
    for (content_type, (src, dst)) in ContentType::ALL
        .iter()
        .zip(source_buckets.iter().zip(dest_buckets.iter()))
    {
        let before = mapping.len();
        mapping.extend(
            match_objects(dst, title, src, title, policy)
                .into_iter()
                .map(|m| SubmissionMatch {
                    source: m.candidate.clone(),
                    destination: m.subject.clone(),
                    score: m.score,
                }),
        );
        debug!(
            content_type = %content_type,
            source = src.len(),
            destination = dst.len(),
            pairs = mapping.len() - before,
            "Mapped submissions"
        );
    }
    Ok(mapping)
}

/// Source submissions that appear in no mapping entry, in source order.
pub fn unmapped_submissions(source: &[Submission], mapping: &[SubmissionMatch]) -> Vec<Submission> {
    let mapped: HashSet<SubmissionId> = mapping.iter().map(|m| m.source.id).collect();
    source
        .iter()
        .filter(|s| !mapped.contains(&s.id))
        .cloned()
        .collect()
}

/// The first source folder holding a submission, scanning each root before
/// its children.
pub fn containing_folder(folders: &[Folder], submission_id: SubmissionId) -> Option<&Folder> {
    folders.iter().find_map(|root| {
        if root.contains(submission_id) {
            Some(root)
        } else {
            root.children.iter().find(|c| c.contains(submission_id))
        }
    })
}

/// File each unmapped submission in the destination counterpart of the
/// source folder that holds it.
///
/// Submissions outside any folder, or whose folder has no counterpart, are
/// left out and end up in the destination's account root.
pub fn associate_submissions_with_folders(
    source_folders: &[Folder],
    unmapped: &[Submission],
    folder_mapping: &[FolderMatch],
) -> Vec<FolderAssociation> {
    unmapped
        .iter()
        .filter_map(|submission| {
            let holder = containing_folder(source_folders, submission.id)?;
            let target = destination_for(folder_mapping, holder.id)?;
            Some(FolderAssociation {
                submission: submission.clone(),
                folder: target.clone(),
            })
        })
        .collect()
}
