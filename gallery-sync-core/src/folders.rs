//! # folders: cross-site folder reconciliation
//!
//! Builds the folder mapping between the two sites (roots plus one level of
//! children), works out which source folders have no destination counterpart,
//! and recreates those on the destination without flattening the hierarchy:
//! a missing child of an already-mapped root is created under that root's
//! destination counterpart rather than as a new root.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::contract::{DestinationSite, Folder, FolderId};
use crate::error::Result;
use crate::matcher::{match_objects, Match, MatchPolicy};

/// A source folder paired with its destination counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderMatch {
    pub source: Folder,
    pub destination: Folder,
    pub score: f64,
}

impl FolderMatch {
    /// Pairing for a folder this run created, or one assigned by hand.
    pub fn exact(source: Folder, destination: Folder) -> Self {
        Self {
            source,
            destination,
            score: 1.0,
        }
    }

    fn from_search(found: Match<&Folder, &Folder>) -> Self {
        // Searches run destination -> source.
        Self {
            source: found.candidate.clone(),
            destination: found.subject.clone(),
            score: found.score,
        }
    }
}

fn title(folder: &Folder) -> &str {
    &folder.title
}

/// Destination counterpart of a source folder, if it has one.
pub fn destination_for(mapping: &[FolderMatch], source_id: FolderId) -> Option<&Folder> {
    mapping
        .iter()
        .find(|m| m.source.id == source_id)
        .map(|m| &m.destination)
}

/// Pair destination folders with source folders by title.
///
/// Roots are matched first; each matched root pair is followed by the
/// matches among that pair's immediate children.
pub fn map_folders(
    source: &[Folder],
    destination: &[Folder],
    policy: MatchPolicy,
) -> Vec<FolderMatch> {
    let mut mapping = Vec::new();
    for root in match_objects(destination, title, source, title, policy) {
        let (dest_children, source_children) = (&root.subject.children, &root.candidate.children);
        mapping.push(FolderMatch::from_search(root));
        mapping.extend(
            match_objects(dest_children, title, source_children, title, policy)
                .into_iter()
                .map(FolderMatch::from_search),
        );
    }
    debug!(pairs = mapping.len(), "Mapped folders");
    mapping
}

/// Source roots and their direct children that appear in no mapping entry.
pub fn unmapped_folders(source: &[Folder], mapping: &[FolderMatch]) -> Vec<Folder> {
    let mapped: HashSet<FolderId> = mapping.iter().map(|m| m.source.id).collect();
    source
        .iter()
        .flat_map(|root| std::iter::once(root).chain(root.children.iter()))
        .filter(|folder| !mapped.contains(&folder.id))
        .cloned()
        .collect()
}

/// Create every unmapped, non-excluded source folder on the destination.
///
/// Returns a pairing for each folder created so the caller can extend its
/// mapping. Folders created before a failure are left in place.
pub async fn create_missing_folders<D>(
    destination: &D,
    source: &[Folder],
    mapping: &[FolderMatch],
    unmapped: &[Folder],
    exclude: &HashSet<FolderId>,
) -> Result<Vec<FolderMatch>>
where
    D: DestinationSite + ?Sized,
{
    let missing: HashSet<FolderId> = unmapped.iter().map(|f| f.id).collect();
    let mut created = Vec::new();

    for root in source {
        let parent_id = if missing.contains(&root.id) {
            if exclude.contains(&root.id) {
                info!(folder_id = root.id, title = %root.title, "Skipping excluded folder and its children");
                continue;
            }
            let folder = create_one(destination, root, None).await?;
            let id = folder.id;
            created.push(FolderMatch::exact(root.clone(), folder));
            id
        } else {
            match destination_for(mapping, root.id) {
                Some(parent) => parent.id,
                None => {
                    warn!(
                        folder_id = root.id,
                        title = %root.title,
                        "Folder is neither mapped nor missing; leaving its children alone"
                    );
                    continue;
                }
            }
        };

        for child in &root.children {
            if !missing.contains(&child.id) || exclude.contains(&child.id) {
                continue;
            }
            let folder = create_one(destination, child, Some(parent_id)).await?;
            created.push(FolderMatch::exact(child.clone(), folder));
        }
    }

    info!(created = created.len(), "Created missing folders");
    Ok(created)
}

async fn create_one<D>(destination: &D, folder: &Folder, parent_id: Option<FolderId>) -> Result<Folder>
where
    D: DestinationSite + ?Sized,
{
    match destination.create_folder(&folder.title, parent_id).await {
        Ok(made) => {
            info!(
                source_id = folder.id,
                destination_id = made.id,
                parent_id = ?parent_id,
                title = %folder.title,
                "Created folder"
            );
            Ok(made)
        }
        Err(e) => {
            error!(error = ?e, source_id = folder.id, title = %folder.title, "Failed to create folder");
            Err(e)
        }
    }
}
