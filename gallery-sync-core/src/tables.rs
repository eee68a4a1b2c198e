//! Fixed lookup tables translating source-site metadata into destination codes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::contract::Rating;
use crate::error::{Result, SyncError};

/// Destination folder id meaning "no folder".
pub const ROOT_FOLDER_ID: i64 = 0;

/// Non-static source page fetches allowed per minute.
pub const SOURCE_PAGE_REQUESTS_PER_MINUTE: u32 = 15;

/// Default acceptance threshold for thresholded title matching.
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.7;

/// Normalised content type; decides which bucket a submission is matched in
/// and which destination endpoint it is uploaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Visual,
    Literary,
    Multimedia,
}

impl ContentType {
    pub const ALL: [ContentType; 3] = [
        ContentType::Visual,
        ContentType::Literary,
        ContentType::Multimedia,
    ];

    /// Map a site's type name onto a content type.
    ///
    /// Source names (image, text, audio, flash) and the normalised names
    /// themselves are accepted, case-insensitively.
    pub fn from_kind(kind: &str) -> Result<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "image" | "visual" => Ok(ContentType::Visual),
            "text" | "literary" => Ok(ContentType::Literary),
            "audio" | "flash" | "multimedia" => Ok(ContentType::Multimedia),
            _ => Err(SyncError::UnknownContentType(kind.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Visual => "visual",
            ContentType::Literary => "literary",
            ContentType::Multimedia => "multimedia",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn rating_code(rating: Rating) -> u32 {
    match rating {
        Rating::General => 10,
        Rating::Mature => 30,
        Rating::Adult => 40,
    }
}

const CATEGORY_CODES: &[(&str, u32)] = &[
    // visual
    ("Artwork (Digital)", 1030),
    ("Artwork (Traditional)", 1020),
    ("Cellshading", 1030),
    ("Crafting", 1075),
    ("Designs", 1060),
    ("Fursuiting", 1078),
    ("Icons", 1060),
    ("Mosaics", 1075),
    ("Photography", 1050),
    ("Sculpting", 1070),
    ("Desktops", 1080),
    ("Wallpaper", 1080),
    ("Screenshots", 1999),
    ("Sketch", 1010),
    ("Animation", 1040),
    ("Flash", 1040),
    ("Adoptables", 1999),
    ("Auctions", 1999),
    ("Contests", 1999),
    ("Current Events", 1999),
    ("Stockart", 1999),
    ("YCH / Sale", 1999),
    ("Skins", 1060),
    ("Handhelds", 1999),
    ("Resources", 1999),
    // literary
    ("Story", 2010),
    ("Prose", 2010),
    ("Poetry", 2020),
    ("Script", 2030),
    // multimedia
    ("Music", 3010),
    ("Podcasts", 3040),
    ("Reading", 3040),
];

/// Destination category code for a source category name.
///
/// "Other" resolves to the catch-all code of the submission's content type.
pub fn category_code(category: &str, content_type: ContentType) -> Result<u32> {
    let wanted = category.trim();
    if wanted.eq_ignore_ascii_case("other") {
        return Ok(match content_type {
            ContentType::Visual => 1999,
            ContentType::Literary => 2999,
            ContentType::Multimedia => 3999,
        });
    }
    CATEGORY_CODES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
        .map(|(_, code)| *code)
        .ok_or_else(|| SyncError::UnmappedCategory(category.to_string()))
}

/// Like [`category_code`], but an absent or unmapped category yields `None`.
pub fn category_code_or_none(category: Option<&str>, content_type: ContentType) -> Option<u32> {
    let category = category?;
    match category_code(category, content_type) {
        Ok(code) => Some(code),
        Err(e) => {
            warn!(error = %e, "Uploading without a category");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_source_kind_lands_in_exactly_one_bucket() {
        let cases = [
            ("image", ContentType::Visual),
            ("text", ContentType::Literary),
            ("audio", ContentType::Multimedia),
            ("flash", ContentType::Multimedia),
            ("Visual", ContentType::Visual),
        ];
        for (kind, expected) in cases {
            assert_eq!(ContentType::from_kind(kind).unwrap(), expected, "{kind}");
        }
        assert!(matches!(
            ContentType::from_kind("sculpture"),
            Err(SyncError::UnknownContentType(k)) if k == "sculpture"
        ));
    }

    #[test]
    fn category_lookup_ignores_case_and_reports_misses() {
        let visual = ContentType::Visual;
        assert_eq!(category_code("story", ContentType::Literary).unwrap(), 2010);
        assert_eq!(category_code(" Artwork (Digital) ", visual).unwrap(), 1030);
        assert!(matches!(
            category_code("Knitting Patterns", visual),
            Err(SyncError::UnmappedCategory(_))
        ));
        assert_eq!(category_code_or_none(Some("Knitting Patterns"), visual), None);
        assert_eq!(category_code_or_none(None, visual), None);
        assert_eq!(
            category_code_or_none(Some("Music"), ContentType::Multimedia),
            Some(3010)
        );
    }

    #[test]
    fn other_follows_the_content_type() {
        assert_eq!(category_code("Other", ContentType::Visual).unwrap(), 1999);
        assert_eq!(category_code("other", ContentType::Literary).unwrap(), 2999);
        assert_eq!(category_code("Other", ContentType::Multimedia).unwrap(), 3999);
    }

    #[test]
    fn rating_codes_match_destination() {
        assert_eq!(rating_code(Rating::General), 10);
        assert_eq!(rating_code(Rating::Mature), 30);
        assert_eq!(rating_code(Rating::Adult), 40);
    }
}
