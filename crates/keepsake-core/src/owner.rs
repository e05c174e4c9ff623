//! Owner kinds and their attachment descriptors.
//!
//! Every record kind that can carry attachments is described by one static
//! [`OwnerKindSpec`]: where its blobs live, which attachment slots it has,
//! and how many gallery attachments it may hold. The coordinator is generic
//! over this table: adding an owner kind is one table row, not a new
//! service.

use serde::{Deserialize, Serialize};

/// A record kind that can own attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Album,
    Inquiry,
    Solution,
    Notice,
    User,
    Couple,
}

/// Gallery slot shape: slot name used in blob keys plus the maximum number
/// of gallery attachments the owner may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GallerySpec {
    /// Key segment for gallery blobs, e.g. `images`.
    pub slot: &'static str,
    /// Maximum number of committed gallery attachments per owner.
    pub cap: u32,
}

/// Static descriptor for one owner kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerKindSpec {
    pub kind: OwnerKind,
    /// First blob-key segment, e.g. `albums`.
    pub key_prefix: &'static str,
    /// Route segment for the resource locator handed to the HTTP layer.
    pub route: &'static str,
    /// Key segment for the zero-or-one primary attachment, when the kind
    /// has one (thumbnail/cover/profile).
    pub primary_slot: Option<&'static str>,
    /// Gallery shape, when the kind has a gallery.
    pub gallery: Option<GallerySpec>,
}

const ALBUM: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::Album,
    key_prefix: "albums",
    route: "albums",
    primary_slot: Some("cover"),
    gallery: Some(GallerySpec {
        slot: "images",
        cap: 30,
    }),
};

const INQUIRY: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::Inquiry,
    key_prefix: "inquiries",
    route: "inquiries",
    primary_slot: None,
    gallery: Some(GallerySpec {
        slot: "images",
        cap: 5,
    }),
};

const SOLUTION: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::Solution,
    key_prefix: "solutions",
    route: "solutions",
    primary_slot: None,
    gallery: Some(GallerySpec {
        slot: "images",
        cap: 5,
    }),
};

const NOTICE: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::Notice,
    key_prefix: "notices",
    route: "notices",
    primary_slot: None,
    gallery: Some(GallerySpec {
        slot: "images",
        cap: 10,
    }),
};

const USER: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::User,
    key_prefix: "users",
    route: "users",
    primary_slot: Some("thumbnail"),
    gallery: None,
};

const COUPLE: OwnerKindSpec = OwnerKindSpec {
    kind: OwnerKind::Couple,
    key_prefix: "couples",
    route: "couples",
    primary_slot: Some("thumbnail"),
    gallery: None,
};

impl OwnerKind {
    /// All owner kinds, in descriptor-table order.
    pub const ALL: [OwnerKind; 6] = [
        OwnerKind::Album,
        OwnerKind::Inquiry,
        OwnerKind::Solution,
        OwnerKind::Notice,
        OwnerKind::User,
        OwnerKind::Couple,
    ];

    /// Resolve the static descriptor for this kind.
    pub fn spec(self) -> &'static OwnerKindSpec {
        match self {
            OwnerKind::Album => &ALBUM,
            OwnerKind::Inquiry => &INQUIRY,
            OwnerKind::Solution => &SOLUTION,
            OwnerKind::Notice => &NOTICE,
            OwnerKind::User => &USER,
            OwnerKind::Couple => &COUPLE,
        }
    }

    /// Stable lowercase name, used in the database `kind` column and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerKind::Album => "album",
            OwnerKind::Inquiry => "inquiry",
            OwnerKind::Solution => "solution",
            OwnerKind::Notice => "notice",
            OwnerKind::User => "user",
            OwnerKind::Couple => "couple",
        }
    }

    /// Parse the stable name back into a kind.
    pub fn parse(s: &str) -> Option<OwnerKind> {
        match s {
            "album" => Some(OwnerKind::Album),
            "inquiry" => Some(OwnerKind::Inquiry),
            "solution" => Some(OwnerKind::Solution),
            "notice" => Some(OwnerKind::Notice),
            "user" => Some(OwnerKind::User),
            "couple" => Some(OwnerKind::Couple),
            _ => None,
        }
    }

    /// True when the kind has a primary attachment slot.
    pub fn has_primary(self) -> bool {
        self.spec().primary_slot.is_some()
    }

    /// Gallery shape, when the kind has one.
    pub fn gallery(self) -> Option<GallerySpec> {
        self.spec().gallery
    }
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_table_covers_all_kinds() {
        for kind in OwnerKind::ALL {
            let spec = kind.spec();
            assert_eq!(spec.kind, kind);
            assert!(!spec.key_prefix.is_empty());
            assert!(!spec.route.is_empty());
        }
    }

    #[test]
    fn test_every_kind_has_at_least_one_slot() {
        for kind in OwnerKind::ALL {
            let spec = kind.spec();
            assert!(
                spec.primary_slot.is_some() || spec.gallery.is_some(),
                "{} has no attachment slot",
                kind
            );
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for kind in OwnerKind::ALL {
            assert_eq!(OwnerKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(OwnerKind::parse("unknown"), None);
    }

    #[test]
    fn test_thumbnail_kinds_have_no_gallery() {
        assert!(OwnerKind::User.gallery().is_none());
        assert!(OwnerKind::Couple.gallery().is_none());
        assert!(OwnerKind::User.has_primary());
        assert!(OwnerKind::Couple.has_primary());
    }

    #[test]
    fn test_inquiry_gallery_cap() {
        let gallery = OwnerKind::Inquiry.gallery().unwrap();
        assert_eq!(gallery.slot, "images");
        assert_eq!(gallery.cap, 5);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&OwnerKind::Album).unwrap();
        assert_eq!(json, "\"album\"");
        let back: OwnerKind = serde_json::from_str("\"couple\"").unwrap();
        assert_eq!(back, OwnerKind::Couple);
    }
}
