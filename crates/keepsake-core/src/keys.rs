//! Blob key construction and parsing.
//!
//! Every attachment blob lives at a key of the form
//! `{prefix}/{owner_id}/{slot}/{stamp}.{ext}` where `stamp` is a UUIDv7.
//! The UUIDv7 segment embeds a millisecond timestamp (RFC 9562) plus
//! entropy, so keys are time-ordered per slot and stay unique even when a
//! batch lands inside one millisecond. The `{prefix}/{owner_id}/` prefix is
//! what owner deletion sweeps with `delete_prefix`.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::owner::OwnerKind;

/// Generate a new UUIDv7 identifier (time-ordered).
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Build the blob key for one attachment.
///
/// `slot` must be one of the owner kind's descriptor slots; callers resolve
/// it through [`OwnerKindSpec`](crate::owner::OwnerKindSpec) rather than
/// passing free-form strings.
pub fn blob_key(kind: OwnerKind, owner_id: Uuid, slot: &str, ext: &str) -> String {
    format!(
        "{}/{}/{}/{}.{}",
        kind.spec().key_prefix,
        owner_id.as_hyphenated(),
        slot,
        new_v7().as_hyphenated(),
        ext
    )
}

/// Key prefix covering every blob an owner can reference.
pub fn owner_prefix(kind: OwnerKind, owner_id: Uuid) -> String {
    format!(
        "{}/{}/",
        kind.spec().key_prefix,
        owner_id.as_hyphenated()
    )
}

/// Components of a well-formed blob key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub kind: OwnerKind,
    pub owner_id: Uuid,
    pub slot: String,
    /// UUIDv7 stamp segment.
    pub stamp: Uuid,
    pub ext: String,
}

impl ParsedKey {
    /// Creation time embedded in the stamp segment.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        stamp_timestamp(&self.stamp)
    }
}

/// Parse a blob key back into its components.
///
/// Returns `None` for keys that do not match the
/// `{prefix}/{owner_id}/{slot}/{stamp}.{ext}` shape, e.g. foreign objects
/// found during an out-of-band reconciliation sweep.
pub fn parse_blob_key(key: &str) -> Option<ParsedKey> {
    let mut segments = key.split('/');
    let prefix = segments.next()?;
    let owner_id = Uuid::parse_str(segments.next()?).ok()?;
    let slot = segments.next()?;
    let file = segments.next()?;
    if segments.next().is_some() {
        return None;
    }

    let kind = OwnerKind::ALL
        .into_iter()
        .find(|k| k.spec().key_prefix == prefix)?;

    let (stamp, ext) = file.rsplit_once('.')?;
    let stamp = Uuid::parse_str(stamp).ok()?;
    if stamp.get_version_num() != 7 || ext.is_empty() {
        return None;
    }

    Some(ParsedKey {
        kind,
        owner_id,
        slot: slot.to_string(),
        stamp,
        ext: ext.to_string(),
    })
}

/// Extract the millisecond timestamp embedded in a UUIDv7 stamp.
///
/// Returns `None` if the UUID is not version 7.
pub fn stamp_timestamp(stamp: &Uuid) -> Option<DateTime<Utc>> {
    let bytes = stamp.as_bytes();
    if (bytes[6] >> 4) != 7 {
        return None;
    }

    // First 48 bits are milliseconds since the Unix epoch
    let millis = ((bytes[0] as u64) << 40)
        | ((bytes[1] as u64) << 32)
        | ((bytes[2] as u64) << 24)
        | ((bytes[3] as u64) << 16)
        | ((bytes[4] as u64) << 8)
        | (bytes[5] as u64);

    Utc.timestamp_millis_opt(millis as i64).single()
}
