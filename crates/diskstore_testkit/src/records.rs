//! Sample record types shared by tests.

use diskstore_core::impl_record;

/// Two integer coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Horizontal coordinate.
    pub x: i64,
    /// Vertical coordinate.
    pub y: i64,
}

impl_record!(Point { x: i64, y: i64 });

/// [`Point`] with two trailing fields added later.
///
/// Open it on the `Point` table to exercise column migration.
#[derive(Debug, Clone, PartialEq)]
pub struct PointV2 {
    /// Horizontal coordinate.
    pub x: i64,
    /// Vertical coordinate.
    pub y: i64,
    /// Display label, `"none"` for migrated rows.
    pub label: String,
    /// Weight, `1.0` for migrated rows.
    pub weight: f64,
}

impl_record!(PointV2 {
    x: i64,
    y: i64,
    label: String = "none",
    weight: f64 = 1.0,
});

/// A text title with a binary body.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Title text.
    pub title: String,
    /// Raw content.
    pub body: Vec<u8>,
}

impl_record!(Note { title: String, body: Vec<u8> });

/// A cache entry with an expiry timestamp, as an expiring cache would
/// store it.
#[derive(Debug, Clone, PartialEq)]
pub struct Expiring {
    /// Cached payload.
    pub data: Vec<u8>,
    /// Unix time after which the entry is stale.
    pub expires_at: f64,
}

impl_record!(Expiring { data: Vec<u8>, expires_at: f64 });
