//! Image inventory consumed by the scanner and the per-image generator.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Modulus for the per-run shuffle. Prime, so `id * seed mod p` is a bijection.
pub const ORDER_MODULUS: u64 = 2_147_483_647;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageItem {
    pub id: i64,
    pub url: String,
    pub mime_type: String,
    pub title: String,
    pub caption: String,
    pub description: String,
    pub alt_text: String,
}

impl ImageItem {
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    #[must_use]
    pub fn has_alt_text(&self) -> bool {
        !self.alt_text.trim().is_empty()
    }
}

/// Fields for registering a new image.
#[derive(Debug, Clone, Default)]
pub struct NewImage {
    pub url: String,
    pub mime_type: String,
    pub title: String,
    pub caption: String,
    pub description: String,
    pub alt_text: String,
}

/// One page of images lacking alt text, in shuffled order.
#[derive(Debug, Clone, Copy)]
pub struct MissingAltQuery {
    /// Shuffle seed in `1..ORDER_MODULUS`, fixed for the whole run.
    pub seed: u64,
    /// Resume after this sort key (exclusive).
    pub after: Option<u64>,
    pub limit: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MissingAltPage {
    /// Images lacking alt text at query time, across all pages.
    pub total: usize,
    pub items: Vec<ImageItem>,
    /// Cursor for the next page, present when this page came back full.
    pub next: Option<u64>,
}

pub trait MediaLibrary: Send + Sync {
    /// Images of an `image/*` type whose alt text is empty.
    fn missing_alt_page(&self, query: MissingAltQuery) -> Result<MissingAltPage>;

    fn get_image(&self, id: i64) -> Result<Option<ImageItem>>;

    /// Returns false when the image does not exist.
    fn set_alt_text(&self, id: i64, alt_text: &str) -> Result<bool>;

    /// `(title, alt_text)` pairs for images that already carry alt text.
    fn example_alt_texts(&self, limit: usize) -> Result<Vec<(String, String)>>;
}

/// Position of `id` in the shuffled ordering for `seed`.
///
/// Keys are unique per seed for ids in `1..ORDER_MODULUS`, so they double as a
/// keyset cursor that stays stable while images drop out of the missing set.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn order_key(seed: u64, id: i64) -> u64 {
    let id = (id as u64) % ORDER_MODULUS;
    (id * (seed % ORDER_MODULUS)) % ORDER_MODULUS
}

/// Fresh shuffle seed for one scan run.
#[must_use]
pub fn random_seed() -> u64 {
    rand::random_range(1..ORDER_MODULUS)
}
