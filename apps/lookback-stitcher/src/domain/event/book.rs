//! Fixed-Shape Book Levels
//!
//! Order book sides are carried as a fixed array of optional levels rather
//! than a dynamically sized list, so every event has the same flattened
//! shape (`bids_0_price`, `bids_0_amount`, ..., `asks_4_amount`).

use serde::{Deserialize, Serialize};

/// Maximum number of levels kept per book side.
pub const MAX_BOOK_LEVELS: usize = 5;

/// A single price level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Level price.
    pub price: f64,
    /// Size available at this price.
    pub amount: f64,
}

impl PriceLevel {
    /// Create a new price level.
    #[must_use]
    pub const fn new(price: f64, amount: f64) -> Self {
        Self { price, amount }
    }
}

/// Side of the book an array attribute belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookSide {
    /// Bid levels.
    Bids,
    /// Ask levels.
    Asks,
}

impl BookSide {
    /// Both sides in flattening order.
    pub const ALL: [Self; 2] = [Self::Bids, Self::Asks];

    /// Array attribute name used on the wire and in flattened keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bids => "bids",
            Self::Asks => "asks",
        }
    }
}

/// Scalar field of a price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelField {
    /// Level price.
    Price,
    /// Level amount.
    Amount,
}

impl LevelField {
    /// Both fields in flattening order.
    pub const ALL: [Self; 2] = [Self::Price, Self::Amount];

    /// Field name used in flattened keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Amount => "amount",
        }
    }

    /// Read this field from a level.
    #[must_use]
    pub const fn read(self, level: &PriceLevel) -> f64 {
        match self {
            Self::Price => level.price,
            Self::Amount => level.amount,
        }
    }
}

/// One slot of the flattened layout: `{side}_{index}_{field}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlatSlot {
    /// Book side.
    pub side: BookSide,
    /// Level index, 0 is top of book.
    pub index: usize,
    /// Level field.
    pub field: LevelField,
}

impl FlatSlot {
    /// Flattened attribute name, e.g. `bids_0_price`.
    #[must_use]
    pub fn key(&self) -> String {
        format!(
            "{}_{}_{}",
            self.side.as_str(),
            self.index,
            self.field.as_str()
        )
    }
}

/// Every flattened slot in canonical order: bids before asks, level by
/// level, price before amount.
pub fn flat_slots() -> impl Iterator<Item = FlatSlot> {
    BookSide::ALL.into_iter().flat_map(|side| {
        (0..MAX_BOOK_LEVELS).flat_map(move |index| {
            LevelField::ALL
                .into_iter()
                .map(move |field| FlatSlot { side, index, field })
        })
    })
}

/// Up to [`MAX_BOOK_LEVELS`] levels of one book side.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BookLevels {
    levels: [Option<PriceLevel>; MAX_BOOK_LEVELS],
}

impl BookLevels {
    /// Build from an ordered list of levels.
    ///
    /// Returns the levels and how many were dropped for exceeding
    /// [`MAX_BOOK_LEVELS`].
    #[must_use]
    pub fn from_levels(levels: impl IntoIterator<Item = PriceLevel>) -> (Self, usize) {
        let mut book = Self::default();
        let mut dropped = 0;
        for (index, level) in levels.into_iter().enumerate() {
            if let Some(slot) = book.levels.get_mut(index) {
                *slot = Some(level);
            } else {
                dropped += 1;
            }
        }
        (book, dropped)
    }

    /// Level at `index`, if present.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PriceLevel> {
        self.levels.get(index).and_then(Option::as_ref)
    }

    /// Set or clear the level at `index`. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, level: Option<PriceLevel>) {
        if let Some(slot) = self.levels.get_mut(index) {
            *slot = level;
        }
    }

    /// Present levels, top of book first.
    pub fn iter(&self) -> impl Iterator<Item = &PriceLevel> {
        self.levels.iter().flatten()
    }

    /// Number of present levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Whether no level is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(Option::is_none)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_slots_cover_both_sides_in_order() {
        let keys: Vec<String> = flat_slots().map(|s| s.key()).collect();
        assert_eq!(keys.len(), 2 * MAX_BOOK_LEVELS * 2);
        assert_eq!(keys[0], "bids_0_price");
        assert_eq!(keys[1], "bids_0_amount");
        assert_eq!(keys[2], "bids_1_price");
        assert_eq!(keys[2 * MAX_BOOK_LEVELS], "asks_0_price");
        assert_eq!(keys.last().unwrap(), "asks_4_amount");
    }

    #[test]
    fn from_levels_truncates_deep_books() {
        let levels = (0..7).map(|i| PriceLevel::new(100.0 + f64::from(i), 1.0));
        let (book, dropped) = BookLevels::from_levels(levels);
        assert_eq!(book.len(), MAX_BOOK_LEVELS);
        assert_eq!(dropped, 2);
        assert_eq!(book.get(0).unwrap().price, 100.0);
        assert!(book.get(MAX_BOOK_LEVELS).is_none());
    }

    #[test]
    fn empty_book() {
        let (book, dropped) = BookLevels::from_levels(Vec::new());
        assert!(book.is_empty());
        assert_eq!(dropped, 0);
    }
}
