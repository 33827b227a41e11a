//! The signed-in user's favorite listings.
//!
//! Toggling a favorite changes the local set immediately and only then tells the server.  If
//! the server call fails, the change is undone with [`FavoriteSet::rollback`].

use std::collections::HashSet;

use crate::types::FavoriteAdvertisement;

/// A change made by [`FavoriteSet::toggle`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FavoriteToggle {
    /// The advertisement that was toggled.
    pub advertisement_id: String,
    /// True if the advertisement is now a favorite.
    pub added: bool,
}

/// Set of favorite advertisement ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FavoriteSet {
    ids: HashSet<String>,
}

impl FavoriteSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with what the server reported.
    pub fn replace(&mut self, favorites: &[FavoriteAdvertisement]) {
        self.ids = favorites
            .iter()
            .map(|f| f.advertisement_id.clone())
            .collect();
    }

    /// Forget everything, e.g. after sign-out.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// True if `advertisement_id` is a favorite.
    pub fn contains(&self, advertisement_id: &str) -> bool {
        self.ids.contains(advertisement_id)
    }

    /// Number of favorites.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if there are no favorites.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Flip membership of `advertisement_id`.
    pub fn toggle(&mut self, advertisement_id: &str) -> FavoriteToggle {
        let added = if self.ids.remove(advertisement_id) {
            false
        } else {
            self.ids.insert(advertisement_id.to_string());
            true
        };
        FavoriteToggle {
            advertisement_id: advertisement_id.to_string(),
            added,
        }
    }

    /// Undo a toggle whose server call failed.
    pub fn rollback(&mut self, toggle: &FavoriteToggle) {
        if toggle.added {
            self.ids.remove(&toggle.advertisement_id);
        } else {
            self.ids.insert(toggle.advertisement_id.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_and_rollback() {
        let mut favorites = FavoriteSet::new();
        let added = favorites.toggle("a-1");
        assert!(added.added);
        assert!(favorites.contains("a-1"));

        favorites.rollback(&added);
        assert!(!favorites.contains("a-1"));

        favorites.toggle("a-1");
        let removed = favorites.toggle("a-1");
        assert!(!removed.added);
        assert!(favorites.is_empty());
        favorites.rollback(&removed);
        assert!(favorites.contains("a-1"));
    }

    #[test]
    fn replace_from_server() {
        let mut favorites = FavoriteSet::new();
        favorites.toggle("stale");
        favorites.replace(&[FavoriteAdvertisement {
            advertisement_id: "a-2".to_string(),
            title: None,
            price: None,
            thumbnail_url: None,
        }]);
        assert_eq!(favorites.len(), 1);
        assert!(favorites.contains("a-2"));
        assert!(!favorites.contains("stale"));
    }
}
