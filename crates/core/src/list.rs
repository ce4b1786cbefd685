//! The in-memory item list and the merge rules applied to it.
//!
//! Local mutation results and remote push events both arrive here. The same
//! logical change is routinely delivered twice (once as the response to our
//! own request, once echoed by the push channel), and pushes from different
//! channels carry no ordering relative to each other. Every operation is
//! therefore idempotent and tolerates facts about ids it has never seen.

use tracing::debug;

use crate::item::{Item, ItemId};

/// A fact to merge into the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    Created(Item),
    Updated(Item),
    Deleted(ItemId),
    /// A deletion happened somewhere but the payload did not say which item.
    Reload,
}

/// What a merge did to the list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Replaced,
    Removed,
    /// Duplicate create, or update/delete for an id not on the list.
    Unchanged,
    /// Update older than the copy already held.
    Stale,
    /// The caller must resynchronize from a full snapshot.
    ReloadRequired,
}

impl Applied {
    pub fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced | Self::Removed)
    }
}

/// Items in arrival order, unique by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemList {
    items: Vec<Item>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a list from a snapshot, keeping the first occurrence of any
    /// repeated id.
    pub fn from_snapshot(snapshot: Vec<Item>) -> Self {
        let mut list = Self::new();
        for item in snapshot {
            list.apply_create(item);
        }
        list
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.items.iter().position(|item| &item.id == id)
    }

    pub fn completed_count(&self) -> usize {
        self.items.iter().filter(|item| item.completed).count()
    }

    /// Append `item` unless an item with the same id is already present.
    pub fn apply_create(&mut self, item: Item) -> Applied {
        if self.position(&item.id).is_some() {
            debug!(id = %item.id, "create for known id ignored");
            return Applied::Unchanged;
        }
        self.items.push(item);
        Applied::Inserted
    }

    /// Replace the item with the same id in place. Unknown ids are dropped; a
    /// later snapshot will bring them in.
    ///
    /// Backend timestamps only move forward, so an update carrying an
    /// `updatedAt` older than the held copy is a late echo and is skipped
    /// ([`Applied::Stale`]) instead of replacing newer state.
    pub fn apply_update(&mut self, item: Item) -> Applied {
        let Some(index) = self.position(&item.id) else {
            debug!(id = %item.id, "update for unknown id ignored");
            return Applied::Unchanged;
        };
        let current = &mut self.items[index];
        if item.is_older_than(current) {
            debug!(id = %item.id, "stale update ignored");
            return Applied::Stale;
        }
        let created_at = current.created_at;
        *current = item;
        if current.created_at.is_none() {
            current.created_at = created_at;
        }
        Applied::Replaced
    }

    pub fn apply_delete(&mut self, id: &ItemId) -> Applied {
        let Some(index) = self.position(id) else {
            debug!(%id, "delete for unknown id ignored");
            return Applied::Unchanged;
        };
        self.items.remove(index);
        Applied::Removed
    }

    pub fn apply(&mut self, event: ListEvent) -> Applied {
        match event {
            ListEvent::Created(item) => self.apply_create(item),
            ListEvent::Updated(item) => self.apply_update(item),
            ListEvent::Deleted(id) => self.apply_delete(&id),
            ListEvent::Reload => Applied::ReloadRequired,
        }
    }

    /// Pure form of [`ItemList::apply`].
    pub fn merged(&self, event: ListEvent) -> Self {
        let mut next = self.clone();
        next.apply(event);
        next
    }

    /// Footer line shown under the list.
    pub fn summary(&self) -> String {
        match self.items.len() {
            0 => "No items found".to_string(),
            1 => "1 item total".to_string(),
            n => format!("{n} items total"),
        }
    }
}

impl<'a> IntoIterator for &'a ItemList {
    type Item = &'a Item;
    type IntoIter = std::slice::Iter<'a, Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{item, item_at, item_done};

    fn ids(list: &ItemList) -> Vec<&str> {
        list.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn create_is_idempotent() {
        let mut once = ItemList::new();
        once.apply_create(item("1", "A"));

        let mut twice = once.clone();
        assert_eq!(twice.apply_create(item("1", "A")), Applied::Unchanged);
        assert_eq!(twice, once);
    }

    #[test]
    fn duplicate_create_keeps_the_first_copy() {
        let mut list = ItemList::new();
        list.apply_create(item("1", "A"));
        list.apply_create(item_done("1", "A (echo)"));
        assert_eq!(list.len(), 1);
        assert_eq!(list.items()[0].title, "A");
    }

    #[test]
    fn unknown_update_and_delete_leave_list_unchanged() {
        let list = ItemList::from_snapshot(vec![item("1", "A"), item("2", "B")]);

        let mut updated = list.clone();
        assert_eq!(updated.apply_update(item_done("9", "Z")), Applied::Unchanged);
        assert_eq!(updated, list);

        let mut deleted = list.clone();
        assert_eq!(deleted.apply_delete(&ItemId::from("9")), Applied::Unchanged);
        assert_eq!(deleted, list);
    }

    #[test]
    fn update_preserves_position() {
        let mut list =
            ItemList::from_snapshot(vec![item("1", "A"), item("2", "B"), item("3", "C")]);
        assert_eq!(list.apply_update(item_done("2", "B")), Applied::Replaced);
        assert_eq!(ids(&list), vec!["1", "2", "3"]);
        assert!(list.items()[1].completed);
    }

    #[test]
    fn stale_update_is_ignored() {
        let mut list = ItemList::from_snapshot(vec![item_at("1", "A", true, 200)]);
        assert_eq!(list.apply_update(item_at("1", "A", false, 100)), Applied::Stale);
        assert!(list.items()[0].completed);

        assert_eq!(list.apply_update(item_at("1", "A", false, 300)), Applied::Replaced);
        assert!(!list.items()[0].completed);
    }

    #[test]
    fn update_keeps_created_at_when_payload_omits_it() {
        let mut original = item("1", "A");
        original.created_at = chrono::DateTime::from_timestamp(10, 0);
        let mut list = ItemList::from_snapshot(vec![original]);

        list.apply_update(item_done("1", "A"));
        assert_eq!(
            list.items()[0].created_at,
            chrono::DateTime::from_timestamp(10, 0)
        );
    }

    #[test]
    fn reload_event_changes_nothing_and_asks_for_snapshot() {
        let mut list = ItemList::from_snapshot(vec![item("1", "A")]);
        let before = list.clone();
        assert_eq!(list.apply(ListEvent::Reload), Applied::ReloadRequired);
        assert_eq!(list, before);
    }

    #[test]
    fn scenario_create_update_delete() {
        let mut list = ItemList::from_snapshot(vec![item("1", "A")]);

        list.apply(ListEvent::Created(item("2", "B")));
        assert_eq!(ids(&list), vec!["1", "2"]);

        list.apply(ListEvent::Updated(item_done("1", "A")));
        assert_eq!(ids(&list), vec!["1", "2"]);
        assert!(list.items()[0].completed);

        assert_eq!(list.apply(ListEvent::Deleted(ItemId::from("2"))), Applied::Removed);
        assert_eq!(list.items(), &[item_done("1", "A")]);

        let before = list.clone();
        assert_eq!(
            list.apply(ListEvent::Deleted(ItemId::from("2"))),
            Applied::Unchanged
        );
        assert_eq!(list, before);
    }

    #[test]
    fn snapshot_drops_repeated_ids() {
        let list = ItemList::from_snapshot(vec![item("1", "A"), item("2", "B"), item("1", "A2")]);
        assert_eq!(ids(&list), vec!["1", "2"]);
        assert_eq!(list.items()[0].title, "A");
    }

    #[test]
    fn merged_does_not_touch_the_original() {
        let list = ItemList::from_snapshot(vec![item("1", "A")]);
        let next = list.merged(ListEvent::Created(item("2", "B")));
        assert_eq!(list.len(), 1);
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn summary_pluralizes() {
        assert_eq!(ItemList::new().summary(), "No items found");
        assert_eq!(
            ItemList::from_snapshot(vec![item("1", "A")]).summary(),
            "1 item total"
        );
        assert_eq!(
            ItemList::from_snapshot(vec![item("1", "A"), item_done("2", "B")]).summary(),
            "2 items total"
        );
    }
}
