use crate::{Item, ItemId};

/// Open item with the given id and title.
pub fn item(id: &str, title: &str) -> Item {
    Item {
        id: ItemId::from(id),
        title: title.to_string(),
        completed: false,
        created_at: None,
        updated_at: None,
    }
}

/// Completed item with the given id and title.
pub fn item_done(id: &str, title: &str) -> Item {
    Item {
        completed: true,
        ..item(id, title)
    }
}

/// Item stamped with `updated_at` at the given unix second.
pub fn item_at(id: &str, title: &str, completed: bool, updated_secs: i64) -> Item {
    Item {
        completed,
        updated_at: chrono::DateTime::from_timestamp(updated_secs, 0),
        ..item(id, title)
    }
}
