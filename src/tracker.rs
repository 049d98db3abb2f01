//! Watchlist and portfolio state: an owned store plus its file edges.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gecko::CoinSummary;

/// Which list a tracked coin belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tag {
    Watchlist,
    Portfolio,
}

impl Tag {
    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Watchlist => "watchlist",
            Tag::Portfolio => "portfolio",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One locally tracked coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub tag: Tag,
    pub coin: CoinSummary,
    /// Watchlist star flag. Display-only; clearing it does not remove the
    /// record.
    #[serde(default)]
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

impl TrackedItem {
    /// A starred watchlist entry for the given coin.
    pub fn watchlist(coin: CoinSummary) -> TrackedItem {
        TrackedItem {
            id: coin.id.clone(),
            tag: Tag::Watchlist,
            coin,
            selected: true,
            price: None,
            quantity: None,
        }
    }

    /// A mock holding captured at the given price.
    pub fn holding(coin: CoinSummary, price: f64, quantity: f64) -> TrackedItem {
        TrackedItem {
            id: coin.id.clone(),
            tag: Tag::Portfolio,
            coin,
            selected: false,
            price: Some(price),
            quantity: Some(quantity),
        }
    }

    /// Mock holding value; zero for watchlist entries.
    pub fn value(&self) -> f64 {
        self.quantity.unwrap_or(0.0) * self.price.unwrap_or(0.0)
    }
}

/// Owned watchlist/portfolio state container.
///
/// At most one entry exists per (id, tag) pair; repeated adds are no-ops.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerStore {
    items: Vec<TrackedItem>,
}

impl TrackerStore {
    pub fn new() -> TrackerStore {
        TrackerStore { items: Vec::new() }
    }

    /// Adds an item unless one with the same (id, tag) is already present.
    /// Returns whether the item was actually inserted.
    pub fn add(&mut self, item: TrackedItem) -> bool {
        if self.contains(&item.id, item.tag) {
            return false;
        }
        self.items.push(item);
        true
    }

    pub fn contains(&self, id: &str, tag: Tag) -> bool {
        self.items.iter().any(|i| i.id == id && i.tag == tag)
    }

    /// Entries carrying the given tag, in insertion order.
    pub fn by_tag(&self, tag: Tag) -> Vec<&TrackedItem> {
        self.items.iter().filter(|i| i.tag == tag).collect()
    }

    pub fn items(&self) -> &[TrackedItem] {
        &self.items
    }

    /// Flips the star on a watchlist entry. Returns false when no watchlist
    /// entry exists for the id.
    pub fn toggle_selected(&mut self, id: &str) -> bool {
        if let Some(item) = self
            .items
            .iter_mut()
            .find(|i| i.id == id && i.tag == Tag::Watchlist)
        {
            item.selected = !item.selected;
            return true;
        }
        false
    }

    /// Star indicator state: a watchlist entry exists and is selected.
    pub fn is_starred(&self, id: &str) -> bool {
        self.items
            .iter()
            .any(|i| i.id == id && i.tag == Tag::Watchlist && i.selected)
    }

    pub fn is_held(&self, id: &str) -> bool {
        self.contains(id, Tag::Portfolio)
    }

    /// Total mock value across all portfolio entries.
    pub fn holdings_value(&self) -> f64 {
        self.by_tag(Tag::Portfolio).iter().map(|i| i.value()).sum()
    }

    /// Per-coin share of the holdings value in percent, insertion order.
    pub fn allocation(&self) -> Vec<(String, f64)> {
        let total = self.holdings_value();
        if total <= 0.0 {
            return Vec::new();
        }
        self.by_tag(Tag::Portfolio)
            .iter()
            .map(|i| (i.coin.name.clone(), i.value() / total * 100.0))
            .collect()
    }
}

/// Reads tracked items from a JSON file. A missing file is an empty store.
pub fn load_items(path: &Path) -> Result<TrackerStore> {
    if !path.exists() {
        return Ok(TrackerStore::new());
    }
    let data = std::fs::read_to_string(path)?;
    let items: Vec<TrackedItem> = serde_json::from_str(&data)?;

    // going through add() keeps the (id, tag) invariant even for
    // hand-edited files
    let mut store = TrackerStore::new();
    for item in items {
        store.add(item);
    }
    Ok(store)
}

/// Writes the store back as pretty-printed JSON.
pub fn save_items(store: &TrackerStore, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(store.items())?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Records the current total holdings value, keyed by local timestamp.
pub fn store_value_snapshot(db_path: &Path, value: f64) -> Result<()> {
    let db = sled::open(db_path)?;
    let key = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    db.insert(key.as_bytes(), value.to_string().as_bytes())?;

    // block until the write is stable on disk
    db.flush()?;
    Ok(())
}

/// Most recently stored holdings value, if any.
pub fn last_value_snapshot(db_path: &Path) -> Result<Option<f64>> {
    let db = sled::open(db_path)?;
    match db.iter().last() {
        Some(Ok((_, raw))) => Ok(String::from_utf8_lossy(&raw).parse().ok()),
        _ => Ok(None),
    }
}
