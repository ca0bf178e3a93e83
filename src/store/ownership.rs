//! Cosmetic and weapon ownership bitstrings, and coin purchases

use tracing::info;

use super::profiles::PlayerRecord;

/// Owned flags for one catalog, stored as `'1'`/`'0'` per catalog index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipSet {
    owned: Vec<bool>,
    catalog_len: usize,
}

impl OwnershipSet {
    /// Missing trailing positions are not owned. Positions past the catalog are kept
    /// untouched so encoding never revokes them.
    pub fn parse(bits: &str, catalog_len: usize) -> Self {
        let mut owned: Vec<bool> = bits.chars().map(|c| c == '1').collect();
        owned.resize(owned.len().max(catalog_len), false);
        Self { owned, catalog_len }
    }

    pub fn encode(&self) -> String {
        self.owned.iter().map(|o| if *o { '1' } else { '0' }).collect()
    }

    pub fn owns(&self, index: usize) -> bool {
        self.owned.get(index).copied().unwrap_or(false)
    }

    /// Mark an item owned. False if the index is outside the catalog.
    pub fn grant(&mut self, index: usize) -> bool {
        if index >= self.catalog_len {
            return false;
        }
        match self.owned.get_mut(index) {
            Some(slot) => {
                *slot = true;
                true
            }
            None => false,
        }
    }

    pub fn owned_indices(&self) -> Vec<usize> {
        self.indices_where(true)
    }

    pub fn not_owned_indices(&self) -> Vec<usize> {
        self.indices_where(false)
    }

    fn indices_where(&self, owned: bool) -> Vec<usize> {
        self.owned
            .iter()
            .take(self.catalog_len)
            .enumerate()
            .filter(|(_, o)| **o == owned)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Shop catalogs with an ownership string in the player record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCategory {
    Head,
    Helmet,
    Vest,
    Gun,
}

impl ItemCategory {
    fn bits_mut(self, record: &mut PlayerRecord) -> &mut String {
        match self {
            ItemCategory::Head => &mut record.heads_owned,
            ItemCategory::Helmet => &mut record.helmets_owned,
            ItemCategory::Vest => &mut record.vests_owned,
            ItemCategory::Gun => &mut record.guns_owned,
        }
    }
}

/// Result of a purchase attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Purchased { remaining_coins: u32 },
    AlreadyOwned,
    InsufficientCoins { price: u32, available: u32 },
    UnknownItem,
}

/// Buy an item with coins: deducts the price and sets the ownership bit when affordable
pub fn purchase(
    record: &mut PlayerRecord,
    category: ItemCategory,
    index: usize,
    price: u32,
    catalog_len: usize,
) -> PurchaseOutcome {
    if index >= catalog_len {
        return PurchaseOutcome::UnknownItem;
    }
    let coins = record.coins;
    let bits = category.bits_mut(record);
    let mut set = OwnershipSet::parse(bits, catalog_len);
    if set.owns(index) {
        return PurchaseOutcome::AlreadyOwned;
    }
    if coins < price {
        return PurchaseOutcome::InsufficientCoins {
            price,
            available: coins,
        };
    }
    set.grant(index);
    *bits = set.encode();
    record.coins = coins - price;
    info!(?category, index, price, remaining = record.coins, "Item purchased");
    PurchaseOutcome::Purchased {
        remaining_coins: record.coins,
    }
}
