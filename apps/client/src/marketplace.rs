//! Choosing the marketplaces a product is listed on.

use std::collections::BTreeSet;

use merx_account::session::{SessionStore, SessionSubscription};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marketplace {
    pub id: &'static str,
    pub name: &'static str,
}

pub const MARKETPLACES: &[Marketplace] = &[
    Marketplace {
        id: "mercadolivre",
        name: "Mercado Livre",
    },
    Marketplace {
        id: "amazon",
        name: "Amazon",
    },
    Marketplace {
        id: "shopee",
        name: "Shopee",
    },
    Marketplace {
        id: "shein",
        name: "Shein",
    },
    Marketplace {
        id: "magalu",
        name: "Magazine Luiza",
    },
    Marketplace {
        id: "olx",
        name: "OLX",
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("sign in to choose marketplaces")]
    LoginRequired,

    #[error("unknown marketplace: {0}")]
    UnknownMarketplace(String),

    #[error("select at least one marketplace")]
    NothingSelected,
}

fn position(id: &str) -> Option<usize> {
    MARKETPLACES.iter().position(|m| m.id == id)
}

pub struct MarketplaceSelector {
    session: SessionSubscription,
    selected: BTreeSet<usize>,
}

impl MarketplaceSelector {
    pub fn new(store: &SessionStore) -> Self {
        Self {
            session: store.subscribe(),
            selected: BTreeSet::new(),
        }
    }

    pub fn catalog(&self) -> &'static [Marketplace] {
        MARKETPLACES
    }

    pub fn is_selected(&self, id: &str) -> bool {
        position(id).is_some_and(|i| self.selected.contains(&i))
    }

    fn require_login(&self) -> Result<(), SelectionError> {
        if self.session.current().is_authenticated() {
            Ok(())
        } else {
            Err(SelectionError::LoginRequired)
        }
    }

    /// Flip one marketplace and return whether it is now selected.
    pub fn toggle(&mut self, id: &str) -> Result<bool, SelectionError> {
        self.require_login()?;
        let index =
            position(id).ok_or_else(|| SelectionError::UnknownMarketplace(id.to_string()))?;
        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    /// Selected marketplaces in catalog order.
    pub fn selected(&self) -> Vec<Marketplace> {
        self.selected.iter().map(|&i| MARKETPLACES[i]).collect()
    }

    /// Confirm the selection before moving on to the product form.
    pub fn proceed(&self) -> Result<Vec<Marketplace>, SelectionError> {
        self.require_login()?;
        if self.selected.is_empty() {
            return Err(SelectionError::NothingSelected);
        }
        let chosen = self.selected();
        tracing::info!(
            marketplaces = ?chosen.iter().map(|m| m.id).collect::<Vec<_>>(),
            "marketplaces selected"
        );
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merx_shared::api::auth::{Identity, SessionEvent};
    use merx_shared::ids::UserId;

    fn signed_in_store() -> SessionStore {
        let store = SessionStore::new();
        store.apply(SessionEvent::signed_in(Identity {
            id: UserId::new(),
            email: "ana@example.com".into(),
        }));
        store
    }

    #[test]
    fn catalog_has_six_marketplaces() {
        assert_eq!(MARKETPLACES.len(), 6);
        assert!(position("magalu").is_some());
    }

    #[test]
    fn toggle_requires_login() {
        let store = SessionStore::new();
        let mut selector = MarketplaceSelector::new(&store);
        assert_eq!(selector.toggle("amazon"), Err(SelectionError::LoginRequired));
        assert_eq!(selector.proceed(), Err(SelectionError::LoginRequired));
    }

    #[test]
    fn toggle_flips_selection() {
        let store = signed_in_store();
        let mut selector = MarketplaceSelector::new(&store);
        assert_eq!(selector.toggle("shopee"), Ok(true));
        assert!(selector.is_selected("shopee"));
        assert_eq!(selector.toggle("shopee"), Ok(false));
        assert!(!selector.is_selected("shopee"));
    }

    #[test]
    fn unknown_marketplace_is_rejected() {
        let store = signed_in_store();
        let mut selector = MarketplaceSelector::new(&store);
        assert_eq!(
            selector.toggle("ebay"),
            Err(SelectionError::UnknownMarketplace("ebay".into()))
        );
    }

    #[test]
    fn proceed_returns_catalog_order() {
        let store = signed_in_store();
        let mut selector = MarketplaceSelector::new(&store);
        assert_eq!(selector.proceed(), Err(SelectionError::NothingSelected));

        selector.toggle("olx").unwrap();
        selector.toggle("mercadolivre").unwrap();
        let ids: Vec<_> = selector.proceed().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["mercadolivre", "olx"]);
    }

    #[test]
    fn sign_out_blocks_proceed() {
        let store = signed_in_store();
        let mut selector = MarketplaceSelector::new(&store);
        selector.toggle("amazon").unwrap();
        store.apply(SessionEvent::signed_out());
        assert_eq!(selector.proceed(), Err(SelectionError::LoginRequired));
    }
}
