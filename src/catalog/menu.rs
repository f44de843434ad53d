use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;
use utoipa::ToSchema;

use crate::catalog::models::{Bebida, Combo, Product, COMBO_CATEGORY};
use crate::catalog::repository::CatalogRepository;
use crate::db::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MenuItemKind {
    Product,
    Drink,
    Combo,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuEntry {
    pub id: i32,
    pub kind: MenuItemKind,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MenuCategory {
    pub name: String,
    pub items: Vec<MenuEntry>,
}

/// Active catalog grouped by category
///
/// The storefront endpoint and the conversational prompt both render from this
/// snapshot so customers see the same prices on either channel.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct MenuSnapshot {
    pub categories: Vec<MenuCategory>,
}

impl MenuSnapshot {
    /// Load a fresh snapshot from the catalog
    pub async fn load(catalog: &dyn CatalogRepository) -> Result<Self, StoreError> {
        let products = catalog.products().await?;
        let drinks = catalog.drinks().await?;
        let combos = catalog.combos().await?;
        Ok(Self::build(&products, &drinks, &combos))
    }

    /// Group active items by category; categories sorted by name, combos last
    pub fn build(products: &[Product], drinks: &[Bebida], combos: &[Combo]) -> Self {
        let mut grouped: BTreeMap<String, Vec<MenuEntry>> = BTreeMap::new();

        for product in products.iter().filter(|p| p.active) {
            grouped.entry(product.category.clone()).or_default().push(MenuEntry {
                id: product.id,
                kind: MenuItemKind::Product,
                name: product.name.clone(),
                description: Some(product.description.clone()).filter(|d| !d.is_empty()),
                price: product.sale_price,
                image: product.image.clone(),
            });
        }

        for drink in drinks.iter().filter(|d| d.active) {
            grouped.entry(drink.category.clone()).or_default().push(MenuEntry {
                id: drink.id,
                kind: MenuItemKind::Drink,
                name: drink.name.clone(),
                description: None,
                price: drink.sale_price,
                image: drink.image.clone(),
            });
        }

        let mut categories: Vec<MenuCategory> = grouped
            .into_iter()
            .filter(|(name, _)| name != COMBO_CATEGORY)
            .map(|(name, items)| MenuCategory { name, items })
            .collect();

        let combo_items: Vec<MenuEntry> = combos
            .iter()
            .filter(|c| c.active)
            .map(|combo| MenuEntry {
                id: combo.id,
                kind: MenuItemKind::Combo,
                name: combo.name.clone(),
                description: Some(combo.description.clone()).filter(|d| !d.is_empty()),
                price: combo.final_price,
                image: combo.image.clone(),
            })
            .collect();

        if !combo_items.is_empty() {
            categories.push(MenuCategory {
                name: COMBO_CATEGORY.to_string(),
                items: combo_items,
            });
        }

        Self { categories }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.iter().all(|c| c.items.is_empty())
    }

    pub fn entries(&self) -> impl Iterator<Item = &MenuEntry> {
        self.categories.iter().flat_map(|c| c.items.iter())
    }

    /// Plain-text rendering embedded in the assistant's system prompt
    pub fn to_prompt_text(&self) -> String {
        if self.is_empty() {
            return "Cardápio indisponível no momento.".to_string();
        }

        let mut text = String::new();
        for category in &self.categories {
            let _ = writeln!(text, "## {}", category.name);
            for item in &category.items {
                let _ = write!(text, "- {}: R$ {:.2}", item.name, item.price);
                if let Some(description) = &item.description {
                    let _ = write!(text, " ({})", description);
                }
                text.push('\n');
            }
        }
        text
    }

    /// The item with an image whose name appears as whole words in `text`,
    /// longest name first
    pub fn item_with_image_named_in(&self, text: &str) -> Option<&MenuEntry> {
        let haystack = text.to_lowercase();
        self.entries()
            .filter(|item| item.image.as_deref().is_some_and(|i| !i.is_empty()))
            .filter(|item| contains_words(&haystack, &item.name.to_lowercase()))
            .max_by_key(|item| item.name.chars().count())
    }
}

fn contains_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
