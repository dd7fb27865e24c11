//! Product table and price calculator.
//!
//! Prices are exact [`Decimal`] values; totals never pass through binary
//! floating point.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;

use crate::error::ValidationError;

/// A purchasable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Identifier used in selections and query strings.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Unit price in whole coins.
    pub price: Decimal,
}

impl Product {
    /// Creates a product.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }
}

/// Read-only product table.
#[derive(Debug, Clone)]
pub struct Catalog {
    products: BTreeMap<String, Product>,
}

impl Catalog {
    /// Builds a catalog from a list of products.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidProduct`] on a negative price or a
    /// duplicate identifier.
    pub fn new(products: impl IntoIterator<Item = Product>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for product in products {
            if product.price.is_sign_negative() && !product.price.is_zero() {
                return Err(ValidationError::InvalidProduct(product.id));
            }
            match map.entry(product.id.clone()) {
                btree_map::Entry::Occupied(_) => {
                    return Err(ValidationError::InvalidProduct(product.id));
                }
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(product);
                }
            }
        }
        Ok(Self { products: map })
    }

    /// Looks up a product by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.products.get(id)
    }

    /// Returns `true` if `id` names a product.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.products.contains_key(id)
    }

    /// Iterates products in identifier order.
    pub fn products(&self) -> impl Iterator<Item = &Product> {
        self.products.values()
    }

    /// Computes `Σ quantity × unit price` for a selection.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::InvalidSelection`] for an unknown identifier
    /// - [`ValidationError::AmountOverflow`] if the sum does not fit
    /// - [`ValidationError::ZeroAmount`] if the total is exactly zero
    pub fn total(&self, selection: &Selection) -> Result<Decimal, ValidationError> {
        let mut total = Decimal::ZERO;
        for (id, quantity) in selection.iter() {
            let product = self
                .get(id)
                .ok_or_else(|| ValidationError::InvalidSelection(id.to_owned()))?;
            let line = product
                .price
                .checked_mul(Decimal::from(quantity))
                .ok_or(ValidationError::AmountOverflow)?;
            total = total
                .checked_add(line)
                .ok_or(ValidationError::AmountOverflow)?;
        }
        if total.is_zero() {
            return Err(ValidationError::ZeroAmount);
        }
        Ok(total)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            products: [
                Product::new("box-of-cookies", "Box of Cookies", Decimal::new(5, 2)),
                Product::new("basket-of-cookies", "Basket of Cookies", Decimal::new(10, 2)),
            ]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect(),
        }
    }
}

/// Product identifier → quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    items: BTreeMap<String, u64>,
}

impl Selection {
    /// Creates an empty selection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `quantity` of `id`; repeated identifiers accumulate.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::AmountOverflow`] if the accumulated quantity
    /// does not fit `u64`.
    pub fn add(&mut self, id: impl Into<String>, quantity: u64) -> Result<(), ValidationError> {
        let slot = self.items.entry(id.into()).or_insert(0);
        *slot = slot
            .checked_add(quantity)
            .ok_or(ValidationError::AmountOverflow)?;
        Ok(())
    }

    /// Builder-style [`Selection::add`].
    ///
    /// # Errors
    ///
    /// See [`Selection::add`].
    pub fn with(mut self, id: impl Into<String>, quantity: u64) -> Result<Self, ValidationError> {
        self.add(id, quantity)?;
        Ok(self)
    }

    /// Parses query-style `(id, quantity)` pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidQuantity`] when a quantity is not a
    /// non-negative integer.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut selection = Self::new();
        for (id, value) in pairs {
            let (id, value) = (id.as_ref(), value.as_ref());
            let quantity =
                value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ValidationError::InvalidQuantity {
                        id: id.to_owned(),
                        value: value.to_owned(),
                    })?;
            selection.add(id, quantity)?;
        }
        Ok(selection)
    }

    /// Quantity selected for `id`.
    #[must_use]
    pub fn quantity(&self, id: &str) -> u64 {
        self.items.get(id).copied().unwrap_or(0)
    }

    /// Iterates `(id, quantity)` pairs in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.items.iter().map(|(id, q)| (id.as_str(), *q))
    }

    /// Returns `true` if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Renders the selection as query pairs.
    pub fn to_query_pairs(&self) -> impl Iterator<Item = (&str, String)> {
        self.iter().map(|(id, q)| (id, q.to_string()))
    }
}
