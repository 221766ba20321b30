//! Shopping list domain model
//!
//! A list is keyed 1:1 by thread id and holds at most one entry per
//! normalized item name. Mutations are pure functions over the list; the
//! store applies them inside a single transaction.

mod category;

pub use category::{categorize, Category};

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Number of applied mutations remembered per list
pub const APPLIED_OPS_CAPACITY: usize = 256;

/// A single shopping list entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    /// Normalized item name (unique within a list)
    pub name: String,
    pub quantity: f64,
    /// Normalized unit; empty means a plain count
    pub unit: String,
    pub checked: bool,
    pub category: Category,
}

/// Shopping list for one thread
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub thread_id: String,
    pub items: Vec<ShoppingItem>,
    /// Mutations already applied, oldest first
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub applied_ops: VecDeque<AppliedOp>,
}

/// Record of an applied mutation.
///
/// The op is kept next to its id: providers that number tool calls per
/// response (`call_0`, `call_1`, ...) reuse ids across turns, so an id alone
/// does not identify a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedOp {
    pub id: String,
    pub op: ShoppingOp,
}

/// Validation conditions raised by list operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShoppingListError {
    #[error("item name must not be empty")]
    EmptyName,
    #[error("quantity must be a positive number, got {0}")]
    InvalidQuantity(f64),
    #[error("'{name}' is already listed in '{existing}', cannot add it in '{requested}'")]
    UnitMismatch {
        name: String,
        existing: String,
        requested: String,
    },
    #[error("'{0}' is not on the shopping list")]
    ItemNotFound(String),
}

/// A mutation of a shopping list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShoppingOp {
    Add {
        name: String,
        quantity: f64,
        unit: String,
    },
    Remove {
        name: String,
    },
    CheckOff {
        name: String,
        checked: bool,
    },
}

/// A mutation tagged with the id of the tool call that requested it
#[derive(Debug, Clone, PartialEq)]
pub struct ShoppingMutation {
    pub op_id: String,
    pub op: ShoppingOp,
}

/// Lowercase, trim and collapse internal whitespace
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase and trim; an empty unit means "count"
pub fn normalize_unit(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl ShoppingList {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            items: Vec::new(),
            applied_ops: VecDeque::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ShoppingItem> {
        let key = normalize_name(name);
        self.items.iter().find(|item| item.name == key)
    }

    /// Whether this exact mutation (same id and same op) was already applied
    pub fn has_applied(&self, mutation: &ShoppingMutation) -> bool {
        self.applied_ops
            .iter()
            .any(|applied| applied.id == mutation.op_id && applied.op == mutation.op)
    }

    /// Apply a mutation unless it is a replay of one already applied.
    ///
    /// A known id carrying a different op is a new mutation and replaces the
    /// older record for that id. On error the list is left untouched.
    pub fn apply(&mut self, mutation: &ShoppingMutation) -> Result<(), ShoppingListError> {
        if self.has_applied(mutation) {
            return Ok(());
        }

        match &mutation.op {
            ShoppingOp::Add {
                name,
                quantity,
                unit,
            } => self.add(name, *quantity, unit)?,
            ShoppingOp::Remove { name } => self.remove(name)?,
            ShoppingOp::CheckOff { name, checked } => self.check_off(name, *checked)?,
        }

        self.applied_ops.retain(|applied| applied.id != mutation.op_id);
        self.applied_ops.push_back(AppliedOp {
            id: mutation.op_id.clone(),
            op: mutation.op.clone(),
        });
        while self.applied_ops.len() > APPLIED_OPS_CAPACITY {
            self.applied_ops.pop_front();
        }
        Ok(())
    }

    fn add(&mut self, name: &str, quantity: f64, unit: &str) -> Result<(), ShoppingListError> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Err(ShoppingListError::EmptyName);
        }
        if !quantity.is_finite() || quantity <= 0.0 {
            return Err(ShoppingListError::InvalidQuantity(quantity));
        }
        let unit = normalize_unit(unit);

        if let Some(existing) = self.items.iter_mut().find(|item| item.name == key) {
            if existing.unit != unit {
                return Err(ShoppingListError::UnitMismatch {
                    name: key,
                    existing: existing.unit.clone(),
                    requested: unit,
                });
            }
            existing.quantity += quantity;
            existing.checked = false;
            return Ok(());
        }

        let category = categorize(&key);
        self.items.push(ShoppingItem {
            name: key,
            quantity,
            unit,
            checked: false,
            category,
        });
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ShoppingListError> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Err(ShoppingListError::EmptyName);
        }
        self.items.retain(|item| item.name != key);
        Ok(())
    }

    fn check_off(&mut self, name: &str, checked: bool) -> Result<(), ShoppingListError> {
        let key = normalize_name(name);
        if key.is_empty() {
            return Err(ShoppingListError::EmptyName);
        }
        let item = self
            .items
            .iter_mut()
            .find(|item| item.name == key)
            .ok_or(ShoppingListError::ItemNotFound(key))?;
        item.checked = checked;
        Ok(())
    }
}
