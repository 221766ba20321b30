//! Shopping list tools: add, remove and check off items

use super::ToolError;
use crate::shopping::{normalize_name, ShoppingMutation, ShoppingOp};
use serde::Deserialize;
use serde_json::{json, Value};

pub(super) const ADD_DESCRIPTION: &str = "Add an item to the shopping list. Adding an item that is already listed in the same unit increases its quantity; a different unit is rejected. Returns the updated list.";
pub(super) const REMOVE_DESCRIPTION: &str = "Remove an item from the shopping list. Removing an item that is not listed does nothing. Returns the updated list.";
pub(super) const CHECK_OFF_DESCRIPTION: &str = "Mark a listed item as bought, or set checked to false to un-check it. Returns the updated list.";

fn default_quantity() -> f64 {
    1.0
}

fn default_checked() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddShoppingItemArgs {
    pub name: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoveShoppingItemArgs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckOffItemArgs {
    pub name: String,
    #[serde(default = "default_checked")]
    pub checked: bool,
}

fn require_name(name: &str) -> Result<(), ToolError> {
    if normalize_name(name).is_empty() {
        return Err(ToolError::invalid_arguments("name must not be empty"));
    }
    Ok(())
}

impl AddShoppingItemArgs {
    pub fn into_mutation(self, op_id: &str) -> Result<ShoppingMutation, ToolError> {
        require_name(&self.name)?;
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(ToolError::invalid_arguments(format!(
                "quantity must be a positive number, got {}",
                self.quantity
            )));
        }
        Ok(ShoppingMutation {
            op_id: op_id.to_string(),
            op: ShoppingOp::Add {
                name: self.name,
                quantity: self.quantity,
                unit: self.unit,
            },
        })
    }
}

impl RemoveShoppingItemArgs {
    pub fn into_mutation(self, op_id: &str) -> Result<ShoppingMutation, ToolError> {
        require_name(&self.name)?;
        Ok(ShoppingMutation {
            op_id: op_id.to_string(),
            op: ShoppingOp::Remove { name: self.name },
        })
    }
}

impl CheckOffItemArgs {
    pub fn into_mutation(self, op_id: &str) -> Result<ShoppingMutation, ToolError> {
        require_name(&self.name)?;
        Ok(ShoppingMutation {
            op_id: op_id.to_string(),
            op: ShoppingOp::CheckOff {
                name: self.name,
                checked: self.checked,
            },
        })
    }
}

fn name_property() -> Value {
    json!({
        "type": "string",
        "description": "Item name, e.g. 'milk' or 'red onion'"
    })
}

pub(super) fn add_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "additionalProperties": false,
        "properties": {
            "name": name_property(),
            "quantity": {
                "type": "number",
                "exclusiveMinimum": 0,
                "description": "Amount to add (default 1)"
            },
            "unit": {
                "type": "string",
                "description": "Unit such as 'g', 'l' or 'cup'; omit for a plain count"
            }
        }
    })
}

pub(super) fn remove_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "additionalProperties": false,
        "properties": {
            "name": name_property()
        }
    })
}

pub(super) fn check_off_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name"],
        "additionalProperties": false,
        "properties": {
            "name": name_property(),
            "checked": {
                "type": "boolean",
                "description": "false to un-check the item (default true)"
            }
        }
    })
}
