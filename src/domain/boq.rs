//! Bill of quantities domain types
//!
//! Entities, request DTOs and the validation that turns a request into
//! something the store may persist.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// BOQ workflow status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum BoqStatus {
    #[serde(rename = "Draft", alias = "draft")]
    Draft,
    #[serde(rename = "Under Review", alias = "under_review")]
    UnderReview,
    #[serde(rename = "Approved", alias = "approved")]
    Approved,
    #[serde(rename = "Rejected", alias = "rejected")]
    Rejected,
}

impl Default for BoqStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl std::fmt::Display for BoqStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BoqStatus::Draft => write!(f, "Draft"),
            BoqStatus::UnderReview => write!(f, "Under Review"),
            BoqStatus::Approved => write!(f, "Approved"),
            BoqStatus::Rejected => write!(f, "Rejected"),
        }
    }
}

impl BoqStatus {
    /// Whether the workflow allows moving from `self` to `next`.
    ///
    /// Re-asserting the current status is always allowed.
    pub fn can_transition_to(self, next: BoqStatus) -> bool {
        if self == next {
            return true;
        }

        matches!(
            (self, next),
            (Self::Draft, Self::UnderReview)
                | (Self::UnderReview, Self::Approved)
                | (Self::UnderReview, Self::Rejected)
        )
    }

    pub fn transition_to(self, next: BoqStatus) -> Result<BoqStatus, BoqError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(BoqError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

/// Cost category of a line item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ItemCategory {
    Materials,
    Labor,
    Equipment,
    Overhead,
}

/// BOQ header entity
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Boq {
    pub id: Uuid,
    pub boq_number: String,
    pub project_name: String,
    pub client_name: String,
    pub project_location: String,
    pub project_duration: Option<String>,
    pub currency: String,
    pub estimated_value: Decimal,
    pub notes: Option<String>,
    pub status: BoqStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// BOQ line item entity
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BoqItem {
    pub id: Uuid,
    pub boq_id: Uuid,
    pub item_no: String,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub total_amount: Decimal,
    pub specifications: Option<String>,
    pub category: ItemCategory,
}

/// Line item as supplied by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoqItemInput {
    pub item_no: String,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    #[serde(default)]
    pub specifications: Option<String>,
    pub category: ItemCategory,
}

/// Validated line item carrying its checked `quantity * unit_rate`
#[derive(Debug, Clone)]
pub struct NewBoqItem {
    pub item_no: String,
    pub description: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub total_amount: Decimal,
    pub specifications: Option<String>,
    pub category: ItemCategory,
}

/// Sum of the line totals, or `AmountOverflow` naming the item at which the
/// running total left the `Decimal` range.
pub fn estimated_value(items: &[NewBoqItem]) -> Result<Decimal, BoqError> {
    items.iter().try_fold(Decimal::ZERO, |sum, item| {
        sum.checked_add(item.total_amount)
            .ok_or_else(|| BoqError::AmountOverflow(item.item_no.clone()))
    })
}

/// Formats a BOQ number, e.g. `BOQ-2025-0007`.
pub fn format_boq_number(year: i32, sequence: u32) -> String {
    format!("BOQ-{:04}-{:04}", year, sequence)
}

/// Request DTO for creating a BOQ
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBoqRequest {
    pub project_name: String,
    pub client_name: String,
    pub project_location: String,
    #[serde(default)]
    pub project_duration: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<BoqItemInput>,
    #[serde(default)]
    pub status: Option<BoqStatus>,
}

/// Request DTO for updating a BOQ
///
/// Absent fields are left unchanged. `estimatedValue` is never accepted
/// from the client; it follows the items.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBoqRequest {
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub project_location: Option<String>,
    #[serde(default)]
    pub project_duration: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<BoqItemInput>>,
    #[serde(default)]
    pub status: Option<BoqStatus>,
}

/// Validated BOQ ready to be inserted
#[derive(Debug, Clone)]
pub struct NewBoq {
    pub project_name: String,
    pub client_name: String,
    pub project_location: String,
    pub project_duration: Option<String>,
    pub currency: String,
    pub notes: Option<String>,
    pub status: BoqStatus,
    pub estimated_value: Decimal,
    pub items: Vec<NewBoqItem>,
}

/// Validated changes to an existing BOQ
#[derive(Debug, Clone, Default)]
pub struct BoqPatch {
    pub project_name: Option<String>,
    pub client_name: Option<String>,
    pub project_location: Option<String>,
    pub project_duration: Option<String>,
    pub currency: Option<String>,
    pub notes: Option<String>,
    pub status: Option<BoqStatus>,
    pub items: Option<Vec<NewBoqItem>>,
}

impl BoqPatch {
    /// Merges the patch onto `boq`, enforcing the status workflow.
    ///
    /// When items are replaced the estimated value is recomputed from the
    /// new set before any other field is merged.
    pub fn apply(&self, boq: &mut Boq) -> Result<(), BoqError> {
        if let Some(next) = self.status {
            boq.status = boq.status.transition_to(next)?;
        }

        if let Some(items) = &self.items {
            boq.estimated_value = estimated_value(items)?;
        }

        if let Some(v) = &self.project_name {
            boq.project_name = v.clone();
        }
        if let Some(v) = &self.client_name {
            boq.client_name = v.clone();
        }
        if let Some(v) = &self.project_location {
            boq.project_location = v.clone();
        }
        if let Some(v) = &self.project_duration {
            boq.project_duration = Some(v.clone());
        }
        if let Some(v) = &self.currency {
            boq.currency = v.clone();
        }
        if let Some(v) = &self.notes {
            boq.notes = Some(v.clone());
        }

        Ok(())
    }
}

/// Filters accepted by the BOQ listing
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoqFilter {
    #[serde(default)]
    pub status: Option<BoqStatus>,
    #[serde(default)]
    pub search: Option<String>,
}

impl BoqFilter {
    /// Search term, trimmed, or `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn matches(&self, boq: &Boq) -> bool {
        if let Some(status) = self.status {
            if boq.status != status {
                return false;
            }
        }

        match self.search_term() {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                [&boq.project_name, &boq.client_name, &boq.boq_number]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&term))
            }
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoqError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("At least one line item is required")]
    EmptyItems,

    #[error("Item {index}: {field} is required")]
    MissingItemField { index: usize, field: &'static str },

    #[error("Item {0}: quantity must not be negative")]
    NegativeQuantity(String),

    #[error("Item {0}: unit rate must not be negative")]
    NegativeUnitRate(String),

    #[error("Duplicate item number {0}")]
    DuplicateItemNo(String),

    #[error("Invalid currency code {0:?}, expected three letters")]
    InvalidCurrency(String),

    #[error("A new BOQ must start in Draft, not {0}")]
    InvalidInitialStatus(BoqStatus),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: BoqStatus, to: BoqStatus },

    #[error("{field} must be between 0 and 100, got {value}")]
    InvalidPercent { field: &'static str, value: Decimal },

    #[error("Item {0}: amount exceeds the supported range")]
    AmountOverflow(String),

    #[error("Cost summary exceeds the supported range")]
    SummaryOverflow,
}

fn required(value: String, field: &'static str) -> Result<String, BoqError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoqError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn currency_code(value: &str) -> Result<String, BoqError> {
    let code = value.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(BoqError::InvalidCurrency(value.to_string()))
    }
}

/// Validates and normalizes a set of line items.
fn validate_items(items: Vec<BoqItemInput>) -> Result<Vec<NewBoqItem>, BoqError> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut validated = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let item_no = item.item_no.trim().to_string();
        if item_no.is_empty() {
            return Err(BoqError::MissingItemField {
                index,
                field: "itemNo",
            });
        }
        let description = item.description.trim().to_string();
        if description.is_empty() {
            return Err(BoqError::MissingItemField {
                index,
                field: "description",
            });
        }
        let unit = item.unit.trim().to_string();
        if unit.is_empty() {
            return Err(BoqError::MissingItemField {
                index,
                field: "unit",
            });
        }
        if item.quantity < Decimal::ZERO {
            return Err(BoqError::NegativeQuantity(item_no));
        }
        if item.unit_rate < Decimal::ZERO {
            return Err(BoqError::NegativeUnitRate(item_no));
        }
        if !seen.insert(item_no.clone()) {
            return Err(BoqError::DuplicateItemNo(item_no));
        }
        let Some(total_amount) = item.quantity.checked_mul(item.unit_rate) else {
            return Err(BoqError::AmountOverflow(item_no));
        };

        validated.push(NewBoqItem {
            item_no,
            description,
            unit,
            quantity: item.quantity,
            unit_rate: item.unit_rate,
            total_amount,
            specifications: optional_text(item.specifications),
            category: item.category,
        });
    }

    Ok(validated)
}

impl CreateBoqRequest {
    pub fn validate(self, default_currency: &str) -> Result<NewBoq, BoqError> {
        let project_name = required(self.project_name, "projectName")?;
        let client_name = required(self.client_name, "clientName")?;
        let project_location = required(self.project_location, "projectLocation")?;
        let currency = currency_code(self.currency.as_deref().unwrap_or(default_currency))?;

        let status = self.status.unwrap_or_default();
        if status != BoqStatus::Draft {
            return Err(BoqError::InvalidInitialStatus(status));
        }

        if self.items.is_empty() {
            return Err(BoqError::EmptyItems);
        }
        let items = validate_items(self.items)?;
        let total = estimated_value(&items)?;

        Ok(NewBoq {
            project_name,
            client_name,
            project_location,
            project_duration: optional_text(self.project_duration),
            currency,
            notes: optional_text(self.notes),
            status,
            estimated_value: total,
            items,
        })
    }
}

impl UpdateBoqRequest {
    /// `allow_empty_items` decides whether `items: []` clears the BOQ or is
    /// rejected.
    pub fn validate(self, allow_empty_items: bool) -> Result<BoqPatch, BoqError> {
        let items = match self.items {
            Some(items) if items.is_empty() && !allow_empty_items => {
                return Err(BoqError::EmptyItems);
            }
            Some(items) => {
                let items = validate_items(items)?;
                estimated_value(&items)?;
                Some(items)
            }
            None => None,
        };

        Ok(BoqPatch {
            project_name: self
                .project_name
                .map(|v| required(v, "projectName"))
                .transpose()?,
            client_name: self
                .client_name
                .map(|v| required(v, "clientName"))
                .transpose()?,
            project_location: self
                .project_location
                .map(|v| required(v, "projectLocation"))
                .transpose()?,
            project_duration: optional_text(self.project_duration),
            currency: self.currency.as_deref().map(currency_code).transpose()?,
            notes: optional_text(self.notes),
            status: self.status,
            items,
        })
    }
}
