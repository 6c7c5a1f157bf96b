//! Cost roll-up for a BOQ
//!
//! Groups line totals by category and applies overhead and margin
//! percentages on top of the subtotal.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::boq::{Boq, BoqError, BoqItem, ItemCategory};

/// Percentages applied on top of the item subtotal
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryParams {
    #[serde(default)]
    pub manufacturing_overhead_percent: Option<Decimal>,
    #[serde(default)]
    pub administrative_overhead_percent: Option<Decimal>,
    #[serde(default)]
    pub profit_margin_percent: Option<Decimal>,
}

fn percent(value: Option<Decimal>, field: &'static str) -> Result<Decimal, BoqError> {
    let value = value.unwrap_or(Decimal::ZERO);
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(BoqError::InvalidPercent { field, value });
    }
    Ok(value / Decimal::ONE_HUNDRED)
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Line totals per cost category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotals {
    pub materials: Decimal,
    pub labor: Decimal,
    pub equipment: Decimal,
    pub overhead: Decimal,
}

impl CategoryTotals {
    fn add(&mut self, category: ItemCategory, amount: Decimal) -> Result<(), BoqError> {
        let slot = match category {
            ItemCategory::Materials => &mut self.materials,
            ItemCategory::Labor => &mut self.labor,
            ItemCategory::Equipment => &mut self.equipment,
            ItemCategory::Overhead => &mut self.overhead,
        };
        *slot = checked(slot.checked_add(amount))?;
        Ok(())
    }
}

fn checked(value: Option<Decimal>) -> Result<Decimal, BoqError> {
    value.ok_or(BoqError::SummaryOverflow)
}

/// Cost summary response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostSummary {
    pub boq_id: Uuid,
    pub boq_number: String,
    pub currency: String,
    pub item_count: usize,
    pub categories: CategoryTotals,
    pub subtotal: Decimal,
    pub manufacturing_overhead: Decimal,
    pub administrative_overhead: Decimal,
    pub total_cost: Decimal,
    pub margin_amount: Decimal,
    pub final_price: Decimal,
}

impl CostSummary {
    pub fn build(boq: &Boq, items: &[BoqItem], params: &SummaryParams) -> Result<Self, BoqError> {
        let mfg_rate = percent(
            params.manufacturing_overhead_percent,
            "manufacturingOverheadPercent",
        )?;
        let admin_rate = percent(
            params.administrative_overhead_percent,
            "administrativeOverheadPercent",
        )?;
        let margin_rate = percent(params.profit_margin_percent, "profitMarginPercent")?;

        let mut categories = CategoryTotals::default();
        let mut subtotal = Decimal::ZERO;
        for item in items {
            categories.add(item.category, item.total_amount)?;
            subtotal = checked(subtotal.checked_add(item.total_amount))?;
        }

        let manufacturing_overhead = checked(subtotal.checked_mul(mfg_rate))?;
        let administrative_overhead = checked(subtotal.checked_mul(admin_rate))?;
        let total_cost = checked(
            subtotal
                .checked_add(manufacturing_overhead)
                .and_then(|v| v.checked_add(administrative_overhead)),
        )?;
        let margin_amount = checked(total_cost.checked_mul(margin_rate))?;
        let final_price = checked(total_cost.checked_add(margin_amount))?;

        Ok(Self {
            boq_id: boq.id,
            boq_number: boq.boq_number.clone(),
            currency: boq.currency.clone(),
            item_count: items.len(),
            categories: CategoryTotals {
                materials: money(categories.materials),
                labor: money(categories.labor),
                equipment: money(categories.equipment),
                overhead: money(categories.overhead),
            },
            subtotal: money(subtotal),
            manufacturing_overhead: money(manufacturing_overhead),
            administrative_overhead: money(administrative_overhead),
            total_cost: money(total_cost),
            margin_amount: money(margin_amount),
            final_price: money(final_price),
        })
    }
}
