//! In-process store used when no database is configured

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::BoqStore;
use crate::domain::{format_boq_number, Boq, BoqFilter, BoqItem, BoqPatch, NewBoq, NewBoqItem};
use crate::error::ApiResult;

#[derive(Default)]
struct Tables {
    /// Headers in insertion order
    boqs: Vec<Boq>,
    items: Vec<BoqItem>,
    sequences: HashMap<i32, u32>,
}

impl Tables {
    fn replace_items(&mut self, boq_id: Uuid, items: &[NewBoqItem]) {
        self.items.retain(|item| item.boq_id != boq_id);
        self.items
            .extend(items.iter().map(|input| to_item(boq_id, input)));
    }
}

fn to_item(boq_id: Uuid, input: &NewBoqItem) -> BoqItem {
    BoqItem {
        id: Uuid::new_v4(),
        boq_id,
        item_no: input.item_no.clone(),
        description: input.description.clone(),
        unit: input.unit.clone(),
        quantity: input.quantity,
        unit_rate: input.unit_rate,
        total_amount: input.total_amount,
        specifications: input.specifications.clone(),
        category: input.category,
    }
}

/// BOQ store backed by process memory
#[derive(Default)]
pub struct MemoryBoqStore {
    tables: Mutex<Tables>,
}

impl MemoryBoqStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BoqStore for MemoryBoqStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn insert(&self, year: i32, new: NewBoq) -> ApiResult<Boq> {
        let mut tables = self.tables.lock();

        let sequence = tables.sequences.entry(year).or_insert(0);
        *sequence += 1;
        let boq_number = format_boq_number(year, *sequence);

        let now = Utc::now();
        let boq = Boq {
            id: Uuid::new_v4(),
            boq_number,
            project_name: new.project_name,
            client_name: new.client_name,
            project_location: new.project_location,
            project_duration: new.project_duration,
            currency: new.currency,
            estimated_value: new.estimated_value,
            notes: new.notes,
            status: new.status,
            created_at: now,
            updated_at: now,
        };

        tables.replace_items(boq.id, &new.items);
        tables.boqs.push(boq.clone());

        Ok(boq)
    }

    async fn list(&self, filter: &BoqFilter) -> ApiResult<Vec<Boq>> {
        let tables = self.tables.lock();

        // Reverse insertion order breaks created_at ties newest-first
        let mut boqs: Vec<Boq> = tables
            .boqs
            .iter()
            .rev()
            .filter(|boq| filter.matches(boq))
            .cloned()
            .collect();
        boqs.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(boqs)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Boq>> {
        let tables = self.tables.lock();
        Ok(tables.boqs.iter().find(|boq| boq.id == id).cloned())
    }

    async fn items(&self, boq_id: Uuid) -> ApiResult<Vec<BoqItem>> {
        let tables = self.tables.lock();

        let mut items: Vec<BoqItem> = tables
            .items
            .iter()
            .filter(|item| item.boq_id == boq_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.item_no.cmp(&b.item_no));

        Ok(items)
    }

    async fn update(&self, id: Uuid, patch: BoqPatch) -> ApiResult<Option<Boq>> {
        let mut tables = self.tables.lock();

        let Some(index) = tables.boqs.iter().position(|boq| boq.id == id) else {
            return Ok(None);
        };

        // Work on a copy so a rejected patch leaves nothing behind
        let mut boq = tables.boqs[index].clone();
        patch.apply(&mut boq)?;
        boq.updated_at = Utc::now();

        if let Some(items) = &patch.items {
            tables.replace_items(id, items);
        }
        tables.boqs[index] = boq.clone();

        Ok(Some(boq))
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        let mut tables = self.tables.lock();

        let before = tables.boqs.len();
        tables.boqs.retain(|boq| boq.id != id);
        if tables.boqs.len() == before {
            return Ok(false);
        }
        tables.items.retain(|item| item.boq_id != id);

        Ok(true)
    }
}
