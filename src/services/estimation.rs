//! BOQ estimation service
//!
//! Owns the lifecycle of bills of quantities: validation, numbering year,
//! the empty-items policy and the mapping of missing rows to `NotFound`.

use chrono::{Datelike, Utc};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{
    Boq, BoqFilter, BoqItem, CostSummary, CreateBoqRequest, SummaryParams, UpdateBoqRequest,
};
use crate::error::{ApiError, ApiResult};
use crate::store::BoqStore;

/// Tunables for the estimation service
#[derive(Debug, Clone)]
pub struct EstimationPolicy {
    /// Currency used when a new BOQ does not name one
    pub default_currency: String,
    /// Whether `items: []` on update clears the BOQ instead of being rejected
    pub allow_empty_item_update: bool,
}

impl Default for EstimationPolicy {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            allow_empty_item_update: false,
        }
    }
}

#[derive(Clone)]
pub struct EstimationService {
    store: Arc<dyn BoqStore>,
    policy: EstimationPolicy,
}

impl EstimationService {
    pub fn new(store: Arc<dyn BoqStore>, policy: EstimationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn store_healthy(&self) -> bool {
        self.store.ping().await
    }

    /// Create a BOQ numbered in the current UTC year.
    pub async fn create(&self, req: CreateBoqRequest) -> ApiResult<Boq> {
        self.create_in_year(req, Utc::now().year()).await
    }

    #[instrument(skip(self, req))]
    pub async fn create_in_year(&self, req: CreateBoqRequest, year: i32) -> ApiResult<Boq> {
        let new = req.validate(&self.policy.default_currency)?;
        let item_count = new.items.len();

        let boq = self.store.insert(year, new).await?;

        tracing::info!(
            boq_id = %boq.id,
            boq_number = %boq.boq_number,
            item_count,
            estimated_value = %boq.estimated_value,
            "BOQ created"
        );

        Ok(boq)
    }

    pub async fn find_all(&self, filter: &BoqFilter) -> ApiResult<Vec<Boq>> {
        self.store.list(filter).await
    }

    pub async fn find_one(&self, id: Uuid) -> ApiResult<Boq> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApiError::boq_not_found(id))
    }

    pub async fn find_items_by_boq_id(&self, boq_id: Uuid) -> ApiResult<Vec<BoqItem>> {
        // Distinguish "no items" from "no such BOQ"
        self.find_one(boq_id).await?;
        self.store.items(boq_id).await
    }

    #[instrument(skip(self, req))]
    pub async fn update(&self, id: Uuid, req: UpdateBoqRequest) -> ApiResult<Boq> {
        let patch = req.validate(self.policy.allow_empty_item_update)?;
        let replaced_items = patch.items.as_ref().map(Vec::len);

        let boq = self
            .store
            .update(id, patch)
            .await?
            .ok_or_else(|| ApiError::boq_not_found(id))?;

        tracing::info!(
            boq_id = %boq.id,
            boq_number = %boq.boq_number,
            status = %boq.status,
            replaced_items = ?replaced_items,
            estimated_value = %boq.estimated_value,
            "BOQ updated"
        );

        Ok(boq)
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, id: Uuid) -> ApiResult<()> {
        if !self.store.delete(id).await? {
            return Err(ApiError::boq_not_found(id));
        }

        tracing::info!(boq_id = %id, "BOQ deleted");
        Ok(())
    }

    pub async fn summarize(&self, id: Uuid, params: &SummaryParams) -> ApiResult<CostSummary> {
        let boq = self.find_one(id).await?;
        let items = self.store.items(id).await?;

        Ok(CostSummary::build(&boq, &items, params)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{format_boq_number, BoqItemInput, BoqStatus, ItemCategory};
    use crate::store::MemoryBoqStore;
    use axum::http::StatusCode;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn service(policy: EstimationPolicy) -> EstimationService {
        EstimationService::new(Arc::new(MemoryBoqStore::new()), policy)
    }

    fn item(no: &str, quantity: Decimal, unit_rate: Decimal) -> BoqItemInput {
        BoqItemInput {
            item_no: no.to_string(),
            description: "RCC M25 Grade Concrete".to_string(),
            unit: "Cum".to_string(),
            quantity,
            unit_rate,
            specifications: Some("IS 456".to_string()),
            category: ItemCategory::Materials,
        }
    }

    fn request(items: Vec<BoqItemInput>) -> CreateBoqRequest {
        CreateBoqRequest {
            project_name: "Manufacturing Plant Expansion".to_string(),
            client_name: "Tata Steel Ltd.".to_string(),
            project_location: "Jamshedpur".to_string(),
            project_duration: Some("12 months".to_string()),
            currency: None,
            notes: None,
            items,
            status: None,
        }
    }

    #[tokio::test]
    async fn seventh_boq_of_the_year() {
        let svc = service(EstimationPolicy::default());
        for _ in 0..6 {
            svc.create_in_year(request(vec![item("1", dec!(1), dec!(1))]), 2025)
                .await
                .unwrap();
        }

        let boq = svc
            .create_in_year(
                request(vec![item("1", dec!(10), dec!(5)), item("2", dec!(2), dec!(100))]),
                2025,
            )
            .await
            .unwrap();

        assert_eq!(boq.boq_number, "BOQ-2025-0007");
        assert_eq!(boq.estimated_value, dec!(250));
        assert_eq!(boq.status, BoqStatus::Draft);
        assert_eq!(boq.currency, "USD");

        let items = svc.find_items_by_boq_id(boq.id).await.unwrap();
        let totals: Vec<Decimal> = items.iter().map(|i| i.total_amount).collect();
        assert_eq!(totals, vec![dec!(50), dec!(200)]);
        assert!(items.iter().all(|i| i.boq_id == boq.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_get_distinct_gap_free_numbers() {
        let svc = service(EstimationPolicy::default());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let svc = svc.clone();
                tokio::spawn(async move {
                    svc.create_in_year(request(vec![item("1", dec!(1), dec!(1))]), 2025)
                        .await
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap().unwrap().boq_number);
        }
        numbers.sort();

        let expected: Vec<String> = (1..=20).map(|n| format_boq_number(2025, n)).collect();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn create_uses_current_year() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create(request(vec![item("1", dec!(1), dec!(1))]))
            .await
            .unwrap();

        let expected = format!("BOQ-{}-0001", Utc::now().year());
        assert_eq!(boq.boq_number, expected);
    }

    #[tokio::test]
    async fn missing_boq_is_not_found_everywhere() {
        let svc = service(EstimationPolicy::default());
        let id = Uuid::new_v4();

        let errors = vec![
            svc.find_one(id).await.unwrap_err(),
            svc.find_items_by_boq_id(id).await.unwrap_err(),
            svc.update(id, UpdateBoqRequest::default()).await.unwrap_err(),
            svc.remove(id).await.unwrap_err(),
            svc.summarize(id, &SummaryParams::default()).await.unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
            assert!(err.to_string().contains(&id.to_string()));
        }
        assert!(svc.find_all(&BoqFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_items_and_estimate() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create_in_year(
                request(vec![item("1", dec!(1), dec!(10)), item("2", dec!(1), dec!(20))]),
                2025,
            )
            .await
            .unwrap();

        let updated = svc
            .update(
                boq.id,
                UpdateBoqRequest {
                    items: Some(vec![item("5", dec!(3), dec!(3))]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.estimated_value, dec!(9));
        assert_eq!(updated.boq_number, boq.boq_number);

        let items = svc.find_items_by_boq_id(boq.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_no, "5");
    }

    #[tokio::test]
    async fn update_without_items_keeps_estimate() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(4), dec!(25))]), 2025)
            .await
            .unwrap();

        let updated = svc
            .update(
                boq.id,
                UpdateBoqRequest {
                    client_name: Some("Mahindra Logistics".to_string()),
                    status: Some(BoqStatus::UnderReview),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.client_name, "Mahindra Logistics");
        assert_eq!(updated.status, BoqStatus::UnderReview);
        assert_eq!(updated.estimated_value, dec!(100));
        assert_eq!(svc.find_items_by_boq_id(boq.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn workflow_is_enforced() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(1), dec!(1))]), 2025)
            .await
            .unwrap();

        let status = |s| UpdateBoqRequest {
            status: Some(s),
            ..Default::default()
        };

        let err = svc
            .update(boq.id, status(BoqStatus::Approved))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        svc.update(boq.id, status(BoqStatus::UnderReview)).await.unwrap();
        svc.update(boq.id, status(BoqStatus::Rejected)).await.unwrap();

        let err = svc
            .update(boq.id, status(BoqStatus::Draft))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(svc.find_one(boq.id).await.unwrap().status, BoqStatus::Rejected);
    }

    #[tokio::test]
    async fn empty_items_rejected_by_default() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(2), dec!(2))]), 2025)
            .await
            .unwrap();

        let err = svc
            .update(
                boq.id,
                UpdateBoqRequest {
                    items: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(svc.find_one(boq.id).await.unwrap().estimated_value, dec!(4));
    }

    #[tokio::test]
    async fn empty_items_clear_when_allowed() {
        let svc = service(EstimationPolicy {
            allow_empty_item_update: true,
            ..Default::default()
        });
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(2), dec!(2))]), 2025)
            .await
            .unwrap();

        let updated = svc
            .update(
                boq.id,
                UpdateBoqRequest {
                    items: Some(vec![]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.estimated_value, Decimal::ZERO);
        assert!(svc.find_items_by_boq_id(boq.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_header_and_items() {
        let svc = service(EstimationPolicy::default());
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(2), dec!(2))]), 2025)
            .await
            .unwrap();

        svc.remove(boq.id).await.unwrap();

        assert_eq!(
            svc.find_one(boq.id).await.unwrap_err().status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            svc.remove(boq.id).await.unwrap_err().status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn summary_uses_stored_items() {
        let svc = service(EstimationPolicy::default());
        let mut labor = item("2", dec!(8), dec!(50));
        labor.category = ItemCategory::Labor;
        let boq = svc
            .create_in_year(request(vec![item("1", dec!(10), dec!(60)), labor]), 2025)
            .await
            .unwrap();

        let summary = svc
            .summarize(
                boq.id,
                &SummaryParams {
                    profit_margin_percent: Some(dec!(10)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(summary.categories.materials, dec!(600));
        assert_eq!(summary.categories.labor, dec!(400));
        assert_eq!(summary.subtotal, boq.estimated_value);
        assert_eq!(summary.final_price, dec!(1100));
    }
}
