//! PostgreSQL store
//!
//! Header and item writes share one transaction. BOQ numbers come from the
//! `boq_sequences` counter row, which the upsert increments atomically.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::BoqStore;
use crate::domain::{format_boq_number, Boq, BoqFilter, BoqItem, BoqPatch, NewBoq, NewBoqItem};
use crate::error::ApiResult;

/// BOQ store backed by PostgreSQL
#[derive(Clone)]
pub struct PgBoqStore {
    pool: PgPool,
}

impl PgBoqStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `ILIKE` pattern matching `term` literally anywhere in the column
fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Bulk-insert a BOQ's items
async fn insert_items(
    conn: &mut PgConnection,
    boq_id: Uuid,
    items: &[NewBoqItem],
) -> Result<(), sqlx::Error> {
    if items.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
        "INSERT INTO boq_items (id, boq_id, item_no, description, unit, quantity, unit_rate, specifications, category) ",
    );
    builder.push_values(items, |mut row, item| {
        row.push_bind(Uuid::new_v4())
            .push_bind(boq_id)
            .push_bind(item.item_no.clone())
            .push_bind(item.description.clone())
            .push_bind(item.unit.clone())
            .push_bind(item.quantity)
            .push_bind(item.unit_rate)
            .push_bind(item.specifications.clone())
            .push_bind(item.category);
    });
    builder.build().execute(conn).await?;

    Ok(())
}

#[async_trait]
impl BoqStore for PgBoqStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> bool {
        crate::db::health_check(&self.pool).await
    }

    async fn insert(&self, year: i32, new: NewBoq) -> ApiResult<Boq> {
        let mut tx = self.pool.begin().await?;

        let sequence: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO boq_sequences (year, last_value)
            VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = boq_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;

        let sequence = u32::try_from(sequence).context("boq_sequences counter is negative")?;
        let boq_number = format_boq_number(year, sequence);

        let boq = sqlx::query_as::<_, Boq>(
            r#"
            INSERT INTO boq (id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&boq_number)
        .bind(&new.project_name)
        .bind(&new.client_name)
        .bind(&new.project_location)
        .bind(&new.project_duration)
        .bind(&new.currency)
        .bind(new.estimated_value)
        .bind(&new.notes)
        .bind(new.status)
        .fetch_one(&mut *tx)
        .await?;

        insert_items(&mut *tx, boq.id, &new.items).await?;

        tx.commit().await?;

        Ok(boq)
    }

    async fn list(&self, filter: &BoqFilter) -> ApiResult<Vec<Boq>> {
        let pattern = filter.search_term().map(contains_pattern);

        let boqs = sqlx::query_as::<_, Boq>(
            r#"
            SELECT id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status, created_at, updated_at
            FROM boq
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL
                   OR project_name ILIKE $2 ESCAPE '\'
                   OR client_name ILIKE $2 ESCAPE '\'
                   OR boq_number ILIKE $2 ESCAPE '\')
            ORDER BY created_at DESC, insert_seq DESC
            "#,
        )
        .bind(filter.status)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(boqs)
    }

    async fn get(&self, id: Uuid) -> ApiResult<Option<Boq>> {
        let boq = sqlx::query_as::<_, Boq>(
            r#"
            SELECT id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status, created_at, updated_at
            FROM boq
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(boq)
    }

    async fn items(&self, boq_id: Uuid) -> ApiResult<Vec<BoqItem>> {
        let items = sqlx::query_as::<_, BoqItem>(
            r#"
            SELECT id, boq_id, item_no, description, unit, quantity, unit_rate, total_amount, specifications, category
            FROM boq_items
            WHERE boq_id = $1
            ORDER BY item_no COLLATE "C" ASC
            "#,
        )
        .bind(boq_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    async fn update(&self, id: Uuid, patch: BoqPatch) -> ApiResult<Option<Boq>> {
        let mut tx = self.pool.begin().await?;

        // Row lock serializes concurrent item replacements on one BOQ
        let current = sqlx::query_as::<_, Boq>(
            r#"
            SELECT id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status, created_at, updated_at
            FROM boq
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(mut boq) = current else {
            return Ok(None);
        };

        patch.apply(&mut boq)?;

        if let Some(items) = &patch.items {
            sqlx::query("DELETE FROM boq_items WHERE boq_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_items(&mut *tx, id, items).await?;
        }

        let updated = sqlx::query_as::<_, Boq>(
            r#"
            UPDATE boq
            SET project_name = $2,
                client_name = $3,
                project_location = $4,
                project_duration = $5,
                currency = $6,
                estimated_value = $7,
                notes = $8,
                status = $9,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, boq_number, project_name, client_name, project_location, project_duration, currency, estimated_value, notes, status, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(&boq.project_name)
        .bind(&boq.client_name)
        .bind(&boq.project_location)
        .bind(&boq.project_duration)
        .bind(&boq.currency)
        .bind(boq.estimated_value)
        .bind(&boq.notes)
        .bind(boq.status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(updated))
    }

    async fn delete(&self, id: Uuid) -> ApiResult<bool> {
        // boq_items rows go with the header via ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM boq WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoqStatus, ItemCategory};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn line(no: &str, quantity: Decimal, unit_rate: Decimal) -> NewBoqItem {
        NewBoqItem {
            item_no: no.to_string(),
            description: format!("Item {no}"),
            unit: "Cum".to_string(),
            quantity,
            unit_rate,
            total_amount: quantity * unit_rate,
            specifications: None,
            category: ItemCategory::Materials,
        }
    }

    fn new_boq(name: &str, items: Vec<NewBoqItem>) -> NewBoq {
        NewBoq {
            project_name: name.to_string(),
            client_name: "Mahindra Logistics".to_string(),
            project_location: "Pune".to_string(),
            project_duration: None,
            currency: "INR".to_string(),
            notes: None,
            status: BoqStatus::Draft,
            estimated_value: crate::domain::estimated_value(&items).unwrap(),
            items,
        }
    }

    async fn count(pool: &PgPool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("plant"), "%plant%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn numbers_follow_the_year_counter(pool: PgPool) {
        let store = PgBoqStore::new(pool.clone());

        let a = store.insert(2025, new_boq("A", vec![])).await.unwrap();
        let b = store.insert(2025, new_boq("B", vec![])).await.unwrap();
        let c = store.insert(2026, new_boq("C", vec![])).await.unwrap();

        assert_eq!(a.boq_number, "BOQ-2025-0001");
        assert_eq!(b.boq_number, "BOQ-2025-0002");
        assert_eq!(c.boq_number, "BOQ-2026-0001");

        let last: i32 = sqlx::query_scalar("SELECT last_value FROM boq_sequences WHERE year = 2025")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(last, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn item_totals_come_from_the_generated_column(pool: PgPool) {
        let store = PgBoqStore::new(pool);
        let items = vec![line("2.0", dec!(4.2), dec!(2.5)), line("1.0", dec!(10), dec!(5))];
        let boq = store.insert(2025, new_boq("A", items)).await.unwrap();
        assert_eq!(boq.estimated_value, dec!(60.5));

        let stored = store.items(boq.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].item_no, "1.0");
        assert_eq!(stored[0].total_amount, dec!(50));
        assert_eq!(stored[1].total_amount, dec!(10.5));
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn delete_cascades_to_items(pool: PgPool) {
        let store = PgBoqStore::new(pool.clone());
        let boq = store
            .insert(2025, new_boq("A", vec![line("1", dec!(1), dec!(1))]))
            .await
            .unwrap();

        assert!(store.delete(boq.id).await.unwrap());
        assert!(store.get(boq.id).await.unwrap().is_none());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM boq_items").await, 0);
        assert!(!store.delete(boq.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn failed_item_insert_rolls_back_header_and_counter(pool: PgPool) {
        let store = PgBoqStore::new(pool.clone());
        let items = vec![line("1", dec!(1), dec!(1)), line("1", dec!(2), dec!(2))];

        let err = store.insert(2025, new_boq("A", items)).await.unwrap_err();
        assert!(matches!(err, crate::error::ApiError::Conflict(_)));

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM boq").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM boq_sequences").await, 0);

        let next = store.insert(2025, new_boq("B", vec![])).await.unwrap();
        assert_eq!(next.boq_number, "BOQ-2025-0001");
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn negative_counter_is_an_internal_error(pool: PgPool) {
        sqlx::query("INSERT INTO boq_sequences (year, last_value) VALUES (2025, -5)")
            .execute(&pool)
            .await
            .unwrap();
        let store = PgBoqStore::new(pool.clone());

        let err = store.insert(2025, new_boq("A", vec![])).await.unwrap_err();
        assert!(matches!(err, crate::error::ApiError::Internal(_)));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM boq").await, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn created_at_ties_list_later_insert_first(pool: PgPool) {
        sqlx::query("INSERT INTO boq_sequences (year, last_value) VALUES (2025, 9998)")
            .execute(&pool)
            .await
            .unwrap();
        let store = PgBoqStore::new(pool.clone());
        store.insert(2025, new_boq("A", vec![])).await.unwrap();
        store.insert(2025, new_boq("B", vec![])).await.unwrap();
        sqlx::query("UPDATE boq SET created_at = '2025-03-01T00:00:00Z'")
            .execute(&pool)
            .await
            .unwrap();

        let numbers: Vec<String> = store
            .list(&BoqFilter::default())
            .await
            .unwrap()
            .into_iter()
            .map(|boq| boq.boq_number)
            .collect();
        assert_eq!(numbers, vec!["BOQ-2025-10000", "BOQ-2025-9999"]);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires PostgreSQL at DATABASE_URL"]
    async fn search_matches_wildcards_literally(pool: PgPool) {
        let store = PgBoqStore::new(pool);
        store.insert(2025, new_boq("Plant_A", vec![])).await.unwrap();
        store.insert(2025, new_boq("PlantB", vec![])).await.unwrap();

        let filter = BoqFilter {
            status: None,
            search: Some("_".to_string()),
        };
        let names: Vec<String> = store
            .list(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|boq| boq.project_name)
            .collect();
        assert_eq!(names, vec!["Plant_A"]);

        let all = store.list(&BoqFilter::default()).await.unwrap();
        assert_eq!(all[0].project_name, "PlantB");
    }
}
