//! Persistence for bills of quantities
//!
//! Every method is a single atomic unit: a header and its items are never
//! observable in a half-written state.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Boq, BoqFilter, BoqItem, BoqPatch, NewBoq};
use crate::error::ApiResult;

pub use memory::MemoryBoqStore;
pub use postgres::PgBoqStore;

#[async_trait]
pub trait BoqStore: Send + Sync {
    /// Short backend name reported by the health check.
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> bool;

    /// Allocates the next number for `year` and inserts header and items.
    async fn insert(&self, year: i32, boq: NewBoq) -> ApiResult<Boq>;

    /// Headers matching `filter`, newest first.
    async fn list(&self, filter: &BoqFilter) -> ApiResult<Vec<Boq>>;

    async fn get(&self, id: Uuid) -> ApiResult<Option<Boq>>;

    /// Items of a BOQ ordered by item number.
    async fn items(&self, boq_id: Uuid) -> ApiResult<Vec<BoqItem>>;

    /// Applies `patch` under a lock on the header. Returns `None` when the
    /// BOQ does not exist.
    async fn update(&self, id: Uuid, patch: BoqPatch) -> ApiResult<Option<Boq>>;

    /// Deletes a header and its items. Returns `false` when nothing matched.
    async fn delete(&self, id: Uuid) -> ApiResult<bool>;
}
