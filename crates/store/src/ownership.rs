use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OwnershipInfo;

use crate::Result;

#[async_trait]
pub trait OwnershipInfoRepository: Send + Sync {
    /// Inserts or replaces the grant with the same identifier.
    async fn save_by_identifier(&self, info: &OwnershipInfo) -> Result<()>;

    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<OwnershipInfo>>;

    /// Ends every still-valid grant of the order at `owned_through`.
    /// Returns how many grants changed.
    async fn invalidate_by_order_number(
        &self,
        order_number: &str,
        owned_through: DateTime<Utc>,
    ) -> Result<u64>;
}
