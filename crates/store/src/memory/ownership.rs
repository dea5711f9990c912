use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::OwnershipInfo;
use tokio::sync::RwLock;

use crate::{OwnershipInfoRepository, Result};

#[derive(Clone, Default)]
pub struct InMemoryOwnershipInfoRepository {
    infos: Arc<RwLock<HashMap<String, OwnershipInfo>>>,
}

impl InMemoryOwnershipInfoRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnershipInfoRepository for InMemoryOwnershipInfoRepository {
    async fn save_by_identifier(&self, info: &OwnershipInfo) -> Result<()> {
        self.infos
            .write()
            .await
            .insert(info.identifier.clone(), info.clone());
        Ok(())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Vec<OwnershipInfo>> {
        let infos = self.infos.read().await;
        let mut found: Vec<OwnershipInfo> = infos
            .values()
            .filter(|info| info.order_number == order_number)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        Ok(found)
    }

    async fn invalidate_by_order_number(
        &self,
        order_number: &str,
        owned_through: DateTime<Utc>,
    ) -> Result<u64> {
        let mut infos = self.infos.write().await;
        let mut changed = 0;
        for info in infos.values_mut() {
            if info.order_number == order_number
                && info.owned_through.is_none_or(|through| through > owned_through)
            {
                info.owned_through = Some(owned_through);
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{Agent, ReservedSeat, Seller};

    fn info(order_number: &str, reservation_id: &str, owned_from: DateTime<Utc>) -> OwnershipInfo {
        OwnershipInfo {
            identifier: format!("{order_number}-{reservation_id}"),
            order_number: order_number.to_string(),
            owned_by: Agent::new("customer-1"),
            acquired_from: Seller {
                id: "seller-1".to_string(),
                name: "Cinema".to_string(),
                email: "box-office@example.com".to_string(),
            },
            type_of_good: ReservedSeat {
                reservation_id: reservation_id.to_string(),
                event_id: "event-1".to_string(),
                seat_number: "A-1".to_string(),
            },
            owned_from,
            owned_through: None,
        }
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let repo = InMemoryOwnershipInfoRepository::new();
        let now = Utc::now();
        repo.save_by_identifier(&info("N-1", "r1", now)).await.unwrap();
        repo.save_by_identifier(&info("N-1", "r1", now)).await.unwrap();
        repo.save_by_identifier(&info("N-1", "r2", now)).await.unwrap();

        assert_eq!(repo.find_by_order_number("N-1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_ends_validity() {
        let repo = InMemoryOwnershipInfoRepository::new();
        let owned_from = Utc::now() - Duration::days(1);
        repo.save_by_identifier(&info("N-1", "r1", owned_from)).await.unwrap();
        repo.save_by_identifier(&info("N-2", "r1", owned_from)).await.unwrap();

        let now = Utc::now();
        assert_eq!(repo.invalidate_by_order_number("N-1", now).await.unwrap(), 1);
        // Already invalid at this instant.
        assert_eq!(repo.invalidate_by_order_number("N-1", now).await.unwrap(), 0);

        let infos = repo.find_by_order_number("N-1").await.unwrap();
        assert!(!infos[0].is_valid_at(now));
        let others = repo.find_by_order_number("N-2").await.unwrap();
        assert!(others[0].is_valid_at(now));
    }
}
