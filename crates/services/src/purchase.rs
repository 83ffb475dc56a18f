use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use history_core::model::{EventId, ProgressRecord, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::PurchaseError;
use crate::progress_store::ProgressStore;

/// Checkout's signal that an attempt pack was paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptPackPurchased {
    pub purchase_id: Uuid,
    pub user_id: UserId,
    pub event_id: EventId,
    pub quantity: u32,
}

impl AttemptPackPurchased {
    #[must_use]
    pub fn new(user_id: UserId, event_id: EventId, quantity: u32) -> Self {
        Self {
            purchase_id: Uuid::new_v4(),
            user_id,
            event_id,
            quantity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PurchaseApplied {
    Granted(ProgressRecord),
    /// This purchase id was already applied.
    Duplicate,
}

/// Applies completed purchases to progress exactly once per purchase id.
#[derive(Clone)]
pub struct PurchaseBridge {
    store: ProgressStore,
    applied: Arc<Mutex<HashSet<Uuid>>>,
}

impl PurchaseBridge {
    #[must_use]
    pub fn new(store: ProgressStore) -> Self {
        Self {
            store,
            applied: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// # Errors
    ///
    /// Returns `PurchaseError::InvalidQuantity` for empty packs,
    /// `PurchaseError::Disabled` when packs are not offered, or
    /// `PurchaseError::Progress` if the grant could not be stored.
    pub async fn on_purchase_completed(
        &self,
        purchase: &AttemptPackPurchased,
    ) -> Result<PurchaseApplied, PurchaseError> {
        if purchase.quantity == 0 {
            return Err(PurchaseError::InvalidQuantity);
        }
        if !self.store.policy().attempt_packs_enabled() {
            return Err(PurchaseError::Disabled);
        }
        if !self.claim(purchase.purchase_id) {
            return Ok(PurchaseApplied::Duplicate);
        }

        match self
            .store
            .grant_extra_attempts(purchase.user_id, purchase.event_id, purchase.quantity)
            .await
        {
            Ok(record) => {
                info!(
                    purchase_id = %purchase.purchase_id,
                    user_id = %purchase.user_id,
                    event_id = %purchase.event_id,
                    quantity = purchase.quantity,
                    "attempt pack applied"
                );
                Ok(PurchaseApplied::Granted(record))
            }
            Err(err) => {
                // Let a redelivery try again.
                self.release(purchase.purchase_id);
                Err(err.into())
            }
        }
    }

    /// Drain `rx` until every sender is dropped. Returns how many purchases
    /// were granted.
    pub async fn listen(&self, mut rx: mpsc::Receiver<AttemptPackPurchased>) -> usize {
        let mut granted = 0;
        while let Some(purchase) = rx.recv().await {
            match self.on_purchase_completed(&purchase).await {
                Ok(PurchaseApplied::Granted(_)) => granted += 1,
                Ok(PurchaseApplied::Duplicate) => {
                    info!(purchase_id = %purchase.purchase_id, "duplicate purchase ignored");
                }
                Err(err) => {
                    warn!(purchase_id = %purchase.purchase_id, error = %err, "purchase not applied");
                }
            }
        }
        granted
    }

    fn claim(&self, id: Uuid) -> bool {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id)
    }

    fn release(&self, id: Uuid) {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}
