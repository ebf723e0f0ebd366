//! Single-lead unlock status queries.

use leadgate_core::{LeadId, LeadgateResult, UnlockStatus, UserId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ledger::{LeadCatalog, VisitLedger};

/// Answers "is this lead unlocked for this user, and what does it reveal?".
///
/// Pure read path: it never writes to the ledger. A missing visit is a normal
/// outcome and resolves to [`UnlockStatus::locked`].
pub struct UnlockStatusResolver<L: ?Sized, C: ?Sized> {
    ledger: Arc<L>,
    catalog: Arc<C>,
}

impl<L: ?Sized, C: ?Sized> Clone for UnlockStatusResolver<L, C> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            catalog: Arc::clone(&self.catalog),
        }
    }
}

impl<L, C> UnlockStatusResolver<L, C>
where
    L: VisitLedger + ?Sized,
    C: LeadCatalog + ?Sized,
{
    pub fn new(ledger: Arc<L>, catalog: Arc<C>) -> Self {
        Self { ledger, catalog }
    }

    /// Resolve the unlock status of one lead.
    pub async fn resolve(&self, user_id: UserId, lead_id: LeadId) -> LeadgateResult<UnlockStatus> {
        let Some(visit) = self.ledger.find_visit(user_id, lead_id).await? else {
            return Ok(UnlockStatus::locked());
        };
        if !visit.unlocked {
            return Ok(UnlockStatus::locked());
        }

        let unlock_value = self
            .catalog
            .get_lead(lead_id)
            .await?
            .and_then(|lead| lead.unlock_value);
        Ok(UnlockStatus::unlocked(unlock_value))
    }

    /// Resolve several leads at once, preserving input order.
    ///
    /// Reads the user's unlocked visits once and fetches catalog rows only for
    /// the leads that turn out to be unlocked.
    pub async fn resolve_many(
        &self,
        user_id: UserId,
        lead_ids: &[LeadId],
    ) -> LeadgateResult<Vec<(LeadId, UnlockStatus)>> {
        if lead_ids.is_empty() {
            return Ok(Vec::new());
        }

        let unlocked: Vec<LeadId> = self
            .ledger
            .list_unlocked(user_id)
            .await?
            .into_iter()
            .map(|v| v.lead_id)
            .filter(|id| lead_ids.contains(id))
            .collect();

        let values: HashMap<LeadId, Option<String>> = self
            .catalog
            .get_leads(&unlocked)
            .await?
            .into_iter()
            .map(|lead| (lead.lead_id, lead.unlock_value))
            .collect();

        Ok(lead_ids
            .iter()
            .map(|id| {
                let status = if unlocked.contains(id) {
                    UnlockStatus::unlocked(values.get(id).cloned().flatten())
                } else {
                    UnlockStatus::locked()
                };
                (*id, status)
            })
            .collect())
    }
}
