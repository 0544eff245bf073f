//! Payment Session Surcharges
//!
//! Tracks the base amount of each payment session created through the
//! harness, the surcharge computed for the card the shopper entered, and
//! validates the amount sent on submission.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{FlowError, Result};

/// Flat surcharge for commercial cards, in minor currency units
pub const COMMERCIAL_SURCHARGE: i64 = 100;

/// Surcharge owed for a card category
pub fn surcharge_for(card_category: &str) -> i64 {
    if card_category == "commercial" {
        COMMERCIAL_SURCHARGE
    } else {
        0
    }
}

/// Stored amounts for one payment session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSurcharge {
    pub session_id: String,
    pub base_amount: i64,
    pub surcharge_amount: i64,
}

impl SessionSurcharge {
    pub fn new(session_id: impl Into<String>, base_amount: i64) -> Self {
        Self {
            session_id: session_id.into(),
            base_amount,
            surcharge_amount: 0,
        }
    }

    /// Amount the shopper must be charged
    pub const fn total_amount(&self) -> i64 {
        self.base_amount + self.surcharge_amount
    }
}

/// Result of a surcharge calculation, as returned to the browser
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurchargeQuote {
    pub surcharge_amount: i64,
    pub base_amount: i64,
    pub total_amount: i64,
}

impl From<&SessionSurcharge> for SurchargeQuote {
    fn from(entry: &SessionSurcharge) -> Self {
        Self {
            surcharge_amount: entry.surcharge_amount,
            base_amount: entry.base_amount,
            total_amount: entry.total_amount(),
        }
    }
}

/// In-memory session store
///
/// Entries live for the lifetime of the process. Concurrent calculations
/// for the same session are not coordinated; the last write wins.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionSurcharge>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created session with no surcharge
    pub fn put(&self, session_id: impl Into<String>, base_amount: i64) {
        let entry = SessionSurcharge::new(session_id, base_amount);
        tracing::debug!(
            session_id = %entry.session_id,
            base_amount,
            "Stored payment session amount"
        );

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(entry.session_id.clone(), entry);
    }

    /// Compute and store the surcharge for the card category in use
    pub fn calculate_surcharge(&self, session_id: &str, card_category: &str) -> Result<SurchargeQuote> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        entry.surcharge_amount = surcharge_for(card_category);

        tracing::info!(
            session_id,
            card_category,
            surcharge_amount = entry.surcharge_amount,
            total_amount = entry.total_amount(),
            "Calculated surcharge"
        );

        Ok(SurchargeQuote::from(&*entry))
    }

    /// Check a submission amount against base plus surcharge
    ///
    /// Returns the expected total. The entry is kept; it is removed only
    /// once the upstream submission succeeds.
    pub fn validate_amount(&self, session_id: &str, amount: i64) -> Result<i64> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| FlowError::SessionNotFound(session_id.to_string()))?;

        let expected = entry.total_amount();
        if amount != expected {
            tracing::warn!(session_id, expected, received = amount, "Submission amount mismatch");
            return Err(FlowError::AmountMismatch {
                expected,
                received: amount,
            });
        }

        Ok(expected)
    }

    /// Drop a session after a successful submission
    pub fn remove(&self, session_id: &str) -> Option<SessionSurcharge> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id)
    }

    pub fn get(&self, session_id: &str) -> Option<SessionSurcharge> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
