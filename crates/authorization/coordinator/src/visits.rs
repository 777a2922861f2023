//! Referral visit decrement on claim submission
//!
//! A missing referral or an exhausted one is reported through
//! `decremented: false`, never as an error.

use crate::config::TieBreak;
use crate::error::AuthorizationError;
use crate::matcher::find_matching_referral;
use rcm_authorization_integrity::{Claim, Referral};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Remaining-visit count at or under which the biller is warned
pub const VISIT_WARNING_THRESHOLD: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VisitDecrement {
    pub decremented: bool,
    /// The matched referral with one more visit used
    pub updated_referral: Option<Referral>,
    pub visits_remaining: Option<u32>,
    /// Remaining visits reached zero with this claim
    pub is_last_visit: bool,
    /// Remaining visits at or under the warning threshold
    pub warning_threshold: bool,
    pub message: String,
}

impl VisitDecrement {
    fn skipped(message: String, visits_remaining: Option<u32>) -> Self {
        Self {
            decremented: false,
            updated_referral: None,
            visits_remaining,
            is_last_visit: false,
            warning_threshold: false,
            message,
        }
    }
}

/// Record one visit against the referral matching `claim`
pub fn process_claim_submission(
    claim: &Claim,
    referrals: &[Referral],
    tie_break: TieBreak,
) -> Result<VisitDecrement, AuthorizationError> {
    submit_against(claim, referrals, tie_break).map(|(result, _)| result)
}

/// `process_claim_submission` plus the index in `referrals` of the record
/// that was decremented. Ids are not assumed unique.
pub(crate) fn submit_against(
    claim: &Claim,
    referrals: &[Referral],
    tie_break: TieBreak,
) -> Result<(VisitDecrement, Option<usize>), AuthorizationError> {
    let Some(referral) = find_matching_referral(claim, referrals, tie_break)? else {
        return Ok((
            VisitDecrement::skipped(format!("No active referral found for claim {}", claim.claim_id), None),
            None,
        ));
    };

    let Some(updated) = referral.with_visit_recorded() else {
        return Ok((
            VisitDecrement::skipped(format!("Referral {} has no visits remaining", referral.authorization_no), Some(0)),
            None,
        ));
    };

    let slot = referrals.iter().position(|r| std::ptr::eq(r, referral));
    let remaining = updated.visits_remaining();
    info!(
        claim_id = %claim.claim_id,
        referral_id = %updated.referral_id,
        visits_used = updated.visits_used,
        remaining,
        "referral visit recorded"
    );

    let result = VisitDecrement {
        decremented: true,
        message: format!(
            "Visit recorded on referral {}: {} of {} visits remaining",
            updated.authorization_no, remaining, updated.num_visits
        ),
        is_last_visit: remaining == 0,
        warning_threshold: remaining <= VISIT_WARNING_THRESHOLD,
        visits_remaining: Some(remaining),
        updated_referral: Some(updated),
    };
    Ok((result, slot))
}

/// Outcome for one claim of a batch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchClaimResult {
    pub claim_id: String,
    pub outcome: Result<VisitDecrement, AuthorizationError>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<BatchClaimResult>,
    /// Every input referral, in input order, with this batch's visits applied
    pub updated_referrals: Vec<Referral>,
    pub decremented_count: usize,
}

/// Process `claims` in order against a shared working copy of `referrals`,
/// so each claim sees the visits consumed by the claims before it. A claim
/// that fails a guard clause records its error and the batch continues.
pub fn batch_process_claims(
    claims: &[Claim],
    referrals: &[Referral],
    tie_break: TieBreak,
) -> BatchOutcome {
    let mut working: Vec<Referral> = referrals.to_vec();
    let mut results = Vec::with_capacity(claims.len());
    let mut decremented_count = 0;

    for claim in claims {
        let outcome = submit_against(claim, &working, tie_break).map(|(result, slot)| {
            if let (Some(slot), Some(updated)) = (slot, &result.updated_referral) {
                working[slot] = updated.clone();
                decremented_count += 1;
            }
            result
        });
        results.push(BatchClaimResult {
            claim_id: claim.claim_id.clone(),
            outcome,
        });
    }

    info!(
        claims = claims.len(),
        decremented = decremented_count,
        "claim batch processed"
    );

    BatchOutcome {
        results,
        updated_referrals: working,
        decremented_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rcm_authorization_integrity::{AuthorizationStatus, ClaimStatus};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn referral(num_visits: u32, visits_used: u32) -> Referral {
        Referral {
            referral_id: "REF-1".to_string(),
            patient_id: "PAT-1".to_string(),
            refer_to: "Physical Therapy".to_string(),
            referring_provider_id: Some("PROV-2".to_string()),
            diagnosis: "M54.5".to_string(),
            authorization_no: "HMO-PT-1".to_string(),
            num_visits,
            visits_used,
            referral_date: date(2024, 1, 1),
            expiration_date: date(2030, 12, 31),
            status: AuthorizationStatus::Approved,
        }
    }

    fn claim(id: &str) -> Claim {
        Claim {
            claim_id: id.to_string(),
            patient_id: "PAT-1".to_string(),
            service_date: Some(date(2024, 6, 1)),
            referring_provider_id: Some("PROV-2".to_string()),
            status: ClaimStatus::Submitted,
            auth_number: None,
            auth_type: None,
        }
    }

    #[test]
    fn test_last_visit_scenario() {
        let referrals = vec![referral(3, 2)];
        let result = process_claim_submission(&claim("CLM-1"), &referrals, TieBreak::FirstMatch).unwrap();

        assert!(result.decremented);
        assert!(result.is_last_visit);
        assert!(result.warning_threshold);
        assert_eq!(result.visits_remaining, Some(0));
        let updated = result.updated_referral.unwrap();
        assert_eq!(updated.visits_used, 3);
        assert_eq!(referrals[0].visits_used, 2);
    }

    #[test]
    fn test_plenty_of_visits_left() {
        let result = process_claim_submission(&claim("CLM-1"), &[referral(10, 2)], TieBreak::FirstMatch).unwrap();
        assert!(result.decremented);
        assert!(!result.is_last_visit);
        assert!(!result.warning_threshold);
        assert_eq!(result.message, "Visit recorded on referral HMO-PT-1: 7 of 10 visits remaining");
    }

    #[test]
    fn test_no_referral_is_not_an_error() {
        let result = process_claim_submission(&claim("CLM-1"), &[], TieBreak::FirstMatch).unwrap();
        assert!(!result.decremented);
        assert!(result.updated_referral.is_none());
        assert!(result.message.contains("CLM-1"));
    }

    #[test]
    fn test_exhausted_referral_not_decremented() {
        let result = process_claim_submission(&claim("CLM-1"), &[referral(2, 2)], TieBreak::FirstMatch).unwrap();
        assert!(!result.decremented);
    }

    #[test]
    fn test_batch_sees_earlier_decrements() {
        let claims = vec![claim("CLM-1"), claim("CLM-2"), claim("CLM-3")];
        let outcome = batch_process_claims(&claims, &[referral(2, 0)], TieBreak::FirstMatch);

        assert_eq!(outcome.decremented_count, 2);
        assert_eq!(outcome.updated_referrals[0].visits_used, 2);

        let first = outcome.results[0].outcome.as_ref().unwrap();
        assert!(first.decremented && !first.is_last_visit && first.warning_threshold);
        let second = outcome.results[1].outcome.as_ref().unwrap();
        assert!(second.decremented && second.is_last_visit);
        let third = outcome.results[2].outcome.as_ref().unwrap();
        assert!(!third.decremented);
    }

    #[test]
    fn test_batch_with_shared_referral_id_updates_matched_record() {
        let mut nearly_spent = referral(3, 2);
        nearly_spent.referral_id = "REF-X".to_string();
        nearly_spent.authorization_no = "AUTH-A".to_string();
        let mut fresh = referral(3, 0);
        fresh.referral_id = "REF-X".to_string();
        fresh.authorization_no = "AUTH-B".to_string();

        let claims = vec![claim("CLM-1"), claim("CLM-2")];
        let outcome = batch_process_claims(&claims, &[nearly_spent, fresh], TieBreak::FirstMatch);

        let first = outcome.results[0].outcome.as_ref().unwrap();
        assert_eq!(first.updated_referral.as_ref().unwrap().authorization_no, "AUTH-A");
        let second = outcome.results[1].outcome.as_ref().unwrap();
        assert_eq!(second.updated_referral.as_ref().unwrap().authorization_no, "AUTH-B");

        let used: Vec<(&str, u32)> = outcome
            .updated_referrals
            .iter()
            .map(|r| (r.authorization_no.as_str(), r.visits_used))
            .collect();
        assert_eq!(used, vec![("AUTH-A", 3), ("AUTH-B", 1)]);
        assert_eq!(outcome.decremented_count, 2);
    }

    #[test]
    fn test_batch_continues_past_bad_claim() {
        let mut bad = claim("CLM-BAD");
        bad.service_date = None;
        let claims = vec![bad, claim("CLM-OK")];
        let outcome = batch_process_claims(&claims, &[referral(5, 0)], TieBreak::FirstMatch);

        assert!(matches!(
            outcome.results[0].outcome,
            Err(AuthorizationError::MissingServiceDate { .. })
        ));
        assert!(outcome.results[1].outcome.as_ref().unwrap().decremented);
        assert_eq!(outcome.updated_referrals[0].visits_used, 1);
    }
}
