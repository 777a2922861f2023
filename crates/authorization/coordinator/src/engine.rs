//! Authorization engine
//!
//! Binds the pure rules to an injected clock, session and audit log. Each
//! call that gets past the claim guard clauses records one audit event.

use crate::config::AuthorizationConfig;
use crate::dataset::Dataset;
use crate::error::AuthorizationError;
use crate::expiry::{get_expiring_authorizations, ExpiringAuthorization};
use crate::populate::auto_populate_auth_number;
use crate::validator::{validate_claim_authorization, AuthorizationValidation};
use crate::visits::{batch_process_claims, submit_against, BatchOutcome, VisitDecrement};
use rcm_authorization_integrity::{AuthType, Claim};
use rcm_shared::{AuditAction, AuditEvent, AuditLog, Clock, NoopAuditLog, SessionContext, SystemClock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

pub struct AuthorizationEngine {
    config: AuthorizationConfig,
    session: SessionContext,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditLog>,
    /// Sequence number of the next audit event from this engine
    event_seq: AtomicU64,
}

impl AuthorizationEngine {
    /// Wall clock, no audit trail
    pub fn new(config: AuthorizationConfig, session: SessionContext) -> Self {
        Self {
            config,
            session,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditLog),
            event_seq: AtomicU64::new(0),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn populate(&self, claim: &Claim, dataset: &Dataset) -> Result<Claim, AuthorizationError> {
        let populated = auto_populate_auth_number(
            claim,
            &dataset.referrals,
            &dataset.service_authorizations,
            &dataset.line_items,
            self.config.tie_break,
        )?;

        let detail = match (&populated.auth_type, &populated.auth_number) {
            (Some(kind), Some(number)) => format!("{} {}", kind, number),
            _ => "no authorization found".to_string(),
        };
        self.audit(AuditAction::AuthNumberPopulated, Some(&claim.claim_id), detail);
        Ok(populated)
    }

    pub fn validate(&self, claim: &Claim, dataset: &Dataset) -> Result<AuthorizationValidation, AuthorizationError> {
        let validation = validate_claim_authorization(
            claim,
            &dataset.referrals,
            &dataset.service_authorizations,
            &dataset.line_items,
            self.clock.now(),
            &self.config,
        )?;

        self.audit(
            AuditAction::ClaimAuthorizationValidated,
            Some(&claim.claim_id),
            format!(
                "valid={} errors={} warnings={}",
                validation.valid,
                validation.errors.len(),
                validation.warnings.len()
            ),
        );
        Ok(validation)
    }

    /// Decrement the matching referral and write it back into `dataset`
    pub fn submit(&self, claim: &Claim, dataset: &mut Dataset) -> Result<VisitDecrement, AuthorizationError> {
        let (result, slot) = submit_against(claim, &dataset.referrals, self.config.tie_break)?;

        match (&result.updated_referral, slot) {
            (Some(updated), Some(slot)) => {
                dataset.referrals[slot] = updated.clone();
                self.audit(AuditAction::VisitDecremented, Some(&claim.claim_id), result.message.clone());
            }
            _ => {
                self.audit(AuditAction::VisitDecrementSkipped, Some(&claim.claim_id), result.message.clone());
            }
        }
        Ok(result)
    }

    /// Decrement for every claim in order and replace `dataset.referrals`
    /// with the result
    pub fn submit_batch(&self, claims: &[Claim], dataset: &mut Dataset) -> BatchOutcome {
        let outcome = batch_process_claims(claims, &dataset.referrals, self.config.tie_break);
        dataset.replace_referrals(outcome.updated_referrals.clone());

        let rejected = outcome.results.iter().filter(|r| r.outcome.is_err()).count();
        self.audit(
            AuditAction::BatchProcessed,
            None,
            format!(
                "claims={} decremented={} rejected={}",
                claims.len(),
                outcome.decremented_count,
                rejected
            ),
        );
        outcome
    }

    pub fn expiring(&self, dataset: &Dataset) -> Vec<ExpiringAuthorization> {
        let rows = get_expiring_authorizations(
            &dataset.referrals,
            &dataset.service_authorizations,
            self.clock.now(),
            self.config.expiring_window_days,
        );

        let referrals = rows.iter().filter(|r| r.auth_type == AuthType::Referral).count();
        self.audit(
            AuditAction::ExpirationScan,
            None,
            format!(
                "referrals={} service_authorizations={} window_days={}",
                referrals,
                rows.len() - referrals,
                self.config.expiring_window_days
            ),
        );
        rows
    }

    fn audit(&self, action: AuditAction, subject_id: Option<&str>, detail: String) {
        let event = AuditEvent::new(
            &self.session,
            action,
            subject_id.map(str::to_string),
            detail,
            self.clock.now(),
            self.event_seq.fetch_add(1, Ordering::Relaxed),
        );
        if let Err(err) = self.audit.record(event) {
            warn!(?action, error = %err, "audit event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rcm_shared::{FixedClock, InMemoryAuditLog, UserRole};

    fn engine(log: Arc<InMemoryAuditLog>) -> AuthorizationEngine {
        AuthorizationEngine::new(
            AuthorizationConfig::default(),
            SessionContext::new("u-42", "Pat Coordinator", UserRole::AuthorizationCoordinator),
        )
        .with_clock(Arc::new(FixedClock::at_date(NaiveDate::from_ymd_opt(2026, 10, 14).unwrap())))
        .with_audit_log(log)
    }

    #[test]
    fn test_submit_writes_back_and_audits() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = engine(log.clone());
        let mut dataset = Dataset::demo().unwrap();
        let claim = dataset.claim("CLM-5001").unwrap().clone();

        let result = engine.submit(&claim, &mut dataset).unwrap();
        assert!(result.decremented);
        assert!(result.is_last_visit);

        let stored = dataset.referrals.iter().find(|r| r.referral_id == "REF-2001").unwrap();
        assert_eq!(stored.visits_used, 3);

        // exhausted now, so a second submission is skipped
        let again = engine.submit(&claim, &mut dataset).unwrap();
        assert!(!again.decremented);

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].action, AuditAction::VisitDecremented);
        assert_eq!(events[1].action, AuditAction::VisitDecrementSkipped);
        assert_eq!(events[0].actor_id, "u-42");
        assert_eq!(events[0].actor_role, UserRole::AuthorizationCoordinator);
    }

    #[test]
    fn test_submit_with_shared_referral_id_writes_matched_slot() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = engine(log);
        let mut dataset = Dataset::demo().unwrap();
        let mut twin = dataset.referrals[0].clone();
        twin.authorization_no = "HMO-REF-TWIN".to_string();
        twin.visits_used = 0;
        dataset.referrals.push(twin);
        let claim = dataset.claim("CLM-5001").unwrap().clone();

        engine.submit(&claim, &mut dataset).unwrap();
        let second = engine.submit(&claim, &mut dataset).unwrap();
        assert_eq!(second.updated_referral.unwrap().authorization_no, "HMO-REF-TWIN");

        let last = dataset.referrals.last().unwrap();
        assert_eq!(dataset.referrals[0].visits_used, 3);
        assert_eq!(last.authorization_no, "HMO-REF-TWIN");
        assert_eq!(last.visits_used, 1);
    }

    #[test]
    fn test_event_ids_are_sequenced_per_engine() {
        let first = engine(Arc::new(InMemoryAuditLog::new()));
        let log = Arc::new(InMemoryAuditLog::new());
        let second = engine(log.clone());
        let dataset = Dataset::demo().unwrap();

        first.expiring(&dataset);
        second.expiring(&dataset);
        second.expiring(&dataset);

        let ids: Vec<String> = log.events().into_iter().map(|e| e.event_id).collect();
        assert!(ids[0].ends_with("-000000"), "{}", ids[0]);
        assert!(ids[1].ends_with("-000001"), "{}", ids[1]);
    }

    #[test]
    fn test_expiring_uses_injected_clock() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = engine(log.clone());
        let dataset = Dataset::demo().unwrap();

        let rows = engine.expiring(&dataset);
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["REF-2001", "SA-3001"]);
        assert_eq!(rows[0].days_until_expiration, 22);
        assert_eq!(rows[1].days_until_expiration, 17);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_guard_error_records_nothing() {
        let log = Arc::new(InMemoryAuditLog::new());
        let engine = engine(log.clone());
        let dataset = Dataset::demo().unwrap();
        let mut claim = dataset.claim("CLM-5001").unwrap().clone();
        claim.service_date = None;

        assert!(engine.validate(&claim, &dataset).is_err());
        assert!(log.is_empty());
    }
}
