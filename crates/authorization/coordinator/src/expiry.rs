//! Expiration arithmetic and the dashboard expiration scan

use chrono::{DateTime, NaiveDate, Utc};
use rcm_authorization_integrity::{AuthType, Referral, ServiceAuthorization};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Whole days until `expiration_date`, rounded up. Measured from `now` to
/// UTC midnight of the expiration date, so a date later today is day 1 and
/// today's already-passed midnight is day 0 or below.
pub fn days_until_expiration(expiration_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let expires_at = expiration_date
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
        .timestamp_millis();
    let diff = expires_at - now.timestamp_millis();
    let days = diff.div_euclid(MILLIS_PER_DAY);
    if diff.rem_euclid(MILLIS_PER_DAY) > 0 {
        days + 1
    } else {
        days
    }
}

/// True when 1..=`window_days` days remain
pub fn is_auth_expiring_soon(expiration_date: NaiveDate, now: DateTime<Utc>, window_days: i64) -> bool {
    let days = days_until_expiration(expiration_date, now);
    days > 0 && days <= window_days
}

/// Row of the expiration-alert banner
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExpiringAuthorization {
    pub auth_type: AuthType,
    /// `referral_id` or `auth_id`
    pub id: String,
    pub patient_id: String,
    pub authorization_no: String,
    pub expiration_date: NaiveDate,
    pub days_until_expiration: i64,
    /// Referrals only
    pub visits_remaining: Option<u32>,
    /// Service authorizations only
    pub procedure_code: Option<String>,
}

/// Approved referrals then approved service authorizations that expire
/// within `window_days`, each group in input order
pub fn get_expiring_authorizations(
    referrals: &[Referral],
    service_auths: &[ServiceAuthorization],
    now: DateTime<Utc>,
    window_days: i64,
) -> Vec<ExpiringAuthorization> {
    let in_window = |days: i64| days > 0 && days <= window_days;

    let from_referrals = referrals
        .iter()
        .filter(|r| r.status.is_approved())
        .filter_map(|r| {
            let days = days_until_expiration(r.expiration_date, now);
            in_window(days).then(|| ExpiringAuthorization {
                auth_type: AuthType::Referral,
                id: r.referral_id.clone(),
                patient_id: r.patient_id.clone(),
                authorization_no: r.authorization_no.clone(),
                expiration_date: r.expiration_date,
                days_until_expiration: days,
                visits_remaining: Some(r.visits_remaining()),
                procedure_code: None,
            })
        });

    let from_service_auths = service_auths
        .iter()
        .filter(|a| a.status.is_approved())
        .filter_map(|a| {
            let days = days_until_expiration(a.end_date, now);
            in_window(days).then(|| ExpiringAuthorization {
                auth_type: AuthType::ServiceAuthorization,
                id: a.auth_id.clone(),
                patient_id: a.patient_id.clone(),
                authorization_no: a.authorization_no.clone(),
                expiration_date: a.end_date,
                days_until_expiration: days,
                visits_remaining: None,
                procedure_code: Some(a.procedure_code.clone()),
            })
        });

    from_referrals.chain(from_service_auths).collect()
}
