//! Authorization number auto-population

use crate::config::TieBreak;
use crate::error::AuthorizationError;
use crate::matcher::{find_matching_referral, find_matching_service_auth};
use rcm_authorization_integrity::{AuthType, Claim, ClaimLineItem, Referral, ServiceAuthorization};

/// Copy of `claim` with `auth_number`/`auth_type` filled in.
///
/// A matching service authorization wins over a referral. With neither, both
/// fields are cleared.
pub fn auto_populate_auth_number(
    claim: &Claim,
    referrals: &[Referral],
    service_auths: &[ServiceAuthorization],
    line_items: &[ClaimLineItem],
    tie_break: TieBreak,
) -> Result<Claim, AuthorizationError> {
    let mut populated = claim.clone();

    if let Some(auth) = find_matching_service_auth(claim, service_auths, line_items, tie_break)? {
        populated.auth_number = Some(auth.authorization_no.clone());
        populated.auth_type = Some(AuthType::ServiceAuthorization);
        return Ok(populated);
    }

    match find_matching_referral(claim, referrals, tie_break)? {
        Some(referral) => {
            populated.auth_number = Some(referral.authorization_no.clone());
            populated.auth_type = Some(AuthType::Referral);
        }
        None => {
            populated.auth_number = None;
            populated.auth_type = None;
        }
    }
    Ok(populated)
}
