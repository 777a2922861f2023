//! RCM Authorization
//!
//! Rules relating prior authorizations to claims for a revenue-cycle back
//! office:
//!
//! - Match a claim to its referral or service authorization
//! - Auto-populate the claim's authorization number (service auth first)
//! - Validate that high-cost procedures and referred visits are authorized
//! - Decrement referral visit counters on submission, singly or in batches
//! - Scan for authorizations expiring within the alert window
//!
//! The rules are pure functions over record slices. [`AuthorizationEngine`]
//! wraps them with an injected clock, session context and audit log.
//!
//! # Example
//!
//! ```rust
//! use rcm_authorization::{auto_populate_auth_number, Dataset, TieBreak};
//! use rcm_authorization_integrity::AuthType;
//!
//! let dataset = Dataset::demo().unwrap();
//! let claim = dataset.claim("CLM-5002").unwrap();
//!
//! let populated = auto_populate_auth_number(
//!     claim,
//!     &dataset.referrals,
//!     &dataset.service_authorizations,
//!     &dataset.line_items,
//!     TieBreak::FirstMatch,
//! )
//! .unwrap();
//!
//! assert_eq!(populated.auth_type, Some(AuthType::ServiceAuthorization));
//! assert_eq!(populated.auth_number.as_deref(), Some("PA-MRI-44120"));
//! ```

pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod expiry;
pub mod matcher;
pub mod populate;
pub mod validator;
pub mod visits;

// Re-export commonly used types for convenience
pub use config::{AuthorizationConfig, TieBreak, HIGH_COST_PROCEDURE_CODES};
pub use dataset::Dataset;
pub use engine::AuthorizationEngine;
pub use error::{AuthorizationError, ConfigError, DatasetError};
pub use expiry::{days_until_expiration, get_expiring_authorizations, is_auth_expiring_soon, ExpiringAuthorization};
pub use matcher::{claim_line_items, find_matching_referral, find_matching_service_auth};
pub use populate::auto_populate_auth_number;
pub use validator::{validate_claim_authorization, AuthorizationValidation};
pub use visits::{batch_process_claims, process_claim_submission, BatchClaimResult, BatchOutcome, VisitDecrement};
