//! RCM Shared Utilities
//!
//! Common functionality for the authorization crates:
//! - Injected clock (system or fixed)
//! - Session context for the acting back-office user
//! - Append-only audit logging
//! - Accumulating validation results

use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use audit::*;
pub use clock::*;
pub use session::*;
pub use validation::*;

/// Clock abstraction so every date comparison can be pinned in tests
pub mod clock {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    /// Source of the current instant
    pub trait Clock: Send + Sync {
        fn now(&self) -> DateTime<Utc>;

        /// Calendar date of `now()` in UTC
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Wall clock
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Clock frozen at a fixed instant
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FixedClock(pub DateTime<Utc>);

    impl FixedClock {
        pub fn new(now: DateTime<Utc>) -> Self {
            Self(now)
        }

        /// Frozen at UTC midnight of `date`
        pub fn at_date(date: NaiveDate) -> Self {
            Self(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()))
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }
}

/// Session context for the acting user
pub mod session {
    use super::*;

    /// Back-office roles from the login screen
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    pub enum UserRole {
        FrontDesk,
        Biller,
        Coder,
        AuthorizationCoordinator,
        Admin,
    }

    impl std::fmt::Display for UserRole {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            let label = match self {
                UserRole::FrontDesk => "Front Desk",
                UserRole::Biller => "Biller",
                UserRole::Coder => "Coder",
                UserRole::AuthorizationCoordinator => "Authorization Coordinator",
                UserRole::Admin => "Admin",
            };
            write!(f, "{}", label)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("unknown user role '{0}'")]
    pub struct UnknownUserRole(pub String);

    impl std::str::FromStr for UserRole {
        type Err = UnknownUserRole;

        /// Accepts `front_desk`, `front-desk`, `FrontDesk` and the like
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let key: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '_' | '-' | ' '))
                .collect::<String>()
                .to_ascii_lowercase();
            match key.as_str() {
                "frontdesk" => Ok(UserRole::FrontDesk),
                "biller" => Ok(UserRole::Biller),
                "coder" => Ok(UserRole::Coder),
                "authorizationcoordinator" => Ok(UserRole::AuthorizationCoordinator),
                "admin" => Ok(UserRole::Admin),
                _ => Err(UnknownUserRole(s.to_string())),
            }
        }
    }

    /// Who is performing an action. Passed in by the caller, never read from
    /// ambient storage.
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SessionContext {
        pub user_id: String,
        pub display_name: String,
        pub role: UserRole,
    }

    impl SessionContext {
        pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: UserRole) -> Self {
            Self {
                user_id: user_id.into(),
                display_name: display_name.into(),
                role,
            }
        }

        /// Session used by batch jobs and the CLI when no user is given
        pub fn system() -> Self {
            Self::new("system", "System", UserRole::Admin)
        }
    }
}

/// Audit logging module - append-only trail of authorization decisions
pub mod audit {
    use super::*;
    use chrono::{DateTime, Utc};
    use std::io::Write;
    use std::sync::Mutex;

    /// What happened
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    pub enum AuditAction {
        AuthNumberPopulated,
        ClaimAuthorizationValidated,
        VisitDecremented,
        VisitDecrementSkipped,
        BatchProcessed,
        ExpirationScan,
    }

    /// Audit trail entry
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    pub struct AuditEvent {
        pub event_id: String,
        pub actor_id: String,
        pub actor_role: UserRole,
        pub action: AuditAction,
        /// Claim or referral the action concerned, if any
        pub subject_id: Option<String>,
        pub detail: String,
        pub recorded_at: DateTime<Utc>,
    }

    impl AuditEvent {
        /// `seq` is supplied by whoever owns the trail and keeps ids unique
        /// within it
        pub fn new(
            session: &SessionContext,
            action: AuditAction,
            subject_id: Option<String>,
            detail: impl Into<String>,
            recorded_at: DateTime<Utc>,
            seq: u64,
        ) -> Self {
            Self {
                event_id: format!("LOG-{}-{:06}", recorded_at.timestamp_micros(), seq),
                actor_id: session.user_id.clone(),
                actor_role: session.role,
                action,
                subject_id,
                detail: detail.into(),
                recorded_at,
            }
        }
    }

    #[derive(Debug, thiserror::Error)]
    pub enum AuditError {
        #[error("audit sink I/O failed: {0}")]
        Io(#[from] std::io::Error),
        #[error("audit event could not be encoded: {0}")]
        Json(#[from] serde_json::Error),
        #[error("audit sink lock poisoned")]
        Poisoned,
    }

    /// Append-only audit sink supplied by the caller
    pub trait AuditLog: Send + Sync {
        fn record(&self, event: AuditEvent) -> Result<(), AuditError>;
    }

    /// Keeps events in memory, in arrival order
    #[derive(Debug, Default)]
    pub struct InMemoryAuditLog {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl InMemoryAuditLog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything recorded so far
        pub fn events(&self) -> Vec<AuditEvent> {
            self.events.lock().map(|e| e.clone()).unwrap_or_default()
        }

        pub fn len(&self) -> usize {
            self.events.lock().map(|e| e.len()).unwrap_or(0)
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl AuditLog for InMemoryAuditLog {
        fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
            self.events
                .lock()
                .map_err(|_| AuditError::Poisoned)?
                .push(event);
            Ok(())
        }
    }

    /// Writes one JSON object per line to any writer (file, stderr, buffer)
    pub struct JsonLinesAuditLog<W: Write + Send> {
        writer: Mutex<W>,
    }

    impl<W: Write + Send> JsonLinesAuditLog<W> {
        pub fn new(writer: W) -> Self {
            Self {
                writer: Mutex::new(writer),
            }
        }

        pub fn into_inner(self) -> Result<W, AuditError> {
            self.writer.into_inner().map_err(|_| AuditError::Poisoned)
        }
    }

    impl<W: Write + Send> AuditLog for JsonLinesAuditLog<W> {
        fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
            let line = serde_json::to_string(&event)?;
            let mut writer = self.writer.lock().map_err(|_| AuditError::Poisoned)?;
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            Ok(())
        }
    }

    /// Discards everything
    #[derive(Clone, Copy, Debug, Default)]
    pub struct NoopAuditLog;

    impl AuditLog for NoopAuditLog {
        fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
            Ok(())
        }
    }
}

/// Input validation module - accumulates record-level problems
pub mod validation {
    use super::*;

    /// Validation error with detailed context
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct ValidationError {
        pub field: String,
        pub message: String,
        pub code: ValidationErrorCode,
    }

    /// Specific validation error codes for programmatic handling
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub enum ValidationErrorCode {
        Required,
        InvalidFormat,
        OutOfRange,
        InvalidReference,
    }

    impl std::fmt::Display for ValidationError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {} ({:?})", self.field, self.message, self.code)
        }
    }

    /// Validation result that can accumulate multiple errors
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct ValidationResult {
        pub errors: Vec<ValidationError>,
    }

    impl ValidationResult {
        pub fn new() -> Self {
            Self { errors: Vec::new() }
        }

        pub fn add_error(&mut self, field: &str, message: &str, code: ValidationErrorCode) {
            self.errors.push(ValidationError {
                field: field.to_string(),
                message: message.to_string(),
                code,
            });
        }

        /// Record `Required` if `value` is blank
        pub fn require(&mut self, field: &str, value: &str) {
            if value.trim().is_empty() {
                self.add_error(field, &format!("{} is required", field), ValidationErrorCode::Required);
            }
        }

        pub fn is_valid(&self) -> bool {
            self.errors.is_empty()
        }

        pub fn merge(&mut self, other: ValidationResult) {
            self.errors.extend(other.errors);
        }

        /// Same errors with every field prefixed, e.g. `referrals[R-1].num_visits`
        pub fn scoped(self, prefix: &str) -> ValidationResult {
            ValidationResult {
                errors: self
                    .errors
                    .into_iter()
                    .map(|e| ValidationError {
                        field: format!("{}.{}", prefix, e.field),
                        ..e
                    })
                    .collect(),
            }
        }

        pub fn messages(&self) -> Vec<String> {
            self.errors.iter().map(|e| e.to_string()).collect()
        }
    }
}
