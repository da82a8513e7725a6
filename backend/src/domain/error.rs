//! Domain-level error types.
//!
//! [`FarmError`] is what the farm service returns. [`DomainError`] is the
//! transport-agnostic envelope inbound adapters turn into their own protocol
//! responses; every [`FarmError`] converts into one with a stable
//! [`ErrorCode`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::farm::GeometryError;
use super::ids::{FarmId, FarmerId};

/// Stable machine-readable error code describing the failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The request is malformed or fails validation.
    InvalidRequest,
    /// The requested resource does not exist.
    NotFound,
    /// The request collides with existing state.
    Conflict,
    /// A transient dependency failure; the caller may retry.
    ServiceUnavailable,
    /// An unexpected error occurred inside the domain.
    InternalError,
}

/// Domain error payload.
///
/// ## Invariants
/// - `message` must be non-empty once trimmed of whitespace.
///
/// # Examples
/// ```
/// use farmland::domain::{DomainError, ErrorCode};
///
/// let err = DomainError::new(ErrorCode::NotFound, "missing");
/// assert_eq!(err.code(), ErrorCode::NotFound);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(deny_unknown_fields)]
#[serde(try_from = "DomainErrorDto", into = "DomainErrorDto")]
pub struct DomainError {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Validation errors emitted by the constructors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainErrorValidationError {
    #[error("error message must not be empty")]
    EmptyMessage,
}

impl DomainError {
    /// Create a new error.
    ///
    /// # Panics
    /// Panics when `message` is blank; use [`DomainError::try_new`] for
    /// untrusted input.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        match Self::try_new(code, message) {
            Ok(value) => value,
            Err(err) => panic!("error messages must satisfy validation: {err}"),
        }
    }

    /// Fallible constructor that validates the message content.
    pub fn try_new(
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Result<Self, DomainErrorValidationError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(DomainErrorValidationError::EmptyMessage);
        }
        Ok(Self {
            code,
            message,
            details: None,
        })
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Human-readable message returned to adapters.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    /// Supplementary error details for adapters.
    pub fn details(&self) -> Option<&Value> {
        self.details.as_ref()
    }

    /// Attach structured details to the error.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for DomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for DomainError {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainErrorDto {
    code: ErrorCode,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl From<DomainError> for DomainErrorDto {
    fn from(value: DomainError) -> Self {
        Self {
            code: value.code,
            message: value.message,
            details: value.details,
        }
    }
}

impl TryFrom<DomainErrorDto> for DomainError {
    type Error = DomainErrorValidationError;

    fn try_from(value: DomainErrorDto) -> Result<Self, Self::Error> {
        let DomainErrorDto {
            code,
            message,
            details,
        } = value;

        let mut error = Self::try_new(code, message)?;
        error.details = details;
        Ok(error)
    }
}

/// Failures surfaced by the farm service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FarmError {
    /// The submitted boundary failed validation; nothing was written.
    #[error("invalid farm boundary: {0}")]
    Geometry(#[from] GeometryError),
    /// The boundary shares interior area with active farms and the overlap
    /// policy rejects it.
    #[error("farm boundary overlaps {} active farm(s)", .farm_ids.len())]
    OverlapConflict { farm_ids: Vec<FarmId> },
    #[error("farm {farm_id} was not found")]
    FarmNotFound { farm_id: FarmId },
    #[error("farmer {farmer_id} was not found")]
    FarmerNotFound { farmer_id: FarmerId },
    /// Concurrent writers kept invalidating the change; nothing was applied.
    #[error("farm change lost {attempts} concurrent write race(s); retry later")]
    ConcurrencyConflict { attempts: u32 },
    /// A rollup delta would have driven the farmer's totals negative even
    /// after reconciling them.
    #[error("acreage totals for farmer {farmer_id} are inconsistent")]
    AggregateConsistency { farmer_id: FarmerId },
    #[error("farm storage failed: {message}")]
    Repository { message: String },
}

impl FarmError {
    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConcurrencyConflict { .. } | Self::Repository { .. }
        )
    }

    /// Stable code for this failure category.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Geometry(_) => ErrorCode::InvalidRequest,
            Self::OverlapConflict { .. } => ErrorCode::Conflict,
            Self::FarmNotFound { .. } | Self::FarmerNotFound { .. } => ErrorCode::NotFound,
            Self::ConcurrencyConflict { .. } | Self::Repository { .. } => {
                ErrorCode::ServiceUnavailable
            }
            Self::AggregateConsistency { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<FarmError> for DomainError {
    fn from(err: FarmError) -> Self {
        let code = err.code();
        let details = match &err {
            FarmError::OverlapConflict { farm_ids } => Some(json!({ "farmIds": farm_ids })),
            FarmError::FarmNotFound { farm_id } => Some(json!({ "farmId": farm_id })),
            FarmError::FarmerNotFound { farmer_id }
            | FarmError::AggregateConsistency { farmer_id } => {
                Some(json!({ "farmerId": farmer_id }))
            }
            FarmError::ConcurrencyConflict { attempts } => Some(json!({ "attempts": attempts })),
            FarmError::Geometry(_) | FarmError::Repository { .. } => None,
        };
        // Repository messages may carry driver detail; keep them out of the envelope.
        let message = match &err {
            FarmError::Repository { .. } => "farm storage is unavailable".to_owned(),
            other => other.to_string(),
        };
        let error = Self {
            code,
            message,
            details: None,
        };
        match details {
            Some(details) => error.with_details(details),
            None => error,
        }
    }
}
