//! Response envelope and error-to-status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dealmint_types::DealmintError;
use serde::Serialize;

/// Every response body, success or failure.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Id of the record a conflict refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            code: "OK".into(),
            message: "success".into(),
            data: Some(data),
            reference_id: None,
        })
    }
}

/// A [`DealmintError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub DealmintError);

impl From<DealmintError> for ApiError {
    fn from(e: DealmintError) -> Self {
        Self(e)
    }
}

/// HTTP status for an engine error.
#[must_use]
pub fn status_for(err: &DealmintError) -> StatusCode {
    use DealmintError as E;
    match err {
        E::CouponNotFound(_) => StatusCode::NOT_FOUND,
        E::ListingGone(_) => StatusCode::GONE,

        E::InvalidTerms { .. }
        | E::InvalidWallet(_)
        | E::InvalidAmount
        | E::InvalidPrice
        | E::NotFreeCoupon(_)
        | E::NotPaidCoupon(_)
        | E::ActivityNotRecordable(_) => StatusCode::BAD_REQUEST,

        E::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
        E::NotOwner => StatusCode::FORBIDDEN,

        E::AlreadyClaimed(_)
        | E::NotInEscrow(_)
        | E::AlreadyListed { .. }
        | E::AlreadyRedeemed { .. }
        | E::DuplicateSubmission { .. }
        | E::CouponRedeemed(_)
        | E::InvalidTransition { .. } => StatusCode::CONFLICT,

        E::CouponInactive(_)
        | E::CouponExpired(_)
        | E::SelfTrade
        | E::InvalidProof { .. }
        | E::NoStake
        | E::NoRewards => StatusCode::UNPROCESSABLE_ENTITY,

        E::LedgerRejected { .. } => StatusCode::BAD_GATEWAY,
        E::LedgerTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        E::RetriesExhausted { .. } | E::StoreConflict { .. } => StatusCode::SERVICE_UNAVAILABLE,

        E::ArithmeticOverflow
        | E::Store(_)
        | E::Internal(_)
        | E::Serialization(_)
        | E::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        let message = if status.is_server_error() {
            tracing::error!(code = self.0.code(), error = %self.0, "request failed");
            // Internal detail stays in the log.
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => "internal error".to_string(),
                _ => self.0.to_string(),
            }
        } else {
            tracing::debug!(code = self.0.code(), error = %self.0, "request rejected");
            self.0.to_string()
        };

        let body = Json(ApiResponse::<()> {
            code: self.0.code().to_string(),
            message,
            data: None,
            reference_id: self.0.reference_id(),
        });
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use dealmint_types::{CouponId, RedemptionId};

    #[test]
    fn duplicate_redemptions_are_conflicts() {
        let existing = RedemptionId::new();
        assert_eq!(
            status_for(&DealmintError::AlreadyRedeemed { existing }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_for(&DealmintError::DuplicateSubmission { existing }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn exhausted_retries_are_unavailable() {
        let err = DealmintError::RetriesExhausted {
            op: "stake".into(),
            attempts: 5,
            last: "conflict".into(),
        };
        assert_eq!(status_for(&err), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&DealmintError::CouponNotFound(CouponId::new())),
            StatusCode::NOT_FOUND
        );
    }
}
