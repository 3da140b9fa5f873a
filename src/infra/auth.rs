//! Gateway session resolution.
//!
//! The service sits behind an authenticating gateway that forwards the
//! caller's identity in `x-user-id` and the MFA verdict in
//! `x-mfa-verified`. This provider trusts those headers and only checks
//! that they are present and well formed.

use tracing::instrument;

use crate::domain::{AppError, AuthenticatedUser, SessionProvider};

pub struct GatewaySessionProvider {
    /// When set, reject callers whose MFA header is absent or false
    require_two_factor: bool,
}

impl GatewaySessionProvider {
    #[must_use]
    pub fn new(require_two_factor: bool) -> Self {
        Self { require_two_factor }
    }
}

impl SessionProvider for GatewaySessionProvider {
    #[instrument(skip(self))]
    fn authenticate(
        &self,
        user_id: Option<&str>,
        two_factor: Option<&str>,
    ) -> Result<AuthenticatedUser, AppError> {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Authentication("missing x-user-id header".to_string()))?;

        let two_factor_verified = matches!(two_factor, Some("true" | "1"));
        if self.require_two_factor && !two_factor_verified {
            return Err(AppError::Authentication(
                "two-factor verification required".to_string(),
            ));
        }

        Ok(AuthenticatedUser {
            user_id: user_id.to_string(),
            two_factor_verified,
        })
    }
}
