use thiserror::Error;

/// Unified error type for the gateway core.
///
/// One variant per row of the error taxonomy: stable identity, fixed status
/// code, and (for most variants) a JSON body at the request boundary.
/// `ClientCancelled` and `ActionFailed` are surfaced through access logs and
/// diagnostic headers respectively, never written to the wire as a response
/// — `status_code` is still defined on them for log classification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("no matching rule")]
    NoMatchingRule,

    #[error("{0}")]
    UpstreamUnreachable(String),

    #[error("client cancelled")]
    ClientCancelled,

    #[error("{0}")]
    ActionFailed(String),
}

impl GatewayError {
    /// Map to the HTTP status code from §7's taxonomy table.
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::InvalidInput(_) => 400,
            GatewayError::NotFound(_) => 404,
            GatewayError::Conflict(_) => 409,
            GatewayError::Unauthorized(_) => 401,
            GatewayError::Forbidden(_) => 403,
            GatewayError::NoMatchingRule => 404,
            GatewayError::UpstreamUnreachable(_) => 502,
            GatewayError::ClientCancelled => 499,
            GatewayError::ActionFailed(_) => 200, // soft-fail: request still forwards
        }
    }

    /// JSON error body: `{"error": "<message>"}`. Used at the request
    /// boundary for every variant except `ClientCancelled`/`ActionFailed`,
    /// which never reach the wire as a standalone response.
    pub fn to_json_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.message() })
    }

    fn message(&self) -> String {
        match self {
            GatewayError::NoMatchingRule => "no matching rule".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── status_code mapping ──
    #[test]
    fn invalid_input_is_400() {
        assert_eq!(GatewayError::InvalidInput("bad".into()).status_code(), 400);
    }

    #[test]
    fn not_found_is_404() {
        assert_eq!(GatewayError::NotFound("rule-1".into()).status_code(), 404);
    }

    #[test]
    fn conflict_is_409() {
        assert_eq!(GatewayError::Conflict("dup name".into()).status_code(), 409);
    }

    #[test]
    fn unauthorized_is_401() {
        assert_eq!(GatewayError::Unauthorized("bad key".into()).status_code(), 401);
    }

    #[test]
    fn forbidden_is_403() {
        assert_eq!(GatewayError::Forbidden("ownership mismatch".into()).status_code(), 403);
    }

    #[test]
    fn no_matching_rule_is_404() {
        assert_eq!(GatewayError::NoMatchingRule.status_code(), 404);
    }

    #[test]
    fn upstream_unreachable_is_502() {
        assert_eq!(
            GatewayError::UpstreamUnreachable("connect refused".into()).status_code(),
            502
        );
    }

    #[test]
    fn client_cancelled_is_499() {
        assert_eq!(GatewayError::ClientCancelled.status_code(), 499);
    }

    // ── JSON body shape ──
    #[test]
    fn json_body_has_error_field() {
        let err = GatewayError::Unauthorized("bad key".into());
        let body = err.to_json_body();
        assert_eq!(body["error"], "bad key");
    }

    #[test]
    fn no_matching_rule_json_body() {
        let body = GatewayError::NoMatchingRule.to_json_body();
        assert_eq!(body["error"], "no matching rule");
    }

    #[test]
    fn display_messages() {
        assert_eq!(GatewayError::NotFound("binding".into()).to_string(), "binding");
        assert_eq!(GatewayError::ClientCancelled.to_string(), "client cancelled");
    }
}
