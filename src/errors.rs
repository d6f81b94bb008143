// =============================================================================
// Error taxonomy — caller-visible errors, gate rejections, terminal failures
// =============================================================================
//
// Three families, matching how each surfaces:
//   - EngineError:   returned synchronously to the caller (validation, lookup,
//                    idempotency conflicts). No state mutation occurred.
//   - RejectReason:  risk/guard gate denials. Not errors to the caller; they
//                    become the intent's terminal `rejected` state plus events
//                    and counters.
//   - FailureReason: terminal execution faults. The intent ends `failed`, the
//                    ledger is untouched.
// =============================================================================

use thiserror::Error;

/// Errors surfaced directly to the caller of a mutating operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("agent_not_found: {0}")]
    AgentNotFound(String),

    #[error("intent_not_found: {0}")]
    IntentNotFound(String),

    #[error("invalid_order: {0}")]
    InvalidOrder(String),

    #[error("idempotency_key_conflict: key {0} was already used with a different payload")]
    IdempotencyKeyConflict(String),
}

impl EngineError {
    /// Stable machine-readable kind, independent of the message detail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentNotFound(_) => "agent_not_found",
            Self::IntentNotFound(_) => "intent_not_found",
            Self::InvalidOrder(_) => "invalid_order",
            Self::IdempotencyKeyConflict(_) => "idempotency_key_conflict",
        }
    }
}

/// Why a gate refused an otherwise well-formed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    InvalidOrder,
    MaxOrderNotionalExceeded,
    GrossExposureCapExceeded,
    DailyLossCapReached,
    DrawdownGuardTriggered,
    CooldownActive,
    AutonomousHalted,
    AutonomousCooldown,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidOrder => "invalid_order",
            Self::MaxOrderNotionalExceeded => "max_order_notional_exceeded",
            Self::GrossExposureCapExceeded => "gross_exposure_cap_exceeded",
            Self::DailyLossCapReached => "daily_loss_cap_reached",
            Self::DrawdownGuardTriggered => "drawdown_guard_triggered",
            Self::CooldownActive => "cooldown_active",
            Self::AutonomousHalted => "autonomous_halted",
            Self::AutonomousCooldown => "autonomous_cooldown",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an execution attempt ended `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureReason {
    AgentNotFound,
    MarketPriceUnavailable,
    InsufficientPosition,
    InternalError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgentNotFound => "agent_not_found",
            Self::MarketPriceUnavailable => "market_price_unavailable",
            Self::InsufficientPosition => "insufficient_position",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_kinds_are_stable() {
        assert_eq!(EngineError::AgentNotFound("x".into()).kind(), "agent_not_found");
        assert_eq!(EngineError::IntentNotFound("x".into()).kind(), "intent_not_found");
        assert_eq!(EngineError::InvalidOrder("x".into()).kind(), "invalid_order");
        assert_eq!(
            EngineError::IdempotencyKeyConflict("k".into()).kind(),
            "idempotency_key_conflict"
        );
    }

    #[test]
    fn reject_reasons_render_snake_case() {
        assert_eq!(
            RejectReason::MaxOrderNotionalExceeded.to_string(),
            "max_order_notional_exceeded"
        );
        assert_eq!(RejectReason::CooldownActive.to_string(), "cooldown_active");
        assert_eq!(
            RejectReason::AutonomousCooldown.to_string(),
            "autonomous_cooldown"
        );
    }

    #[test]
    fn failure_reasons_render_snake_case() {
        assert_eq!(
            FailureReason::InsufficientPosition.to_string(),
            "insufficient_position"
        );
        assert_eq!(FailureReason::InternalError.to_string(), "internal_error");
    }
}
