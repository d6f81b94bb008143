// =============================================================================
// Autonomous Guard — per-agent kill-switch and failure-streak cooldown
// =============================================================================
//
// Checked before the risk engine on every execution attempt:
//
//   1. An already-halted agent stays halted until an admin reset.
//   2. Drawdown at or beyond the stop threshold halts the agent outright.
//   3. A failure streak at the threshold opens a cooldown window and resets
//      the streak.
//   4. Inside an open window, trading is denied until the window closes.
//
// The failure streak is fed by terminal execution failures and cleared by
// fills; guard denials themselves do not extend it, so a cooldown window
// that expires actually re-opens trading.
// =============================================================================

use tracing::warn;

use crate::errors::RejectReason;
use crate::runtime_config::AutonomousConfig;
use crate::types::AutonomousAgentState;

/// A guard denial: the reason kind for counters plus the human-readable
/// detail recorded on the intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardDenial {
    pub reason: RejectReason,
    pub detail: String,
}

/// Per-agent halt/cooldown policy.
#[derive(Debug, Clone, Copy)]
pub struct AutonomousGuard {
    max_drawdown_stop_pct: f64,
    cooldown_ms: i64,
    cooldown_after_consecutive_failures: u32,
}

impl AutonomousGuard {
    pub fn new(config: &AutonomousConfig) -> Self {
        Self {
            max_drawdown_stop_pct: config.max_drawdown_stop_pct,
            cooldown_ms: config.cooldown_ms,
            cooldown_after_consecutive_failures: config.cooldown_after_consecutive_failures,
        }
    }

    /// Decide whether the agent may trade right now, mutating `state` when a
    /// halt or a fresh cooldown window is triggered.
    pub fn assess(
        &self,
        now_ms: i64,
        drawdown_pct: f64,
        agent_id: &str,
        state: &mut AutonomousAgentState,
    ) -> Result<(), GuardDenial> {
        if state.halted {
            let detail = state
                .halt_reason
                .clone()
                .unwrap_or_else(|| RejectReason::AutonomousHalted.as_str().to_string());
            return Err(GuardDenial {
                reason: RejectReason::AutonomousHalted,
                detail,
            });
        }

        if drawdown_pct >= self.max_drawdown_stop_pct {
            let detail = format!(
                "drawdown {:.4} reached stop threshold {:.4}",
                drawdown_pct, self.max_drawdown_stop_pct
            );
            warn!(agent_id, drawdown_pct, "autonomous guard halting agent");
            state.halted = true;
            state.halt_reason = Some(detail.clone());
            return Err(GuardDenial {
                reason: RejectReason::AutonomousHalted,
                detail,
            });
        }

        if self.cooldown_after_consecutive_failures > 0
            && state.consecutive_failures >= self.cooldown_after_consecutive_failures
        {
            state.cooldown_until_ms = now_ms + self.cooldown_ms;
            state.consecutive_failures = 0;
            warn!(
                agent_id,
                cooldown_until_ms = state.cooldown_until_ms,
                "failure streak opened a cooldown window"
            );
            return Err(GuardDenial {
                reason: RejectReason::AutonomousCooldown,
                detail: RejectReason::AutonomousCooldown.as_str().to_string(),
            });
        }

        if now_ms < state.cooldown_until_ms {
            return Err(GuardDenial {
                reason: RejectReason::AutonomousCooldown,
                detail: format!("cooldown until {}", state.cooldown_until_ms),
            });
        }

        Ok(())
    }

    /// Record a terminal execution failure.
    pub fn record_failure(state: &mut AutonomousAgentState) {
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
    }

    /// Record a successful fill; clears the streak.
    pub fn record_success(state: &mut AutonomousAgentState) {
        state.consecutive_failures = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================
