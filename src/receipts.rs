// =============================================================================
// Receipt Engine — tamper-evident, hash-chained execution receipts
// =============================================================================
//
// Each receipt carries:
//   - a canonical projection of the execution (`payload`),
//   - `payload_hash` = canonical hash of the payload,
//   - a chain message `"{version}|{payloadHash}|{prevReceiptHash or GENESIS}"`,
//   - `receipt_hash` = hash of the chain message,
//   - a signature envelope whose `message_hash` equals the receipt hash.
//
// Receipts per agent form a total chain: each links to its predecessor by
// hash, so mutating any historical execution breaks every later receipt.
// Verification recomputes everything from the execution and reports the
// expected hashes so a caller can localize a mismatch.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::fees::round8;
use crate::hashing;
use crate::types::{ExecutionRecord, ExecutionStatus, Side, TradeMode};

/// Receipt format version.
pub const RECEIPT_VERSION: &str = "v1";

/// Signature scheme identifier embedded in every envelope.
pub const SIGNATURE_SCHEME: &str = "colosseum-receipt-signature-v1";

/// Chain-message marker for the first receipt of an agent.
pub const GENESIS_MARKER: &str = "GENESIS";

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

/// Canonical projection of an execution. Field names and their camelCase
/// spelling are part of the external contract; absent optionals are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptPayload {
    pub execution_id: String,
    pub intent_id: String,
    pub agent_id: String,
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub price_usd: f64,
    pub gross_notional_usd: f64,
    pub fee_usd: f64,
    pub net_usd: f64,
    pub realized_pnl_usd: f64,
    pub pnl_snapshot_usd: f64,
    pub mode: TradeMode,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_signature: Option<String>,
    pub timestamp: i64,
}

/// Signature envelope over the chain message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    pub scheme: String,
    pub message: String,
    pub message_hash: String,
}

/// Tamper-evident stamp of an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub version: String,
    pub execution_id: String,
    pub payload: ReceiptPayload,
    pub payload_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_receipt_hash: Option<String>,
    pub receipt_hash: String,
    pub signature_payload: SignaturePayload,
    pub created_at: i64,
}

/// Outcome of `verify_receipt`, exposing the recomputed hashes for
/// diagnostics when `ok` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptVerification {
    pub ok: bool,
    pub expected_payload_hash: String,
    pub expected_receipt_hash: String,
    pub expected_signature_payload_hash: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Build the canonical payload from an execution. Monetary amounts are
/// rounded to 8 fractional digits at this boundary.
pub fn payload_from(execution: &ExecutionRecord) -> ReceiptPayload {
    ReceiptPayload {
        execution_id: execution.id.clone(),
        intent_id: execution.intent_id.clone(),
        agent_id: execution.agent_id.clone(),
        symbol: execution.symbol.clone(),
        side: execution.side,
        quantity: round8(execution.quantity),
        price_usd: round8(execution.price_usd),
        gross_notional_usd: round8(execution.gross_notional_usd),
        fee_usd: round8(execution.fee_usd),
        net_usd: round8(execution.net_usd),
        realized_pnl_usd: round8(execution.realized_pnl_usd),
        pnl_snapshot_usd: round8(execution.pnl_snapshot_usd),
        mode: execution.mode,
        status: execution.status,
        failure_reason: execution.failure_reason.clone(),
        tx_signature: execution.tx_signature.clone(),
        timestamp: execution.created_at,
    }
}

/// The chain message binding a payload hash to its predecessor.
pub fn chain_message(payload_hash: &str, prev_receipt_hash: Option<&str>) -> String {
    format!(
        "{RECEIPT_VERSION}|{payload_hash}|{}",
        prev_receipt_hash.unwrap_or(GENESIS_MARKER)
    )
}

/// Create a receipt for an execution, linking it to the agent's previous
/// receipt hash (or GENESIS when absent).
pub fn create_receipt(
    execution: &ExecutionRecord,
    prev_receipt_hash: Option<&str>,
) -> Result<Receipt, serde_json::Error> {
    let payload = payload_from(execution);
    let payload_hash = hashing::hash_serializable(&payload)?;
    let message = chain_message(&payload_hash, prev_receipt_hash);
    let receipt_hash = hashing::hash_message(&message);

    Ok(Receipt {
        version: RECEIPT_VERSION.to_string(),
        execution_id: execution.id.clone(),
        payload,
        payload_hash,
        prev_receipt_hash: prev_receipt_hash.map(str::to_string),
        receipt_hash: receipt_hash.clone(),
        signature_payload: SignaturePayload {
            scheme: SIGNATURE_SCHEME.to_string(),
            message,
            message_hash: receipt_hash,
        },
        created_at: execution.created_at,
    })
}

/// Recompute every hash from the execution and the receipt's own metadata.
/// `ok` holds iff all of the following agree:
///   - the recomputed payload hash matches the stored `payload_hash` and the
///     hash of the stored payload,
///   - the recomputed receipt hash (using the stored `prev_receipt_hash`)
///     matches the stored `receipt_hash`,
///   - the envelope's message equals the recomputed chain message,
///   - the envelope's `message_hash` equals the receipt hash,
///   - hashing the envelope's own message reproduces its `message_hash`.
pub fn verify_receipt(
    execution: &ExecutionRecord,
    receipt: &Receipt,
) -> Result<ReceiptVerification, serde_json::Error> {
    let expected_payload = payload_from(execution);
    let expected_payload_hash = hashing::hash_serializable(&expected_payload)?;
    let stored_payload_hash = hashing::hash_serializable(&receipt.payload)?;

    let expected_message = chain_message(
        &expected_payload_hash,
        receipt.prev_receipt_hash.as_deref(),
    );
    let expected_receipt_hash = hashing::hash_message(&expected_message);
    let expected_signature_payload_hash =
        hashing::hash_message(&receipt.signature_payload.message);

    let ok = expected_payload_hash == receipt.payload_hash
        && stored_payload_hash == receipt.payload_hash
        && expected_receipt_hash == receipt.receipt_hash
        && receipt.signature_payload.scheme == SIGNATURE_SCHEME
        && receipt.signature_payload.message == expected_message
        && receipt.signature_payload.message_hash == receipt.receipt_hash
        && expected_signature_payload_hash == receipt.signature_payload.message_hash;

    Ok(ReceiptVerification {
        ok,
        expected_payload_hash,
        expected_receipt_hash,
        expected_signature_payload_hash,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(id: &str, realized: f64) -> ExecutionRecord {
        ExecutionRecord {
            id: id.to_string(),
            intent_id: format!("intent-{id}"),
            agent_id: "agent-1".to_string(),
            symbol: "SOL".to_string(),
            side: Side::Buy,
            quantity: 1.0,
            price_usd: 100.0,
            gross_notional_usd: 100.0,
            fee_usd: 0.08,
            net_usd: -100.08,
            realized_pnl_usd: realized,
            pnl_snapshot_usd: realized,
            mode: TradeMode::Paper,
            status: ExecutionStatus::Filled,
            failure_reason: None,
            tx_signature: None,
            created_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn create_then_verify_roundtrips() {
        let exec = execution("e1", 0.0);
        let receipt = create_receipt(&exec, None).unwrap();

        assert_eq!(receipt.version, "v1");
        assert_eq!(receipt.signature_payload.scheme, SIGNATURE_SCHEME);
        assert_eq!(receipt.signature_payload.message_hash, receipt.receipt_hash);
        assert!(receipt.prev_receipt_hash.is_none());
        assert!(receipt
            .signature_payload
            .message
            .ends_with(&format!("|{GENESIS_MARKER}")));

        let verification = verify_receipt(&exec, &receipt).unwrap();
        assert!(verification.ok);
        assert_eq!(verification.expected_payload_hash, receipt.payload_hash);
        assert_eq!(verification.expected_receipt_hash, receipt.receipt_hash);
    }

    #[test]
    fn chained_receipts_link_by_hash() {
        let e1 = execution("e1", 0.0);
        let e2 = execution("e2", 9.912);

        let r1 = create_receipt(&e1, None).unwrap();
        let r2 = create_receipt(&e2, Some(&r1.receipt_hash)).unwrap();

        assert_eq!(r2.prev_receipt_hash.as_deref(), Some(r1.receipt_hash.as_str()));
        assert!(verify_receipt(&e2, &r2).unwrap().ok);
        assert_ne!(r1.receipt_hash, r2.receipt_hash);
    }

    #[test]
    fn tampered_payload_hash_is_detected_and_localized() {
        let exec = execution("e1", 0.0);
        let mut receipt = create_receipt(&exec, None).unwrap();

        // Flip one hex digit.
        let original = receipt.payload_hash.clone();
        let flipped = if original.starts_with('a') { "b" } else { "a" };
        receipt.payload_hash = format!("{}{}", flipped, &original[1..]);

        let verification = verify_receipt(&exec, &receipt).unwrap();
        assert!(!verification.ok);
        // The expected hash still matches the recomputation, pointing the
        // caller at the mutated field.
        assert_eq!(verification.expected_payload_hash, original);
    }

    #[test]
    fn tampered_receipt_hash_is_detected() {
        let exec = execution("e1", 0.0);
        let mut receipt = create_receipt(&exec, None).unwrap();
        receipt.receipt_hash = hashing::hash_message("forged");

        let verification = verify_receipt(&exec, &receipt).unwrap();
        assert!(!verification.ok);
    }

    #[test]
    fn tampered_signature_message_is_detected() {
        let exec = execution("e1", 0.0);
        let mut receipt = create_receipt(&exec, None).unwrap();
        receipt.signature_payload.message.push('x');

        let verification = verify_receipt(&exec, &receipt).unwrap();
        assert!(!verification.ok);
    }

    #[test]
    fn mutated_execution_no_longer_verifies() {
        let exec = execution("e1", 0.0);
        let receipt = create_receipt(&exec, None).unwrap();

        let mut mutated = exec.clone();
        mutated.fee_usd += 0.01;

        let verification = verify_receipt(&mutated, &receipt).unwrap();
        assert!(!verification.ok);
        assert_ne!(verification.expected_payload_hash, receipt.payload_hash);
    }

    #[test]
    fn payload_omits_absent_optionals() {
        let exec = execution("e1", 0.0);
        let payload = payload_from(&exec);
        let value = serde_json::to_value(&payload).unwrap();
        let map = value.as_object().unwrap();
        assert!(!map.contains_key("failureReason"));
        assert!(!map.contains_key("txSignature"));
        assert_eq!(map["executionId"], "e1");
        assert_eq!(map["mode"], "paper");
        assert_eq!(map["status"], "filled");
    }

    #[test]
    fn payload_rounds_amounts_to_eight_digits() {
        let mut exec = execution("e1", 0.0);
        exec.fee_usd = 0.123456789123;
        let payload = payload_from(&exec);
        assert_eq!(payload.fee_usd, 0.12345679);
    }
}
