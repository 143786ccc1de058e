//! Transaction extractor — turns one loaded transaction into typed transfer
//! events for the tracked asset.
//!
//! Classification order, per matching balance change:
//!
//! 1. a move call to the claim function → `claim` (amount sign ignored)
//! 2. an emitted event type carrying an unstake marker → `unstake`
//! 3. an emitted event type carrying a stake marker → `stake`
//! 4. amount written with a leading `-` → `sell`, otherwise `transfer`
//!
//! Amounts stay the ledger's decimal strings of any width; only their sign is
//! read. Unstake markers are checked first since `"unstake"` contains `"stake"`.
//! `buy` is never produced: a positive balance delta alone cannot tell a
//! purchase from a plain transfer.

use tracing::debug;

use crate::config::{AssetConfig, ClassificationConfig};
use crate::error::SyncError;
use crate::ledger::{TransactionRecord, TxLocator};
use crate::types::{timestamp_from_millis, EventKind, TransferEvent};

// ─── AssetMatcher ────────────────────────────────────────────────────────────

/// Case-insensitive coin-type matcher for the tracked asset.
#[derive(Debug, Clone)]
pub struct AssetMatcher {
    needles: Vec<String>,
}

impl AssetMatcher {
    pub fn new(asset: &AssetConfig) -> Self {
        let needles = std::iter::once(&asset.coin_type)
            .chain(asset.aliases.iter())
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { needles }
    }

    pub fn matches(&self, coin_type: &str) -> bool {
        let coin_type = coin_type.to_lowercase();
        self.needles.iter().any(|n| coin_type.contains(n.as_str()))
    }
}

// ─── TransactionExtractor ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TransactionExtractor {
    matcher: AssetMatcher,
    claim_function: String,
    stake_markers: Vec<String>,
    unstake_markers: Vec<String>,
}

impl TransactionExtractor {
    pub fn new(asset: &AssetConfig, classification: &ClassificationConfig) -> Self {
        // markers and event types are compared lowercased
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect()
        };
        Self {
            matcher: AssetMatcher::new(asset),
            claim_function: classification.claim_function.clone(),
            stake_markers: lower(&classification.stake_markers),
            unstake_markers: lower(&classification.unstake_markers),
        }
    }

    /// Extract every event for the tracked asset from `tx`.
    ///
    /// `locator` supplies the checkpoint and timestamp when the record itself
    /// does not carry them (checkpoint scans know both up front). Returns
    /// [`SyncError::Parse`] when neither source provides them.
    pub fn extract(
        &self,
        tx: &TransactionRecord,
        locator: Option<&TxLocator>,
    ) -> Result<Vec<TransferEvent>, SyncError> {
        let shape_err = |reason: &str| SyncError::Parse {
            digest: tx.digest.clone(),
            reason: reason.to_string(),
        };

        let checkpoint = tx
            .checkpoint
            .or_else(|| locator.and_then(|l| l.checkpoint))
            .ok_or_else(|| shape_err("no checkpoint"))?;
        let timestamp_ms = tx
            .timestamp_ms
            .or_else(|| locator.and_then(|l| l.timestamp_ms))
            .ok_or_else(|| shape_err("no timestamp"))?;
        let timestamp =
            timestamp_from_millis(timestamp_ms).ok_or_else(|| shape_err("timestamp out of range"))?;

        let gas_fee = tx.gas.fee().to_string();
        let mut events = Vec::new();

        for change in &tx.balance_changes {
            if !self.matcher.matches(&change.coin_type) {
                continue;
            }
            let Some((amount, negative)) = signed_amount(&change.amount) else {
                return Err(SyncError::Parse {
                    digest: tx.digest.clone(),
                    reason: format!("balance change amount {:?} is not a decimal number", change.amount),
                });
            };
            let kind = self.classify(tx, negative);
            debug!(
                digest = %tx.digest,
                coin_type = %change.coin_type,
                amount = %change.amount,
                kind = %kind,
                "Matched balance change"
            );
            events.push(TransferEvent {
                digest: tx.digest.clone(),
                sender: tx.sender.clone(),
                recipient: change.owner.resolve().to_string(),
                amount: amount.to_string(),
                kind,
                checkpoint,
                timestamp,
                success: tx.success,
                gas_fee: gas_fee.clone(),
            });
        }

        Ok(events)
    }

    /// `negative` is whether the amount was written with a leading `-`.
    pub fn classify(&self, tx: &TransactionRecord, negative: bool) -> EventKind {
        if tx.kind.move_calls().any(|c| c.function == self.claim_function) {
            return EventKind::Claim;
        }

        let event_types: Vec<String> =
            tx.events.iter().map(|e| e.event_type.to_lowercase()).collect();
        let carries = |markers: &[String]| {
            event_types
                .iter()
                .any(|t| markers.iter().any(|m| t.contains(m.as_str())))
        };
        if carries(&self.unstake_markers) {
            return EventKind::Unstake;
        }
        if carries(&self.stake_markers) {
            return EventKind::Stake;
        }

        if negative {
            EventKind::Sell
        } else {
            EventKind::Transfer
        }
    }
}

/// Trimmed amount and its sign, or `None` unless it is an optionally signed
/// decimal like `-250` or `0.5`.
fn signed_amount(raw: &str) -> Option<(&str, bool)> {
    let amount = raw.trim();
    let (negative, magnitude) = match amount.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, amount.strip_prefix('+').unwrap_or(amount)),
    };
    let (whole, fraction) = magnitude.split_once('.').unwrap_or((magnitude, "0"));
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    (digits(whole) && digits(fraction)).then_some((amount, negative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{BalanceChange, Command, EmittedEvent, GasCost, MoveCall, Owner, TransactionKind};

    const COIN: &str = "0xfeed::chirp::CHIRP";

    fn extractor() -> TransactionExtractor {
        TransactionExtractor::new(
            &AssetConfig {
                coin_type: COIN.into(),
                aliases: vec!["::chirp::".into()],
            },
            &ClassificationConfig::default(),
        )
    }

    fn tx(function: Option<&str>, event_types: &[&str], changes: &[(&str, Owner, &str)]) -> TransactionRecord {
        let commands = function
            .map(|f| {
                vec![Command::MoveCall(MoveCall {
                    package: "0xfeed".into(),
                    module: "airdrop".into(),
                    function: f.into(),
                })]
            })
            .unwrap_or_default();
        TransactionRecord {
            digest: "D1".into(),
            sender: "0xsender".into(),
            kind: TransactionKind::Programmable { commands },
            success: true,
            gas: GasCost {
                computation: 100,
                storage: 50,
                rebate: 30,
            },
            events: event_types
                .iter()
                .map(|t| EmittedEvent { event_type: t.to_string() })
                .collect(),
            balance_changes: changes
                .iter()
                .map(|(coin, owner, amount)| BalanceChange {
                    owner: owner.clone(),
                    coin_type: coin.to_string(),
                    amount: amount.to_string(),
                })
                .collect(),
            timestamp_ms: Some(1_700_000_000_000),
            checkpoint: Some(42),
        }
    }

    #[test]
    fn claim_wins_regardless_of_sign() {
        let ex = extractor();
        let t = tx(
            Some("claim"),
            &["0xfeed::staking::StakeProof"],
            &[
                (COIN, Owner::Address("0xa".into()), "-500"),
                (COIN, Owner::Address("0xb".into()), "500"),
            ],
        );
        let events = ex.extract(&t, None).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == EventKind::Claim));
    }

    #[test]
    fn unstake_checked_before_stake() {
        let ex = extractor();
        let t = tx(None, &["0xfeed::pool::UnstakeEvent"], &[(COIN, Owner::Address("0xa".into()), "10")]);
        assert_eq!(ex.extract(&t, None).unwrap()[0].kind, EventKind::Unstake);

        let t = tx(None, &["0xfeed::pool::StakeProof"], &[(COIN, Owner::Address("0xa".into()), "10")]);
        assert_eq!(ex.extract(&t, None).unwrap()[0].kind, EventKind::Stake);
    }

    #[test]
    fn amount_sign_classification() {
        let ex = extractor();
        let t = tx(
            None,
            &[],
            &[
                (COIN, Owner::Address("0xa".into()), "-40"),
                (COIN, Owner::Address("0xb".into()), "40"),
                (COIN, Owner::Address("0xc".into()), "0"),
                (COIN, Owner::Address("0xd".into()), "-0"),
            ],
        );
        let kinds: Vec<_> = ex.extract(&t, None).unwrap().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Sell, EventKind::Transfer, EventKind::Transfer, EventKind::Sell]
        );
    }

    #[test]
    fn wide_amounts_are_kept_verbatim() {
        let ex = extractor();
        let huge = "-1234567890123456789012345678901234567890";
        let t = tx(
            None,
            &[],
            &[
                (COIN, Owner::Address("0xa".into()), huge),
                (COIN, Owner::Address("0xb".into()), " 1234567890123456789012345678901234567890 "),
            ],
        );
        let events = ex.extract(&t, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].amount, huge);
        assert_eq!(events[0].kind, EventKind::Sell);
        assert_eq!(events[1].amount, "1234567890123456789012345678901234567890");
        assert_eq!(events[1].kind, EventKind::Transfer);
    }

    #[test]
    fn non_numeric_amount_marks_the_transaction_malformed() {
        let ex = extractor();
        let t = tx(
            None,
            &[],
            &[
                (COIN, Owner::Address("0xa".into()), "12"),
                (COIN, Owner::Address("0xb".into()), "1e9"),
            ],
        );
        match ex.extract(&t, None) {
            Err(SyncError::Parse { digest, reason }) => {
                assert_eq!(digest, "D1");
                assert!(reason.contains("1e9"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        for bad in ["", "-", "--5", "5.", ".5", "0x10"] {
            assert!(signed_amount(bad).is_none(), "{bad:?}");
        }
        assert_eq!(signed_amount("+7"), Some(("+7", false)));
        assert_eq!(signed_amount("-0.25"), Some(("-0.25", true)));
    }

    #[test]
    fn other_assets_ignored_and_alias_matches() {
        let ex = extractor();
        let t = tx(
            None,
            &[],
            &[
                ("0x2::sui::SUI", Owner::Address("0xa".into()), "-1000"),
                ("0xother::CHIRP::Chirp", Owner::Address("0xb".into()), "5"),
            ],
        );
        let events = ex.extract(&t, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].recipient, "0xb");
    }

    #[test]
    fn recipient_fallbacks_and_gas_fee() {
        let ex = extractor();
        let t = tx(
            None,
            &[],
            &[
                (COIN, Owner::Object("0xobj".into()), "1"),
                (COIN, Owner::Shared, "2"),
            ],
        );
        let events = ex.extract(&t, None).unwrap();
        assert_eq!(events[0].recipient, "0xobj");
        assert_eq!(events[1].recipient, "");
        assert!(events.iter().all(|e| e.gas_fee == "120"));
    }

    #[test]
    fn locator_supplies_missing_position() {
        let ex = extractor();
        let mut t = tx(None, &[], &[(COIN, Owner::Address("0xa".into()), "1")]);
        t.checkpoint = None;
        t.timestamp_ms = None;
        assert!(matches!(ex.extract(&t, None), Err(SyncError::Parse { .. })));

        let loc = TxLocator {
            digest: "D1".into(),
            checkpoint: Some(7),
            timestamp_ms: Some(1_000),
        };
        let events = ex.extract(&t, Some(&loc)).unwrap();
        assert_eq!(events[0].checkpoint, 7);
        assert_eq!(events[0].timestamp.timestamp_millis(), 1_000);
    }

    #[test]
    fn non_programmable_has_no_claim() {
        let ex = extractor();
        let mut t = tx(None, &[], &[(COIN, Owner::Address("0xa".into()), "3")]);
        t.kind = TransactionKind::Other { name: "Genesis".into() };
        assert_eq!(ex.extract(&t, None).unwrap()[0].kind, EventKind::Transfer);
    }
}
