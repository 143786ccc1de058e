//! Sui JSON-RPC response shapes and their conversion into core ledger records.
//!
//! Sui encodes `u64` values (sequence numbers, gas costs, timestamps) as
//! decimal strings. Transaction kinds, commands and owners are open-ended
//! tagged objects; anything not modelled here decodes into the `Other` /
//! `Unknown` variants of the core records instead of failing.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use coinsync_core::ledger::{
    BalanceChange, CheckpointRecord, Command, EmittedEvent, GasCost, MoveCall, Owner,
    RejectedEntry, TransactionKind, TransactionPage, TransactionRecord,
};
use coinsync_core::SyncError;

/// Options requested on every transaction read.
pub fn response_options() -> Value {
    serde_json::json!({
        "showInput": true,
        "showEffects": true,
        "showEvents": true,
        "showBalanceChanges": true,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StrOrNum {
    Str(String),
    Num(u64),
}

impl StrOrNum {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            Self::Num(n) => Ok(n),
            Self::Str(s) => s
                .parse()
                .map_err(|_| E::custom(format!("expected decimal u64, got {s:?}"))),
        }
    }
}

/// Decode a `u64` sent either as a JSON number or a decimal string.
pub fn de_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    StrOrNum::deserialize(d)?.into_u64()
}

fn de_opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    match Option::<StrOrNum>::deserialize(d)? {
        Some(v) => v.into_u64().map(Some),
        None => Ok(None),
    }
}

// ─── Checkpoints ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireCheckpoint {
    #[serde(deserialize_with = "de_u64")]
    pub sequence_number: u64,
    #[serde(deserialize_with = "de_u64")]
    pub timestamp_ms: u64,
    #[serde(default)]
    pub transactions: Vec<String>,
}

impl From<WireCheckpoint> for CheckpointRecord {
    fn from(w: WireCheckpoint) -> Self {
        CheckpointRecord {
            sequence_number: w.sequence_number,
            timestamp_ms: w.timestamp_ms,
            transactions: w.transactions,
        }
    }
}

// ─── Transaction blocks ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransactionBlock {
    pub digest: String,
    #[serde(default)]
    pub transaction: Option<WireTransaction>,
    #[serde(default)]
    pub effects: Option<WireEffects>,
    #[serde(default)]
    pub events: Vec<WireEvent>,
    #[serde(default)]
    pub balance_changes: Vec<WireBalanceChange>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub timestamp_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_opt_u64")]
    pub checkpoint: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct WireTransaction {
    pub data: WireTransactionData,
}

#[derive(Debug, Deserialize)]
pub struct WireTransactionData {
    pub sender: String,
    pub transaction: WireTransactionKind,
}

#[derive(Debug, Deserialize)]
pub struct WireTransactionKind {
    pub kind: String,
    #[serde(default)]
    pub transactions: Vec<WireCommand>,
}

/// One programmable-transaction command: `{"MoveCall": {...}}`,
/// `{"TransferObjects": [...]}`, …
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireCommand {
    MoveCall {
        #[serde(rename = "MoveCall")]
        call: WireMoveCall,
    },
    Other(Value),
}

#[derive(Debug, Deserialize)]
pub struct WireMoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEffects {
    pub status: WireStatus,
    pub gas_used: WireGasUsed,
}

#[derive(Debug, Deserialize)]
pub struct WireStatus {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGasUsed {
    #[serde(deserialize_with = "de_u64")]
    pub computation_cost: u64,
    #[serde(deserialize_with = "de_u64")]
    pub storage_cost: u64,
    #[serde(deserialize_with = "de_u64")]
    pub storage_rebate: u64,
}

#[derive(Debug, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBalanceChange {
    pub owner: WireOwnerRepr,
    pub coin_type: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub enum WireOwner {
    AddressOwner(String),
    ObjectOwner(String),
    Shared(Value),
    Immutable,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum WireOwnerRepr {
    Known(WireOwner),
    Unknown(Value),
}

impl From<WireOwnerRepr> for Owner {
    fn from(w: WireOwnerRepr) -> Self {
        match w {
            WireOwnerRepr::Known(WireOwner::AddressOwner(a)) => Owner::Address(a),
            WireOwnerRepr::Known(WireOwner::ObjectOwner(o)) => Owner::Object(o),
            WireOwnerRepr::Known(WireOwner::Shared(_)) => Owner::Shared,
            WireOwnerRepr::Known(WireOwner::Immutable) => Owner::Immutable,
            WireOwnerRepr::Unknown(_) => Owner::Unknown,
        }
    }
}

impl From<WireCommand> for Command {
    fn from(w: WireCommand) -> Self {
        match w {
            WireCommand::MoveCall { call } => Command::MoveCall(MoveCall {
                package: call.package,
                module: call.module,
                function: call.function,
            }),
            WireCommand::Other(v) => Command::Other(command_name(&v)),
        }
    }
}

fn command_name(v: &Value) -> String {
    match v {
        Value::Object(map) => map.keys().next().cloned().unwrap_or_default(),
        Value::String(s) => s.clone(),
        _ => String::new(),
    }
}

impl WireTransactionKind {
    fn into_kind(self) -> TransactionKind {
        if self.kind == "ProgrammableTransaction" {
            TransactionKind::Programmable {
                commands: self.transactions.into_iter().map(Command::from).collect(),
            }
        } else {
            TransactionKind::Other { name: self.kind }
        }
    }
}

impl TryFrom<WireTransactionBlock> for TransactionRecord {
    type Error = SyncError;

    /// Input and effects are required; a block without them was fetched with
    /// the wrong options or is not yet executed.
    fn try_from(w: WireTransactionBlock) -> Result<Self, Self::Error> {
        let missing = |what: &str| SyncError::Parse {
            digest: w.digest.clone(),
            reason: format!("response has no {what}"),
        };
        let tx = w.transaction.ok_or_else(|| missing("transaction input"))?;
        let effects = w.effects.ok_or_else(|| missing("effects"))?;

        Ok(TransactionRecord {
            sender: tx.data.sender,
            kind: tx.data.transaction.into_kind(),
            success: effects.status.status == "success",
            gas: GasCost {
                computation: effects.gas_used.computation_cost,
                storage: effects.gas_used.storage_cost,
                rebate: effects.gas_used.storage_rebate,
            },
            events: w
                .events
                .into_iter()
                .map(|e| EmittedEvent { event_type: e.event_type })
                .collect(),
            balance_changes: w
                .balance_changes
                .into_iter()
                .map(|b| BalanceChange {
                    owner: b.owner.into(),
                    coin_type: b.coin_type,
                    amount: b.amount,
                })
                .collect(),
            timestamp_ms: w.timestamp_ms,
            checkpoint: w.checkpoint,
            digest: w.digest,
        })
    }
}

// ─── Address queries ─────────────────────────────────────────────────────────

/// Page entries stay raw so each one decodes on its own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTransactionPage {
    #[serde(default)]
    pub data: Vec<Value>,
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    pub has_next_page: bool,
}

fn decode_entry(raw: Value) -> Result<TransactionRecord, String> {
    let block: WireTransactionBlock = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    TransactionRecord::try_from(block).map_err(|e| e.to_string())
}

impl From<WireTransactionPage> for TransactionPage {
    fn from(w: WireTransactionPage) -> Self {
        let mut data = Vec::with_capacity(w.data.len());
        let mut rejected = Vec::new();
        for raw in w.data {
            let digest = raw.get("digest").and_then(Value::as_str).map(str::to_string);
            match decode_entry(raw) {
                Ok(record) => data.push(record),
                Err(reason) => {
                    tracing::warn!(
                        digest = digest.as_deref().unwrap_or("<none>"),
                        reason = %reason,
                        "Rejected address page entry"
                    );
                    rejected.push(RejectedEntry { digest, reason });
                }
            }
        }
        TransactionPage {
            data,
            rejected,
            next_cursor: w.next_cursor,
            has_next_page: w.has_next_page,
        }
    }
}
