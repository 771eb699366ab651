//! Credit ledger operations.
//!
//! Balances are updated transactionally together with the append-only entry
//! so debits are linearised per tenant and every entry carries the running
//! `balance_after`.  A debit that would push the balance below zero aborts
//! with `InsufficientCredits`.

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, Transactional};

use crate::models::{LedgerEntry, LedgerEntryType};
use crate::{Store, StoreError};

fn balance_key(tenant: &str) -> String {
    format!("bal:{tenant}")
}

fn seq_key(tenant: &str) -> String {
    format!("seq:{tenant}")
}

fn entry_key(tenant: &str, seq: u64) -> String {
    // Zero-padded so lexicographic key order equals sequence order.
    format!("{tenant}/{seq:020}")
}

fn decode_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    i64::from_be_bytes(buf)
}

fn decode_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}

/// Current balance for a tenant (0 if no entries exist).
pub fn balance(store: &Store, tenant: &str) -> Result<i64, StoreError> {
    Ok(store
        .balances
        .get(balance_key(tenant).as_bytes())?
        .map(|b| decode_i64(&b))
        .unwrap_or(0))
}

/// Grant credits to a tenant.
pub fn credit(
    store: &Store,
    tenant: &str,
    amount: i64,
    operation: Option<&str>,
) -> Result<LedgerEntry, StoreError> {
    apply(store, tenant, LedgerEntryType::Credit, amount, operation)
}

/// Take credits from a tenant.  Fails without side effects when the balance
/// is insufficient.
pub fn debit(
    store: &Store,
    tenant: &str,
    amount: i64,
    operation: Option<&str>,
) -> Result<LedgerEntry, StoreError> {
    apply(store, tenant, LedgerEntryType::Debit, amount, operation)
}

fn apply(
    store: &Store,
    tenant: &str,
    entry_type: LedgerEntryType,
    amount: i64,
    operation: Option<&str>,
) -> Result<LedgerEntry, StoreError> {
    let entry = (&store.balances, &store.ledger).transaction(|(balances, ledger)| {
        let current = balances
            .get(balance_key(tenant).as_bytes())?
            .map(|b| decode_i64(&b))
            .unwrap_or(0);

        let next = match entry_type {
            LedgerEntryType::Credit => current + amount,
            LedgerEntryType::Debit => current - amount,
        };
        if next < 0 {
            return Err(ConflictableTransactionError::Abort(
                StoreError::InsufficientCredits {
                    balance: current,
                    requested: amount,
                },
            ));
        }

        let seq = balances
            .get(seq_key(tenant).as_bytes())?
            .map(|b| decode_u64(&b))
            .unwrap_or(0)
            + 1;

        balances.insert(balance_key(tenant).as_bytes(), next.to_be_bytes().to_vec())?;
        balances.insert(seq_key(tenant).as_bytes(), seq.to_be_bytes().to_vec())?;

        let entry = LedgerEntry {
            tenant: tenant.to_owned(),
            seq,
            entry_type,
            amount,
            operation: operation.map(str::to_owned),
            balance_after: next,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&entry)
            .map_err(|e| ConflictableTransactionError::Abort(StoreError::Serde(e)))?;
        ledger.insert(entry_key(tenant, seq).as_bytes(), bytes)?;

        Ok(entry)
    })?;
    Ok(entry)
}

/// All ledger entries for a tenant in sequence order.
pub fn entries(store: &Store, tenant: &str) -> Result<Vec<LedgerEntry>, StoreError> {
    let mut out = Vec::new();
    for item in store.ledger.scan_prefix(format!("{tenant}/").as_bytes()) {
        let (_, bytes) = item?;
        out.push(serde_json::from_slice(&bytes)?);
    }
    Ok(out)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balances_chain_through_entries() {
        let store = Store::temporary().expect("open store");
        credit(&store, "t1", 100, None).unwrap();
        debit(&store, "t1", 30, Some("workflow-run")).unwrap();
        debit(&store, "t1", 20, Some("nilai-llm")).unwrap();
        credit(&store, "t1", 5, None).unwrap();

        let entries = entries(&store, "t1").unwrap();
        assert_eq!(entries.len(), 4);

        let mut previous = 0i64;
        for entry in &entries {
            let signed = match entry.entry_type {
                LedgerEntryType::Credit => entry.amount,
                LedgerEntryType::Debit => -entry.amount,
            };
            assert_eq!(entry.balance_after, previous + signed);
            assert!(entry.balance_after >= 0);
            previous = entry.balance_after;
        }
        assert_eq!(balance(&store, "t1").unwrap(), 55);
    }

    #[test]
    fn debit_below_zero_is_rejected_without_side_effects() {
        let store = Store::temporary().expect("open store");
        credit(&store, "t1", 10, None).unwrap();

        let err = debit(&store, "t1", 11, Some("nilai-llm")).unwrap_err();
        assert!(matches!(err, StoreError::InsufficientCredits { balance: 10, requested: 11 }));

        assert_eq!(balance(&store, "t1").unwrap(), 10);
        assert_eq!(entries(&store, "t1").unwrap().len(), 1);
    }

    #[test]
    fn tenants_are_isolated() {
        let store = Store::temporary().expect("open store");
        credit(&store, "t1", 50, None).unwrap();
        credit(&store, "t2", 7, None).unwrap();

        assert_eq!(balance(&store, "t1").unwrap(), 50);
        assert_eq!(balance(&store, "t2").unwrap(), 7);
        assert_eq!(entries(&store, "t2").unwrap().len(), 1);
    }
}
