//! In-memory ledger for development and tests.
//!
//! Holds singleton token custody and native balances behind one mutex, so
//! every call is atomic. Each confirmed transaction is signed with the
//! ledger's ed25519 key; the hex signature is the transaction proof.
//!
//! Two fault hooks model a real ledger's failure modes:
//! - a confirmation delay, applied *after* the state change, so a caller
//!   that gives up waiting sees a timeout for a transfer that landed;
//! - rejection of the next `n` mutating calls before they apply.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dealmint_types::{
    ConfirmedTransfer, CouponId, DealmintError, PaySplit, Result, TokenMove, TxProof, WalletId,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::LedgerClient;

const SIGNING_DOMAIN: &[u8] = b"dealmint:ledger:v1:";

struct Recorded {
    transfer: ConfirmedTransfer,
    sequence: u64,
}

#[derive(Default)]
struct LedgerState {
    /// Current holder of each minted token.
    holders: HashMap<CouponId, WalletId>,
    native: HashMap<WalletId, u64>,
    /// Total native supply ever funded.
    supply: u64,
    transactions: HashMap<TxProof, Recorded>,
    sequence: u64,
}

/// A single-process ledger with signed confirmations.
pub struct InMemoryLedger {
    signing_key: SigningKey,
    state: Mutex<LedgerState>,
    confirm_delay_ms: AtomicU64,
    reject_next: AtomicU32,
}

impl InMemoryLedger {
    /// Create a ledger whose signing key is derived from `seed`.
    #[must_use]
    pub fn new(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"dealmint:ledger-key:v1:");
        hasher.update(seed.as_bytes());
        let secret: [u8; 32] = hasher.finalize().into();
        Self {
            signing_key: SigningKey::from_bytes(&secret),
            state: Mutex::new(LedgerState::default()),
            confirm_delay_ms: AtomicU64::new(0),
            reject_next: AtomicU32::new(0),
        }
    }

    /// Key that verifies every proof this ledger issues.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Credit `amount` of native currency to `account` from outside the
    /// system.
    pub fn fund(&self, account: &WalletId, amount: u64) -> Result<()> {
        let mut state = self.lock()?;
        let balance = state.native.get(account).copied().unwrap_or(0);
        let new_balance = balance
            .checked_add(amount)
            .ok_or(DealmintError::ArithmeticOverflow)?;
        let new_supply = state
            .supply
            .checked_add(amount)
            .ok_or(DealmintError::ArithmeticOverflow)?;
        state.native.insert(account.clone(), new_balance);
        state.supply = new_supply;
        Ok(())
    }

    /// Delay confirmation of subsequent mutating calls.
    pub fn set_confirmation_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.confirm_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Reject the next `n` mutating calls before they apply.
    pub fn reject_next(&self, n: u32) {
        self.reject_next.store(n, Ordering::SeqCst);
    }

    /// Check that native balances sum to the funded supply.
    pub fn verify_supply(&self) -> Result<()> {
        let state = self.lock()?;
        let actual = state
            .native
            .values()
            .try_fold(0u64, |acc, v| acc.checked_add(*v))
            .ok_or(DealmintError::ArithmeticOverflow)?;
        if actual != state.supply {
            return Err(DealmintError::Internal(format!(
                "native supply {actual} != funded {}",
                state.supply
            )));
        }
        Ok(())
    }

    /// Number of confirmed transactions.
    pub fn transaction_count(&self) -> Result<usize> {
        Ok(self.lock()?.transactions.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, LedgerState>> {
        self.state
            .lock()
            .map_err(|_| DealmintError::Internal("ledger state lock poisoned".into()))
    }

    fn take_injected_rejection(&self) -> bool {
        self.reject_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    async fn await_confirmation(&self) {
        let ms = self.confirm_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Sign and record a transaction whose effects are already applied.
    fn record(
        &self,
        state: &mut LedgerState,
        token_move: Option<TokenMove>,
        payer: Option<WalletId>,
        splits: Vec<PaySplit>,
    ) -> TxProof {
        state.sequence += 1;
        let sequence = state.sequence;
        let mut transfer = ConfirmedTransfer {
            proof: TxProof::new(String::new()),
            token_move,
            payer,
            splits,
            confirmed_at: Utc::now(),
        };
        let signature = self.signing_key.sign(&signing_payload(&transfer, sequence));
        let proof = TxProof::new(hex::encode(signature.to_bytes()));
        transfer.proof = proof.clone();
        state
            .transactions
            .insert(proof.clone(), Recorded { transfer, sequence });
        proof
    }

    fn move_token(state: &mut LedgerState, token_move: &TokenMove) -> Result<()> {
        match state.holders.get(&token_move.token) {
            Some(holder) if *holder == token_move.from => {}
            Some(_) => {
                return Err(DealmintError::LedgerRejected {
                    reason: format!(
                        "{} does not hold token {}",
                        token_move.from, token_move.token
                    ),
                });
            }
            None => {
                return Err(DealmintError::LedgerRejected {
                    reason: format!("token {} has no supply", token_move.token),
                });
            }
        }
        state
            .holders
            .insert(token_move.token, token_move.to.clone());
        Ok(())
    }
}

/// Canonical signing payload. Strings are length-prefixed.
fn signing_payload(transfer: &ConfirmedTransfer, sequence: u64) -> Vec<u8> {
    fn put_str(buf: &mut Vec<u8>, s: &str) {
        buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
        buf.extend_from_slice(s.as_bytes());
    }

    let mut payload = Vec::with_capacity(256);
    payload.extend_from_slice(SIGNING_DOMAIN);
    payload.extend_from_slice(&sequence.to_le_bytes());
    match &transfer.token_move {
        Some(m) => {
            payload.push(1);
            payload.extend_from_slice(m.token.0.as_bytes());
            put_str(&mut payload, m.from.as_str());
            put_str(&mut payload, m.to.as_str());
        }
        None => payload.push(0),
    }
    match &transfer.payer {
        Some(p) => {
            payload.push(1);
            put_str(&mut payload, p.as_str());
        }
        None => payload.push(0),
    }
    payload.extend_from_slice(&(transfer.splits.len() as u64).to_le_bytes());
    for split in &transfer.splits {
        put_str(&mut payload, split.recipient.as_str());
        payload.extend_from_slice(&split.amount.to_le_bytes());
    }
    payload.extend_from_slice(&timestamp_bytes(transfer.confirmed_at));
    payload
}

fn timestamp_bytes(at: DateTime<Utc>) -> [u8; 8] {
    at.timestamp_micros().to_le_bytes()
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn mint_to_escrow(&self, token: CouponId) -> Result<TxProof> {
        if self.take_injected_rejection() {
            return Err(DealmintError::LedgerRejected {
                reason: "rejected by ledger".into(),
            });
        }
        let proof = {
            let mut state = self.lock()?;
            if state.holders.contains_key(&token) {
                return Err(DealmintError::LedgerRejected {
                    reason: format!("token {token} already has supply"),
                });
            }
            let escrow = token.escrow_account();
            state.holders.insert(token, escrow.clone());
            self.record(
                &mut state,
                Some(TokenMove {
                    token,
                    from: escrow.clone(),
                    to: escrow,
                }),
                None,
                Vec::new(),
            )
        };
        tracing::debug!(%token, proof = proof.short(), "minted token into escrow");
        self.await_confirmation().await;
        Ok(proof)
    }

    async fn transfer_custody(
        &self,
        token: CouponId,
        from: &WalletId,
        to: &WalletId,
    ) -> Result<TxProof> {
        if self.take_injected_rejection() {
            return Err(DealmintError::LedgerRejected {
                reason: "rejected by ledger".into(),
            });
        }
        let proof = {
            let mut state = self.lock()?;
            let token_move = TokenMove {
                token,
                from: from.clone(),
                to: to.clone(),
            };
            Self::move_token(&mut state, &token_move)?;
            self.record(&mut state, Some(token_move), None, Vec::new())
        };
        tracing::debug!(%token, %from, %to, proof = proof.short(), "custody transferred");
        self.await_confirmation().await;
        Ok(proof)
    }

    async fn atomic_pay_split(
        &self,
        payer: &WalletId,
        splits: &[PaySplit],
        token_move: Option<&TokenMove>,
    ) -> Result<TxProof> {
        if self.take_injected_rejection() {
            return Err(DealmintError::LedgerRejected {
                reason: "rejected by ledger".into(),
            });
        }
        let proof = {
            let mut state = self.lock()?;

            let total = splits
                .iter()
                .try_fold(0u64, |acc, s| acc.checked_add(s.amount))
                .ok_or(DealmintError::ArithmeticOverflow)?;
            let available = state.native.get(payer).copied().unwrap_or(0);
            if available < total {
                return Err(DealmintError::InsufficientFunds {
                    needed: total,
                    available,
                });
            }

            // Stage every balance change before touching state.
            let mut staged: HashMap<WalletId, u64> = HashMap::new();
            staged.insert(payer.clone(), available - total);
            for split in splits {
                let current = match staged.get(&split.recipient) {
                    Some(v) => *v,
                    None => state.native.get(&split.recipient).copied().unwrap_or(0),
                };
                let credited = current
                    .checked_add(split.amount)
                    .ok_or(DealmintError::ArithmeticOverflow)?;
                staged.insert(split.recipient.clone(), credited);
            }

            if let Some(m) = token_move {
                Self::move_token(&mut state, m)?;
            }
            state.native.extend(staged);
            self.record(
                &mut state,
                token_move.cloned(),
                Some(payer.clone()),
                splits.to_vec(),
            )
        };
        tracing::debug!(%payer, legs = splits.len(), proof = proof.short(), "payment split settled");
        self.await_confirmation().await;
        Ok(proof)
    }

    async fn account_balance(&self, account: &WalletId, token: CouponId) -> Result<u64> {
        let state = self.lock()?;
        Ok(u64::from(state.holders.get(&token) == Some(account)))
    }

    async fn native_balance(&self, account: &WalletId) -> Result<u64> {
        let state = self.lock()?;
        Ok(state.native.get(account).copied().unwrap_or(0))
    }

    async fn confirmation(&self, proof: &TxProof) -> Result<Option<ConfirmedTransfer>> {
        let state = self.lock()?;
        let Some(recorded) = state.transactions.get(proof) else {
            return Ok(None);
        };
        let bytes = hex::decode(proof.as_str()).map_err(|e| DealmintError::InvalidProof {
            reason: format!("proof is not hex: {e}"),
        })?;
        let signature = Signature::from_slice(&bytes).map_err(|e| DealmintError::InvalidProof {
            reason: format!("malformed signature: {e}"),
        })?;
        self.verifying_key()
            .verify(
                &signing_payload(&recorded.transfer, recorded.sequence),
                &signature,
            )
            .map_err(|_| DealmintError::InvalidProof {
                reason: "signature does not match recorded transaction".into(),
            })?;
        Ok(Some(recorded.transfer.clone()))
    }
}

#[cfg(test)]
impl InMemoryLedger {
    /// Rewrite the first split of a recorded transaction without re-signing.
    fn tamper(&self, proof: &TxProof, amount: u64) {
        let mut state = self.lock().unwrap();
        let recorded = state.transactions.get_mut(proof).unwrap();
        recorded.transfer.splits[0].amount = amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new("test-seed")
    }

    #[tokio::test]
    async fn mint_places_token_in_escrow_once() {
        let ledger = ledger();
        let token = CouponId::new();
        ledger.mint_to_escrow(token).await.unwrap();
        assert_eq!(
            ledger
                .account_balance(&token.escrow_account(), token)
                .await
                .unwrap(),
            1
        );
        let err = ledger.mint_to_escrow(token).await.unwrap_err();
        assert!(matches!(err, DealmintError::LedgerRejected { .. }));
    }

    #[tokio::test]
    async fn custody_moves_once() {
        let ledger = ledger();
        let token = CouponId::new();
        let escrow = token.escrow_account();
        let alice = WalletId::random();
        let bob = WalletId::random();
        ledger.mint_to_escrow(token).await.unwrap();

        ledger.transfer_custody(token, &escrow, &alice).await.unwrap();
        assert_eq!(ledger.account_balance(&alice, token).await.unwrap(), 1);
        assert_eq!(ledger.account_balance(&escrow, token).await.unwrap(), 0);

        let err = ledger
            .transfer_custody(token, &escrow, &bob)
            .await
            .unwrap_err();
        assert!(matches!(err, DealmintError::LedgerRejected { .. }));
        assert_eq!(ledger.account_balance(&bob, token).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn pay_split_is_all_or_nothing() {
        let ledger = ledger();
        let buyer = WalletId::random();
        let merchant = WalletId::random();
        let platform = WalletId::random();
        ledger.fund(&buyer, 1_000).unwrap();

        let splits = vec![
            PaySplit::new(merchant.clone(), 975),
            PaySplit::new(platform.clone(), 25),
        ];
        // Token move fails: nothing minted. No balance may change.
        let bogus = TokenMove {
            token: CouponId::new(),
            from: merchant.clone(),
            to: buyer.clone(),
        };
        assert!(ledger
            .atomic_pay_split(&buyer, &splits, Some(&bogus))
            .await
            .is_err());
        assert_eq!(ledger.native_balance(&buyer).await.unwrap(), 1_000);
        assert_eq!(ledger.native_balance(&merchant).await.unwrap(), 0);

        ledger.atomic_pay_split(&buyer, &splits, None).await.unwrap();
        assert_eq!(ledger.native_balance(&buyer).await.unwrap(), 0);
        assert_eq!(ledger.native_balance(&merchant).await.unwrap(), 975);
        assert_eq!(ledger.native_balance(&platform).await.unwrap(), 25);
        ledger.verify_supply().unwrap();
    }

    #[tokio::test]
    async fn insufficient_funds_reports_amounts() {
        let ledger = ledger();
        let buyer = WalletId::random();
        ledger.fund(&buyer, 10).unwrap();
        let err = ledger
            .atomic_pay_split(&buyer, &[PaySplit::new(WalletId::random(), 11)], None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DealmintError::InsufficientFunds {
                needed: 11,
                available: 10
            }
        );
    }

    #[tokio::test]
    async fn confirmation_verifies_signature() {
        let ledger = ledger();
        let payer = WalletId::random();
        let payee = WalletId::random();
        ledger.fund(&payer, 100).unwrap();
        let proof = ledger
            .atomic_pay_split(&payer, &[PaySplit::new(payee.clone(), 40)], None)
            .await
            .unwrap();

        let confirmed = ledger.confirmation(&proof).await.unwrap().unwrap();
        assert_eq!(confirmed.paid_to(&payee), 40);
        assert_eq!(confirmed.payer, Some(payer));

        assert!(ledger
            .confirmation(&TxProof::new("deadbeef"))
            .await
            .unwrap()
            .is_none());

        ledger.tamper(&proof, 90);
        let err = ledger.confirmation(&proof).await.unwrap_err();
        assert!(matches!(err, DealmintError::InvalidProof { .. }));
    }

    #[tokio::test]
    async fn identical_transfers_get_distinct_proofs() {
        let ledger = ledger();
        let payer = WalletId::random();
        let payee = WalletId::random();
        ledger.fund(&payer, 100).unwrap();
        let split = [PaySplit::new(payee, 1)];
        let a = ledger.atomic_pay_split(&payer, &split, None).await.unwrap();
        let b = ledger.atomic_pay_split(&payer, &split, None).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn injected_rejection_applies_nothing() {
        let ledger = ledger();
        let token = CouponId::new();
        ledger.reject_next(1);
        assert!(ledger.mint_to_escrow(token).await.is_err());
        assert_eq!(
            ledger
                .account_balance(&token.escrow_account(), token)
                .await
                .unwrap(),
            0
        );
        ledger.mint_to_escrow(token).await.unwrap();
    }

    #[test]
    fn same_seed_same_key() {
        assert_eq!(
            InMemoryLedger::new("a").verifying_key(),
            InMemoryLedger::new("a").verifying_key()
        );
        assert_ne!(
            InMemoryLedger::new("a").verifying_key(),
            InMemoryLedger::new("b").verifying_key()
        );
    }
}
