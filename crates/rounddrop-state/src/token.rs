//! Token ledger collaborator.
//!
//! The distribution engine never touches balances directly; it asks a
//! [`TokenLedger`] to move value in and out of its custody account. A token
//! may charge a tax on every transfer and may call back into the engine while
//! a transfer is in flight.

use rounddrop_core::constants::BPS_DENOMINATOR;
use rounddrop_core::error::TokenError;
use rounddrop_core::types::{AccountId, Amount};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;
use tracing::debug;

use crate::db::LedgerDb;

const FEE_KEY: &[u8] = b"fee_bps";

/// Fungible token with balance and allowance semantics.
pub trait TokenLedger: Send + Sync {
    fn balance_of(&self, account: &AccountId) -> Result<Amount, TokenError>;

    /// Move `amount` out of `from`, which must be the account issuing the call.
    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TokenError>;

    /// Move `amount` out of `from` on behalf of `spender`, consuming allowance.
    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError>;
}

/// Sled-backed token living next to the ledger in the same database.
///
/// With a non-zero `fee_bps` every transfer burns `amount * fee_bps / 10_000`
/// (rounded down) and the recipient receives the rest.
pub struct DbToken {
    balances: sled::Tree,
    allowances: sled::Tree,
    meta: sled::Tree,
    fee_bps: u16,
}

impl DbToken {
    /// Create the token trees and record the transfer tax.
    pub fn create(db: &LedgerDb, fee_bps: u16) -> Result<Self, TokenError> {
        if fee_bps as u128 > BPS_DENOMINATOR {
            return Err(TokenError::InvalidFee { bps: fee_bps });
        }
        let token = Self::open_trees(db, fee_bps)?;
        token.meta.insert(FEE_KEY, &fee_bps.to_be_bytes()[..]).map_err(storage)?;
        Ok(token)
    }

    /// Open an existing token; a database without one yields an untaxed token.
    pub fn open(db: &LedgerDb) -> Result<Self, TokenError> {
        let mut token = Self::open_trees(db, 0)?;
        if let Some(bytes) = token.meta.get(FEE_KEY).map_err(storage)? {
            let arr: [u8; 2] = bytes
                .as_ref()
                .try_into()
                .map_err(|_| TokenError::Storage("malformed fee record".into()))?;
            token.fee_bps = u16::from_be_bytes(arr);
        }
        Ok(token)
    }

    fn open_trees(db: &LedgerDb, fee_bps: u16) -> Result<Self, TokenError> {
        let tree = |name: &str| db.open_tree(name).map_err(|e| TokenError::Storage(e.to_string()));
        Ok(Self {
            balances: tree("token_balances")?,
            allowances: tree("token_allowances")?,
            meta: tree("token_meta")?,
            fee_bps,
        })
    }

    pub fn fee_bps(&self) -> u16 {
        self.fee_bps
    }

    /// Tax charged on a transfer of `amount`.
    pub fn fee_for(&self, amount: Amount) -> Amount {
        amount.saturating_mul(self.fee_bps as u128) / BPS_DENOMINATOR
    }

    /// Credit freshly issued tokens to `to`.
    pub fn mint(&self, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.balances
            .transaction(|balances| {
                let have = read_amount(balances, to.as_bytes())?;
                let next = have
                    .checked_add(amount)
                    .ok_or_else(|| abort(TokenError::Rejected("balance overflow".into())))?;
                balances.insert(&to.as_bytes()[..], &next.to_be_bytes()[..])?;
                Ok::<(), ConflictableTransactionError<TokenError>>(())
            })
            .map_err(unwrap_tx)?;
        debug!(to = %to, amount, "token minted");
        Ok(())
    }

    pub fn approve(&self, owner: &AccountId, spender: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.allowances
            .insert(allowance_key(owner, spender), &amount.to_be_bytes()[..])
            .map_err(storage)?;
        debug!(owner = %owner, spender = %spender, amount, "allowance set");
        Ok(())
    }

    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> Result<Amount, TokenError> {
        match self.allowances.get(allowance_key(owner, spender)).map_err(storage)? {
            Some(bytes) => decode_amount(&bytes),
            None => Ok(0),
        }
    }

    fn move_funds(
        &self,
        spender: Option<&AccountId>,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        let fee = self.fee_for(amount);
        (&self.balances, &self.allowances)
            .transaction(|(balances, allowances)| {
                if let Some(spender) = spender {
                    let key = allowance_key(from, spender);
                    let allowed = read_amount(allowances, &key)?;
                    if allowed < amount {
                        return Err(abort(TokenError::InsufficientAllowance { need: amount, have: allowed }));
                    }
                    allowances.insert(&key[..], &(allowed - amount).to_be_bytes()[..])?;
                }

                let have = read_amount(balances, from.as_bytes())?;
                if have < amount {
                    return Err(abort(TokenError::InsufficientBalance { need: amount, have }));
                }
                balances.insert(&from.as_bytes()[..], &(have - amount).to_be_bytes()[..])?;

                let received = read_amount(balances, to.as_bytes())?;
                let next = received
                    .checked_add(amount - fee)
                    .ok_or_else(|| abort(TokenError::Rejected("balance overflow".into())))?;
                balances.insert(&to.as_bytes()[..], &next.to_be_bytes()[..])?;
                Ok(())
            })
            .map_err(unwrap_tx)?;
        debug!(from = %from, to = %to, amount, fee, "token transfer");
        Ok(())
    }
}

impl TokenLedger for DbToken {
    fn balance_of(&self, account: &AccountId) -> Result<Amount, TokenError> {
        match self.balances.get(account.as_bytes()).map_err(storage)? {
            Some(bytes) => decode_amount(&bytes),
            None => Ok(0),
        }
    }

    fn transfer(&self, from: &AccountId, to: &AccountId, amount: Amount) -> Result<(), TokenError> {
        self.move_funds(None, from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        amount: Amount,
    ) -> Result<(), TokenError> {
        self.move_funds(Some(spender), from, to, amount)
    }
}

fn allowance_key(owner: &AccountId, spender: &AccountId) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(owner.as_bytes());
    key[32..].copy_from_slice(spender.as_bytes());
    key
}

fn read_amount(
    tree: &TransactionalTree,
    key: &[u8],
) -> Result<Amount, ConflictableTransactionError<TokenError>> {
    match tree.get(key)? {
        Some(bytes) => decode_amount(&bytes).map_err(ConflictableTransactionError::Abort),
        None => Ok(0),
    }
}

fn decode_amount(bytes: &[u8]) -> Result<Amount, TokenError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| TokenError::Storage(format!("malformed amount of {} bytes", bytes.len())))?;
    Ok(Amount::from_be_bytes(arr))
}

fn abort(e: TokenError) -> ConflictableTransactionError<TokenError> {
    ConflictableTransactionError::Abort(e)
}

fn unwrap_tx(e: TransactionError<TokenError>) -> TokenError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => TokenError::Storage(e.to_string()),
    }
}

fn storage(e: sled::Error) -> TokenError {
    TokenError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> LedgerDb {
        let dir = std::env::temp_dir().join(format!("rounddrop_token_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        LedgerDb::open(&dir).unwrap()
    }

    fn acct(b: u8) -> AccountId {
        AccountId::from_bytes([b; 32])
    }

    #[test]
    fn plain_transfer_moves_exact_amount() {
        let db = temp_db("plain");
        let token = DbToken::create(&db, 0).unwrap();
        token.mint(&acct(1), 100).unwrap();
        token.transfer(&acct(1), &acct(2), 40).unwrap();
        assert_eq!(token.balance_of(&acct(1)).unwrap(), 60);
        assert_eq!(token.balance_of(&acct(2)).unwrap(), 40);
    }

    #[test]
    fn insufficient_balance_leaves_balances_untouched() {
        let db = temp_db("insufficient");
        let token = DbToken::create(&db, 0).unwrap();
        token.mint(&acct(1), 10).unwrap();
        let err = token.transfer(&acct(1), &acct(2), 11).unwrap_err();
        assert_eq!(err, TokenError::InsufficientBalance { need: 11, have: 10 });
        assert_eq!(token.balance_of(&acct(1)).unwrap(), 10);
        assert_eq!(token.balance_of(&acct(2)).unwrap(), 0);
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let db = temp_db("allowance");
        let token = DbToken::create(&db, 0).unwrap();
        token.mint(&acct(1), 100).unwrap();
        token.approve(&acct(1), &acct(9), 50).unwrap();

        let err = token.transfer_from(&acct(9), &acct(1), &acct(2), 60).unwrap_err();
        assert_eq!(err, TokenError::InsufficientAllowance { need: 60, have: 50 });

        token.transfer_from(&acct(9), &acct(1), &acct(2), 30).unwrap();
        assert_eq!(token.allowance(&acct(1), &acct(9)).unwrap(), 20);
        assert_eq!(token.balance_of(&acct(2)).unwrap(), 30);
    }

    #[test]
    fn taxed_transfer_burns_fee() {
        let db = temp_db("taxed");
        let token = DbToken::create(&db, 250).unwrap();
        token.mint(&acct(1), 1_000).unwrap();
        token.transfer(&acct(1), &acct(2), 1_000).unwrap();
        assert_eq!(token.balance_of(&acct(1)).unwrap(), 0);
        assert_eq!(token.balance_of(&acct(2)).unwrap(), 975);
    }

    #[test]
    fn fee_survives_reopen() {
        let db = temp_db("reopen");
        DbToken::create(&db, 100).unwrap();
        assert_eq!(DbToken::open(&db).unwrap().fee_bps(), 100);
    }

    #[test]
    fn fee_above_denominator_rejected() {
        let db = temp_db("bad_fee");
        assert!(matches!(
            DbToken::create(&db, 10_001),
            Err(TokenError::InvalidFee { bps: 10_001 })
        ));
    }
}
