//! In-memory RPC fake shared by the scheme tests.

use std::collections::HashMap;
use std::sync::Mutex;

use solana_account::Account;
use solana_hash::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_option::COption;
use spl_token::solana_program::program_pack::Pack;

use crate::chain::rpc::{
    BlockhashLifetime, RpcClientLike, RpcError, SignatureStatusSummary, SimulateConfig,
    SimulationSummary,
};

/// In-memory account store standing in for the chain.
pub struct FakeRpc {
    accounts: Mutex<HashMap<Pubkey, Account>>,
    pub simulated_units: u64,
    pub simulation_err: Mutex<Option<String>>,
    pub signature_status: Mutex<Option<SignatureStatusSummary>>,
    pub block_height: Mutex<u64>,
    pub last_valid_block_height: u64,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            simulated_units: 4_806,
            simulation_err: Mutex::new(None),
            signature_status: Mutex::new(Some(SignatureStatusSummary {
                err: None,
                confirmed: true,
            })),
            block_height: Mutex::new(10),
            last_valid_block_height: 1_000,
        }
    }

    pub fn put_account(&self, pubkey: Pubkey, account: Account) {
        self.accounts.lock().unwrap().insert(pubkey, account);
    }

    pub fn remove_account(&self, pubkey: &Pubkey) {
        self.accounts.lock().unwrap().remove(pubkey);
    }

    pub fn put_spl_mint(&self, mint: Pubkey, decimals: u8) {
        let state = spl_token::state::Mint {
            mint_authority: COption::None,
            supply: 1_000_000_000,
            decimals,
            is_initialized: true,
            freeze_authority: COption::None,
        };
        let mut data = vec![0u8; spl_token::state::Mint::LEN];
        spl_token::state::Mint::pack(state, &mut data).unwrap();
        self.put_account(
            mint,
            Account {
                lamports: 1,
                data,
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
    }

    pub fn put_token_account(&self, pubkey: Pubkey) {
        self.put_account(
            pubkey,
            Account {
                lamports: 1,
                data: vec![0u8; 165],
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
    }
}

impl RpcClientLike for FakeRpc {
    async fn get_account(&self, pubkey: &Pubkey) -> Result<Option<Account>, RpcError> {
        Ok(self.accounts.lock().unwrap().get(pubkey).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, RpcError> {
        let accounts = self.accounts.lock().unwrap();
        Ok(pubkeys.iter().map(|k| accounts.get(k).cloned()).collect())
    }

    async fn get_latest_blockhash(&self) -> Result<BlockhashLifetime, RpcError> {
        Ok(BlockhashLifetime {
            blockhash: Hash::default(),
            last_valid_block_height: self.last_valid_block_height,
        })
    }

    async fn get_block_height(&self) -> Result<u64, RpcError> {
        Ok(*self.block_height.lock().unwrap())
    }

    async fn get_signature_status(
        &self,
        _: &Signature,
    ) -> Result<Option<SignatureStatusSummary>, RpcError> {
        Ok(self.signature_status.lock().unwrap().clone())
    }

    async fn send_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, RpcError> {
        Ok(*transaction
            .signatures
            .first()
            .unwrap_or(&Signature::default()))
    }

    async fn simulate_transaction(
        &self,
        _: &VersionedTransaction,
        _: SimulateConfig,
    ) -> Result<SimulationSummary, RpcError> {
        Ok(SimulationSummary {
            err: self.simulation_err.lock().unwrap().clone(),
            units_consumed: Some(self.simulated_units),
        })
    }
}
