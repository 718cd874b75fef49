//! Transaction execution against world state.
//!
//! Applies transactions, issues receipts, and tracks per-block cumulative
//! gas. Every transaction runs inside its own checkpoint: a trap of any
//! kind (revert, out-of-gas, bad nonce, bad balance) consumes the full gas
//! limit, produces a failed receipt, and leaves the world state untouched.

use super::interpreter::{self, BlockEnv, CallEnv, VmError};
use super::state::WorldState;
use crate::types::transaction::{Receipt, ReceiptStatus, Transaction};
use crate::types::{keccak256, Address, Hash, U256};
use tracing::debug;

/// Base cost of any transaction.
pub const TX_BASE_GAS: u64 = 21_000;

/// Per-byte calldata cost.
const TX_DATA_GAS: u64 = 16;

/// Deployment surcharge and per-byte code cost, charged when storing code.
const CREATE_BASE_GAS: u64 = 32_000;
const CREATE_DATA_GAS: u64 = 200;

/// Gas cap used by `estimate_gas` probes.
const ESTIMATE_GAS_CAP: u64 = 10_000_000;

/// Result of executing one transaction.
#[derive(Debug)]
pub struct Execution {
    pub receipt: Receipt,
    pub return_value: Vec<u8>,
    pub created_address: Option<Address>,
}

struct Applied {
    gas_used: u64,
    output: Vec<u8>,
    logs: Vec<crate::types::transaction::LogEntry>,
    created_address: Option<Address>,
}

/// EVM-compatible executor over an owned world state.
pub struct EvmExecutor {
    state: WorldState,
    block_env: BlockEnv,
    cumulative_gas: u64,
}

impl EvmExecutor {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: WorldState::new(),
            block_env: BlockEnv {
                chain_id,
                ..BlockEnv::default()
            },
            cumulative_gas: 0,
        }
    }

    /// Set the block context the next executions run under. Called by the
    /// miner before each block.
    pub fn set_block_env(&mut self, number: u64, timestamp: u64, coinbase: Address) {
        self.block_env.number = number;
        self.block_env.timestamp = timestamp;
        self.block_env.coinbase = coinbase;
    }

    /// Reset the per-block cumulative gas counter. Called by the miner at
    /// the start of each block's execution.
    pub fn reset_cumulative_gas(&mut self) {
        self.cumulative_gas = 0;
    }

    pub fn cumulative_gas_used(&self) -> u64 {
        self.cumulative_gas
    }

    /// Execute a transaction for inclusion in a block.
    ///
    /// Never fails outward: traps become `Failed` receipts with the full
    /// gas limit consumed and no state change. The receipt's block hash is
    /// provisional until the miner seals the block.
    pub fn execute(&mut self, tx: &Transaction, containing_block_hash: Hash) -> Execution {
        self.state.checkpoint();
        let result = self.apply(tx, tx.gas_limit);

        let (status, gas_used, output, logs, created_address) = match result {
            Ok(applied) => {
                self.state.commit();
                (
                    ReceiptStatus::Success,
                    applied.gas_used,
                    applied.output,
                    applied.logs,
                    applied.created_address,
                )
            }
            Err(err) => {
                self.state.revert();
                debug!(tx = %tx.hash, error = %err, "transaction failed");
                (ReceiptStatus::Failed, tx.gas_limit, Vec::new(), Vec::new(), None)
            }
        };

        self.cumulative_gas += gas_used;

        Execution {
            receipt: Receipt {
                transaction_hash: tx.hash,
                block_hash: containing_block_hash,
                from: tx.from,
                to: tx.to,
                gas_used,
                cumulative_gas_used: self.cumulative_gas,
                status,
                logs,
                contract_address: created_address,
            },
            return_value: output,
            created_address,
        }
    }

    /// Read-only call against the current state.
    ///
    /// Runs inside a checkpoint that is always reverted, so no mutation
    /// can leak. Traps propagate to the caller.
    pub fn call(
        &mut self,
        to: Address,
        data: &[u8],
        from: Option<Address>,
        value: Option<U256>,
    ) -> Result<Vec<u8>, VmError> {
        let code = self.state.get_code(&to);
        if code.is_empty() {
            return Ok(Vec::new());
        }

        let call_env = CallEnv {
            caller: from.unwrap_or(Address::ZERO),
            address: to,
            origin: from.unwrap_or(Address::ZERO),
            value: value.unwrap_or(U256::ZERO),
            gas_price: U256::ZERO,
        };

        self.state.checkpoint();
        let result = interpreter::run(
            &mut self.state,
            &code,
            data,
            &call_env,
            &self.block_env,
            ESTIMATE_GAS_CAP,
        );
        self.state.revert();

        result.map(|r| r.output)
    }

    /// Conservative gas estimate: run under a generous cap inside a
    /// reverted checkpoint and report `used + 21000`.
    pub fn estimate_gas(&mut self, tx: &Transaction) -> Result<u64, VmError> {
        self.state.checkpoint();
        let result = self.apply(tx, ESTIMATE_GAS_CAP);
        self.state.revert();

        result.map(|applied| applied.gas_used + TX_BASE_GAS)
    }

    fn apply(&mut self, tx: &Transaction, gas_limit: u64) -> Result<Applied, VmError> {
        let sender_nonce = self.state.get_nonce(&tx.from);
        if sender_nonce != tx.nonce {
            return Err(VmError::InvalidNonce {
                expected: sender_nonce,
                got: tx.nonce,
            });
        }

        let gas_cost = U256::from_u64(gas_limit)
            .checked_mul(tx.gas_price)
            .ok_or(VmError::InsufficientBalance)?;
        let total_cost = tx
            .value
            .checked_add(gas_cost)
            .ok_or(VmError::InsufficientBalance)?;
        if self.state.get_balance(&tx.from) < total_cost {
            return Err(VmError::InsufficientBalance);
        }

        let intrinsic = TX_BASE_GAS + TX_DATA_GAS * tx.data.len() as u64;
        if intrinsic > gas_limit {
            return Err(VmError::OutOfGas);
        }

        self.state.set_nonce(tx.from, sender_nonce + 1);

        let applied = match tx.to {
            Some(to) => self.apply_call(tx, to, gas_limit, intrinsic)?,
            None => self.apply_create(tx, gas_limit, intrinsic)?,
        };

        // Charge the fee for gas actually used and pay it to the block
        // producer.
        let fee = U256::from_u64(applied.gas_used).wrapping_mul(tx.gas_price);
        let sender_balance = self.state.get_balance(&tx.from);
        self.state
            .set_balance(tx.from, sender_balance.saturating_sub(fee));
        let coinbase = self.block_env.coinbase;
        let coinbase_balance = self.state.get_balance(&coinbase);
        self.state
            .set_balance(coinbase, coinbase_balance.wrapping_add(fee));

        Ok(applied)
    }

    fn apply_call(
        &mut self,
        tx: &Transaction,
        to: Address,
        gas_limit: u64,
        intrinsic: u64,
    ) -> Result<Applied, VmError> {
        self.state
            .transfer(tx.from, to, tx.value)
            .map_err(|_| VmError::InsufficientBalance)?;

        let code = self.state.get_code(&to);
        if code.is_empty() {
            return Ok(Applied {
                gas_used: intrinsic,
                output: Vec::new(),
                logs: Vec::new(),
                created_address: None,
            });
        }

        let call_env = CallEnv {
            caller: tx.from,
            address: to,
            origin: tx.from,
            value: tx.value,
            gas_price: tx.gas_price,
        };
        let result = interpreter::run(
            &mut self.state,
            &code,
            &tx.data,
            &call_env,
            &self.block_env,
            gas_limit - intrinsic,
        )?;

        Ok(Applied {
            gas_used: intrinsic + result.gas_used,
            output: result.output,
            logs: result.logs,
            created_address: None,
        })
    }

    fn apply_create(
        &mut self,
        tx: &Transaction,
        gas_limit: u64,
        intrinsic: u64,
    ) -> Result<Applied, VmError> {
        let gas_used = intrinsic + CREATE_BASE_GAS + CREATE_DATA_GAS * tx.data.len() as u64;
        if gas_used > gas_limit {
            return Err(VmError::OutOfGas);
        }

        // Derived per standard rules: keccak(rlp(sender, nonce))[12..].
        let created = compute_create_address(&tx.from, tx.nonce);

        self.state
            .transfer(tx.from, created, tx.value)
            .map_err(|_| VmError::InsufficientBalance)?;
        self.state.set_code(created, tx.data.clone());

        Ok(Applied {
            gas_used,
            output: created.as_bytes().to_vec(),
            logs: Vec::new(),
            created_address: Some(created),
        })
    }

    // State accessors.

    pub fn get_balance(&self, address: &Address) -> U256 {
        self.state.get_balance(address)
    }

    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.state.set_balance(address, balance);
    }

    pub fn get_nonce(&self, address: &Address) -> u64 {
        self.state.get_nonce(address)
    }

    pub fn get_code(&self, address: &Address) -> Vec<u8> {
        self.state.get_code(address)
    }

    pub fn get_storage_at(&self, address: &Address, slot: &U256) -> U256 {
        self.state.get_storage(address, slot)
    }

    pub fn get_state_root(&self) -> Hash {
        self.state.state_root()
    }

    // Checkpoint discipline, exposed for callers composing larger scopes.

    pub fn checkpoint(&mut self) {
        self.state.checkpoint();
    }

    pub fn commit(&mut self) -> bool {
        self.state.commit()
    }

    pub fn revert(&mut self) -> bool {
        self.state.revert()
    }
}

/// CREATE address derivation: keccak of the RLP pair (sender, nonce).
pub fn compute_create_address(sender: &Address, nonce: u64) -> Address {
    let mut data = Vec::with_capacity(32);
    data.push(0xd6); // list prefix
    data.push(0x94); // address length
    data.extend_from_slice(sender.as_bytes());

    if nonce == 0 {
        data.push(0x80);
    } else if nonce < 128 {
        data.push(nonce as u8);
    } else {
        let nonce_bytes = nonce.to_be_bytes();
        let leading_zeros = nonce_bytes.iter().take_while(|&&b| b == 0).count();
        let nonce_bytes = &nonce_bytes[leading_zeros..];
        data.push(0x80 + nonce_bytes.len() as u8);
        data.extend_from_slice(nonce_bytes);
    }

    let hash = keccak256(&data);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..32]);
    Address(addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units::parse_ether;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn transfer_tx(from: Address, to: Address, value: U256, nonce: u64) -> Transaction {
        Transaction::new(
            from,
            Some(to),
            value,
            vec![],
            nonce,
            100_000,
            U256::from_u64(1_000_000_000),
        )
    }

    fn funded_executor(account: Address) -> EvmExecutor {
        let mut executor = EvmExecutor::new(1337);
        executor.set_balance(account, parse_ether("1000").unwrap());
        executor
    }

    #[test]
    fn test_simple_transfer() {
        let (a, b) = (addr(0xA1), addr(0xB1));
        let mut executor = funded_executor(a);

        let tx = transfer_tx(a, b, parse_ether("1").unwrap(), 0);
        let execution = executor.execute(&tx, Hash::ZERO);

        assert_eq!(execution.receipt.status, ReceiptStatus::Success);
        assert_eq!(execution.receipt.gas_used, TX_BASE_GAS);
        assert_eq!(executor.get_balance(&b), parse_ether("1").unwrap());
        assert_eq!(executor.get_nonce(&a), 1);
    }

    #[test]
    fn test_insufficient_balance_fails_clean() {
        let (a, b) = (addr(0xA2), addr(0xB2));
        let mut executor = EvmExecutor::new(1337);
        let root_before = executor.get_state_root();

        let tx = transfer_tx(a, b, parse_ether("1").unwrap(), 0);
        let execution = executor.execute(&tx, Hash::ZERO);

        assert_eq!(execution.receipt.status, ReceiptStatus::Failed);
        // Failure consumes the whole limit but touches nothing.
        assert_eq!(execution.receipt.gas_used, tx.gas_limit);
        assert_eq!(executor.get_state_root(), root_before);
        assert_eq!(executor.get_nonce(&a), 0);
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let (a, b) = (addr(0xA3), addr(0xB3));
        let mut executor = funded_executor(a);

        let tx = transfer_tx(a, b, U256::from_u64(1), 5);
        let execution = executor.execute(&tx, Hash::ZERO);
        assert_eq!(execution.receipt.status, ReceiptStatus::Failed);
    }

    #[test]
    fn test_deployment_and_call() {
        let a = addr(0xA4);
        let mut executor = funded_executor(a);

        // PUSH1 0x42 PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let code = vec![0x60, 0x42, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3];
        let tx = Transaction::new(
            a,
            None,
            U256::ZERO,
            code.clone(),
            0,
            100_000,
            U256::from_u64(1_000_000_000),
        );
        let execution = executor.execute(&tx, Hash::ZERO);

        assert_eq!(execution.receipt.status, ReceiptStatus::Success);
        let contract = execution.receipt.contract_address.expect("deployment address");
        assert_eq!(executor.get_code(&contract), code);

        let output = executor.call(contract, &[], None, None).unwrap();
        assert_eq!(output.len(), 32);
        assert_eq!(output[31], 0x42);
    }

    #[test]
    fn test_create_address_derivation() {
        let sender = addr(0x00);
        let addr0 = compute_create_address(&sender, 0);
        let addr1 = compute_create_address(&sender, 1);
        assert_ne!(addr0, addr1);
        assert_eq!(addr0, compute_create_address(&sender, 0));
    }

    #[test]
    fn test_cumulative_gas_accumulates() {
        let (a, b) = (addr(0xA5), addr(0xB5));
        let mut executor = funded_executor(a);

        executor.reset_cumulative_gas();
        let first = executor.execute(&transfer_tx(a, b, U256::ONE, 0), Hash::ZERO);
        let second = executor.execute(&transfer_tx(a, b, U256::from_u64(2), 1), Hash::ZERO);

        assert_eq!(first.receipt.cumulative_gas_used, TX_BASE_GAS);
        assert_eq!(second.receipt.cumulative_gas_used, 2 * TX_BASE_GAS);
        assert_eq!(
            second.receipt.cumulative_gas_used,
            first.receipt.gas_used + second.receipt.gas_used
        );

        executor.reset_cumulative_gas();
        assert_eq!(executor.cumulative_gas_used(), 0);
    }

    #[test]
    fn test_estimate_gas_does_not_leak() {
        let (a, b) = (addr(0xA6), addr(0xB6));
        let mut executor = funded_executor(a);
        let root_before = executor.get_state_root();

        let tx = transfer_tx(a, b, parse_ether("1").unwrap(), 0);
        let estimate = executor.estimate_gas(&tx).unwrap();

        assert!(estimate >= TX_BASE_GAS);
        assert_eq!(executor.get_state_root(), root_before);
        assert_eq!(executor.get_nonce(&a), 0);
    }

    #[test]
    fn test_call_does_not_leak() {
        let a = addr(0xA7);
        let mut executor = funded_executor(a);

        // PUSH1 7 PUSH1 1 SSTORE STOP — writes storage when run.
        let code = vec![0x60, 0x07, 0x60, 0x01, 0x55, 0x00];
        let tx = Transaction::new(
            a,
            None,
            U256::ZERO,
            code,
            0,
            200_000,
            U256::from_u64(1_000_000_000),
        );
        let contract = executor
            .execute(&tx, Hash::ZERO)
            .created_address
            .unwrap();

        let root_before = executor.get_state_root();
        executor.call(contract, &[], None, None).unwrap();
        assert_eq!(executor.get_state_root(), root_before);
        assert_eq!(executor.get_storage_at(&contract, &U256::ONE), U256::ZERO);
    }

    #[test]
    fn test_fee_paid_to_coinbase() {
        let (a, b, miner) = (addr(0xA8), addr(0xB8), addr(0xEE));
        let mut executor = funded_executor(a);
        executor.set_block_env(1, 1000, miner);

        let tx = transfer_tx(a, b, U256::ONE, 0);
        let execution = executor.execute(&tx, Hash::ZERO);

        let expected_fee =
            U256::from_u64(execution.receipt.gas_used).wrapping_mul(tx.gas_price);
        assert_eq!(executor.get_balance(&miner), expected_fee);
    }

    #[test]
    fn test_call_to_codeless_account_returns_empty() {
        let mut executor = EvmExecutor::new(1337);
        let output = executor.call(addr(0x77), &[], None, None).unwrap();
        assert!(output.is_empty());
    }
}
