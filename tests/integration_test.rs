use std::collections::HashSet;

use braidnode::dag::{DagGraph, GhostdagParams};
use braidnode::evm::EvmExecutor;
use braidnode::node::Mempool;
use braidnode::types::block::Block;
use braidnode::types::transaction::{ReceiptStatus, Transaction};
use braidnode::types::units::{format_ether, parse_ether, parse_gwei};
use braidnode::types::{Address, Hash, U256};

mod common;
use common::{transfer, TestNode};

#[tokio::test]
async fn test_parallel_fanout() {
    let node = TestNode::create_with(|c| c.mining.parallelism = 3).node;
    let genesis = node.dag().read().get_genesis_hash();

    // First round: three blocks, all children of genesis.
    node.mine_blocks(3).await;
    {
        let dag = node.dag().read();
        assert_eq!(dag.get_block_count(), 4);
        assert_eq!(dag.get_max_depth(), 1);
        assert_eq!(dag.get_tips().len(), 3);
        for block in dag.get_all_blocks() {
            if !block.is_genesis() {
                assert_eq!(block.parent_hashes, vec![genesis]);
            }
        }
    }

    // Second round: three more, each referencing the three prior tips.
    let prior_tips: HashSet<Hash> = node.dag().read().get_tips().into_iter().collect();
    node.mine_blocks(3).await;
    {
        let dag = node.dag().read();
        assert_eq!(dag.get_block_count(), 7);
        assert_eq!(dag.get_max_depth(), 2);
        for block in dag.get_all_blocks() {
            if block.dag_depth == 2 {
                assert_eq!(block.parent_hashes.len(), 3);
                assert!(block.parent_hashes.iter().all(|p| prior_tips.contains(p)));
            }
        }
    }
}

#[test]
fn test_anticone_of_parallel_blocks() {
    // The literal shape: genesis G; parallel children B1, B2, B3;
    // B4 on {B1, B2}; B5 on {B3}; B6 on {B4, B5}.
    let mut dag = DagGraph::new(GhostdagParams::default());
    let g = dag.get_genesis_hash();

    let block = |parents: Vec<Hash>, nonce: u64| {
        Block::new(parents, 1000, Address::ZERO, Hash::ZERO, nonce, vec![])
    };

    let b1 = block(vec![g], 1);
    let b2 = block(vec![g], 2);
    let b3 = block(vec![g], 3);
    let b4 = block(vec![b1.hash, b2.hash], 4);
    let b5 = block(vec![b3.hash], 5);
    let b6 = block(vec![b4.hash, b5.hash], 6);
    let (h1, h2, h3, h4, h5, h6) = (b1.hash, b2.hash, b3.hash, b4.hash, b5.hash, b6.hash);

    for b in [b1, b2, b3, b4, b5, b6] {
        dag.add_block(b).unwrap();
    }

    let anticone = |h: &Hash| -> HashSet<Hash> { dag.anticone(h).unwrap().into_iter().collect() };

    assert_eq!(anticone(&h1), HashSet::from([h2, h3, h5]));
    assert_eq!(anticone(&h2), HashSet::from([h1, h3, h5]));
    assert_eq!(anticone(&h6), HashSet::new());

    assert_eq!(dag.ancestors(&h6).unwrap().len(), 6);
    assert_eq!(dag.descendants(&g).unwrap().len(), 6);
    assert_eq!(
        dag.descendants(&h1)
            .unwrap()
            .into_iter()
            .collect::<HashSet<_>>(),
        HashSet::from([h4, h6])
    );
}

#[test]
fn test_gas_price_ordering() {
    let pool = Mempool::new(1000);

    let tx = |id: u8, price: U256| {
        Transaction::new(
            Address([id; 20]),
            Some(Address([0xFF; 20])),
            U256::ONE,
            vec![],
            0,
            21_000,
            price,
        )
    };
    let low = tx(1, parse_gwei("1").unwrap());
    let high = tx(2, parse_gwei("10").unwrap());
    let medium = tx(3, parse_gwei("5").unwrap());

    pool.add(low.clone()).unwrap();
    pool.add(high.clone()).unwrap();
    pool.add(medium.clone()).unwrap();

    let pending: Vec<Hash> = pool.pending(None).iter().map(|t| t.hash).collect();
    assert_eq!(pending, vec![high.hash, medium.hash, low.hash]);
}

#[tokio::test]
async fn test_deployment_receipt() {
    let node = TestNode::create().node;

    let mut deployer_bytes = [0u8; 20];
    deployer_bytes[0] = 0x10;
    deployer_bytes[19] = 0x01;
    let deployer = Address(deployer_bytes);
    node.executor()
        .write()
        .set_balance(deployer, parse_ether("1000").unwrap());

    // PUSH1 0x42 PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
    let bytecode = hex::decode("604260005260206000f3").unwrap();
    let tx = Transaction::new(
        deployer,
        None,
        U256::ZERO,
        bytecode.clone(),
        0,
        100_000,
        parse_gwei("1").unwrap(),
    );
    let tx_hash = node.add_transaction(tx).unwrap();
    node.mine_blocks(1).await;

    let receipt = node.miner().get_receipt(&tx_hash).expect("receipt exists");
    assert_eq!(receipt.status, ReceiptStatus::Success);
    let contract = receipt.contract_address.expect("deployment address");

    let mut executor = node.executor().write();
    assert_eq!(executor.get_code(&contract), bytecode);

    let output = executor.call(contract, &[], None, None).unwrap();
    assert_eq!(output.len(), 32);
    assert_eq!(output[31], 0x42);
}

#[test]
fn test_checkpoint_revert() {
    let mut executor = EvmExecutor::new(1337);
    let account = Address([0xAA; 20]);

    executor.set_balance(account, parse_ether("1000").unwrap());
    executor.checkpoint();
    executor.set_balance(account, U256::from_u64(999));
    assert_eq!(executor.get_balance(&account), U256::from_u64(999));

    executor.revert();
    assert_eq!(executor.get_balance(&account), parse_ether("1000").unwrap());
}

#[test]
fn test_mempool_eviction() {
    let pool = Mempool::new(3);
    let tx = |id: u8, gwei: &str| {
        Transaction::new(
            Address([id; 20]),
            Some(Address([0xFF; 20])),
            U256::ONE,
            vec![],
            0,
            21_000,
            parse_gwei(gwei).unwrap(),
        )
    };

    let five = tx(1, "5");
    let two = tx(2, "2");
    let three = tx(3, "3");
    let one = tx(4, "1");

    pool.add(five).unwrap();
    pool.add(two.clone()).unwrap();
    pool.add(three).unwrap();
    let _ = pool.add(one.clone());

    assert!(!pool.contains(&one.hash));
    assert!(pool.contains(&two.hash));
    assert_eq!(pool.size(), 3);
}

#[test]
fn test_ether_round_trip() {
    for s in ["0", "1", "1000", "1.5", "0.000000000000000001", "42.000001"] {
        let wei = parse_ether(s).unwrap();
        assert_eq!(parse_ether(&format_ether(wei)).unwrap(), wei, "case {s}");
    }
}

#[tokio::test]
async fn test_receipts_unique_and_cumulative() {
    let node = TestNode::create_with(|c| c.mining.parallelism = 2).node;
    let sender = node.dev_accounts()[0];
    let recipient = node.dev_accounts()[1];

    let mut hashes = Vec::new();
    for nonce in 0..5 {
        let tx = transfer(sender, recipient, U256::from_u64(100), nonce);
        hashes.push(node.add_transaction(tx).unwrap());
    }

    node.mine_blocks(2).await;

    // Exactly one receipt per executed transaction.
    for hash in &hashes {
        let receipt = node.miner().get_receipt(hash).expect("receipt exists");
        assert_eq!(receipt.transaction_hash, *hash);
        assert_eq!(receipt.status, ReceiptStatus::Success);
    }
    assert_eq!(
        node.miner()
            .get_all_receipts()
            .iter()
            .map(|r| r.transaction_hash)
            .collect::<HashSet<_>>()
            .len(),
        5
    );

    // Within each block, cumulative gas is the running per-tx sum.
    let dag = node.dag().read();
    for block in dag.get_all_blocks() {
        let mut running = 0u64;
        for tx in &block.transactions {
            let receipt = node.miner().get_receipt(&tx.hash).unwrap();
            if receipt.block_hash != block.hash {
                continue;
            }
            running += receipt.gas_used;
            assert_eq!(receipt.cumulative_gas_used, running);
        }
    }
}

#[tokio::test]
async fn test_depth_invariant_holds_after_rounds() {
    let node = TestNode::create_with(|c| {
        c.mining.parallelism = 3;
        c.mining.max_parents = 2;
    })
    .node;

    node.mine_blocks(9).await;

    let dag = node.dag().read();
    for block in dag.get_all_blocks() {
        if block.is_genesis() {
            assert_eq!(block.dag_depth, 0);
        } else {
            let parent_max = block
                .parent_hashes
                .iter()
                .map(|p| dag.get_block(p).unwrap().dag_depth)
                .max()
                .unwrap();
            assert_eq!(block.dag_depth, 1 + parent_max);
        }
    }

    // Tips are exactly the childless blocks, and at least one is blue.
    let tips: HashSet<Hash> = dag.get_tips().into_iter().collect();
    assert!(!tips.is_empty());
    for block in dag.get_all_blocks() {
        let childless = dag.get_children(&block.hash).unwrap().is_empty();
        assert_eq!(tips.contains(&block.hash), childless);
    }
    assert!(tips.iter().any(|t| dag.is_blue(t).unwrap()));
}

#[tokio::test]
async fn test_concurrent_submissions() {
    let node = TestNode::create().node;
    let recipient = Address([0xCC; 20]);

    // Ten senders race their submissions; all must land.
    let tasks: Vec<_> = node
        .dev_accounts()
        .to_vec()
        .into_iter()
        .map(|account| {
            let node = std::sync::Arc::clone(&node);
            tokio::spawn(async move {
                node.add_transaction(transfer(account, recipient, U256::ONE, 0))
            })
        })
        .collect();

    let results = futures::future::join_all(tasks).await;
    for result in results {
        result.unwrap().unwrap();
    }
    assert_eq!(node.mempool().size(), 10);

    node.mine_blocks(1).await;
    assert_eq!(node.mempool().size(), 0);
}

#[tokio::test]
async fn test_genesis_hash_stable_across_queries() {
    let node = TestNode::create().node;
    let first = node.dag().read().get_genesis_hash();

    node.mine_blocks(3).await;

    let after = node.dag().read().get_genesis_hash();
    assert_eq!(first, after);
    assert_eq!(node.dag().read().is_blue(&first), Some(true));
}

#[tokio::test]
async fn test_full_node_lifecycle() {
    let harness = TestNode::start_with(|c| c.mining.block_time_ms = 100).await;
    let node = &harness.node;

    assert!(node.is_running());
    assert!(node.miner().is_running());

    // Background mining makes progress on its own.
    let mut events = node.subscribe();
    let mut mined = 0;
    while mined < 3 {
        match tokio::time::timeout(std::time::Duration::from_secs(5), events.recv()).await {
            Ok(Ok(braidnode::types::event::NodeEvent::BlockMined(_))) => mined += 1,
            Ok(Ok(_)) => {}
            other => panic!("expected mining progress, got {other:?}"),
        }
    }

    harness.stop().await;
    assert!(!node.is_running());
    assert!(!node.miner().is_running());
}
