use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, RecordingSink},
    mock_rpc::{tx_hash_hex, MockChain, MockRpcServer, MOCK_CHAIN_ID},
};
use alloy_primitives::B256;
use anyhow::Result;
use blocktail::{
    is_rate_limited, AsyncRpcClient, BatchFetcher, BlockRange, RpcClientOptions, RpcError,
    Telemetry, TxProcessorPool,
};
use serde_json::json;

fn hash(height: u64, index: u64) -> B256 {
    B256::from_str(&tx_hash_hex(height, index)).expect("mock hashes are valid")
}

fn client_for(server: &MockRpcServer) -> Result<AsyncRpcClient> {
    AsyncRpcClient::with_options(
        server.url(),
        RpcClientOptions {
            request_timeout: Duration::from_secs(5),
            ..RpcClientOptions::default()
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_reads_chain_id_and_height() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(8, |_| 0);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = client_for(&server)?;

    assert_eq!(client.chain_id().await?, MOCK_CHAIN_ID);
    assert_eq!(client.current_height().await?, 7);

    chain.set_tip(3);
    assert_eq!(client.current_height().await?, 3);
    assert_eq!(client.endpoint(), server.url());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn block_batch_is_one_request_in_height_order() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10, |height| height % 3);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = client_for(&server)?;

    let blocks = client.batch_get_blocks(&[4, 5, 6]).await?;

    assert_eq!(chain.http_requests(), 1);
    assert_eq!(chain.method_calls("eth_getBlockByNumber"), 3);
    assert_eq!(
        blocks.iter().map(|block| block.number).collect::<Vec<_>>(),
        vec![4, 5, 6]
    );
    assert_eq!(blocks[1].transactions, vec![hash(5, 0), hash(5, 1)]);
    assert!(blocks[2].transactions.is_empty());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocks_above_the_tip_are_missing_records() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(10, |_| 1);
    chain.set_tip(4);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = client_for(&server)?;

    let err = client
        .batch_get_blocks(&[4, 5])
        .await
        .expect_err("block 5 is not visible yet");

    assert!(!is_rate_limited(&err));
    match err.downcast_ref::<RpcError>() {
        Some(RpcError::MissingRecord { method, key }) => {
            assert_eq!(*method, "eth_getBlockByNumber");
            assert_eq!(key, "height 5");
        }
        other => panic!("expected MissingRecord, got {other:?}"),
    }

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_429_is_a_rate_limit_signal() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(4, |_| 1);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = client_for(&server)?;

    chain.throttle_next_requests(1);
    let err = client
        .batch_get_blocks(&[1, 2])
        .await
        .expect_err("throttled request fails");
    assert!(is_rate_limited(&err), "unexpected error: {err:#}");

    let blocks = client.batch_get_blocks(&[1, 2]).await?;
    assert_eq!(blocks.len(), 2);

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.total_rate_limited, 1);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn limit_exceeded_entries_are_a_rate_limit_signal() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(4, |_| 2);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = client_for(&server)?;

    chain.reject_next_batches(1, -32005);
    let err = client
        .batch_get_receipts(&[hash(1, 0), hash(1, 1)])
        .await
        .expect_err("rejected batch fails");
    assert!(is_rate_limited(&err), "unexpected error: {err:#}");

    chain.reject_next_batches(1, -32000);
    let err = client
        .batch_get_receipts(&[hash(1, 0), hash(1, 1)])
        .await
        .expect_err("rejected batch fails");
    assert!(!is_rate_limited(&err));

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetcher_pairs_records_with_their_hashes() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(12, |height| if height == 9 { 0 } else { 4 });
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = Arc::new(client_for(&server)?);
    let fetcher = BatchFetcher::new(client);

    let fetched = fetcher.fetch_units(BlockRange::new(8, 11)).await?;

    assert_eq!(fetched.blocks, 3);
    assert_eq!(fetched.units.len(), 8);
    for unit in &fetched.units {
        assert_eq!(unit.transaction.hash, unit.hash);
        assert_eq!(unit.receipt.transaction_hash, unit.hash);
        assert_eq!(unit.transaction.block_number, Some(unit.height));
        assert_eq!(unit.receipt.block_number, Some(unit.height));
    }
    let order: Vec<(u64, B256)> = fetched.units.iter().map(|u| (u.height, u.hash)).collect();
    let expected: Vec<(u64, B256)> = [8u64, 10]
        .into_iter()
        .flat_map(|height| (0..4).map(move |index| (height, hash(height, index))))
        .collect();
    assert_eq!(order, expected);
    assert_eq!(chain.method_calls("eth_getTransactionByHash"), 8);
    assert_eq!(chain.method_calls("eth_getTransactionReceipt"), 8);
    // One block batch, one transaction batch, one receipt batch.
    assert_eq!(chain.http_requests(), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn processed_range_renders_hex_fields() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(3, |_| 2);
    let server = MockRpcServer::start(chain.clone()).await?;
    let client = Arc::new(client_for(&server)?);
    let sink = Arc::new(RecordingSink::default());
    let pool = TxProcessorPool::new(4, sink.clone(), Arc::new(Telemetry::default()));

    let report = BatchFetcher::new(client)
        .process_range(BlockRange::new(2, 3), &pool)
        .await?;

    assert_eq!(report.transactions, 2);
    assert_eq!(report.lag(), 1);
    for document in sink.documents() {
        assert_eq!(document["transaction"]["input"], json!("0xabcd"));
        assert_eq!(document["transaction"]["blockNumber"], json!(2));
        assert_eq!(document["transaction"]["v"], json!(2709));
        assert_eq!(document["receipt"]["status"], json!(1));
        let bloom = document["receipt"]["logsBloom"]
            .as_str()
            .expect("bloom renders as a string");
        assert!(bloom.starts_with("0x"));
        assert_eq!(bloom.len(), 2 + 512);
    }

    server.shutdown().await;
    Ok(())
}
