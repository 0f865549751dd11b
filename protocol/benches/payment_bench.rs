// Burn verification benchmarks.
//
// Covers the per-log predicate and the full receipt scan at receipt sizes
// from a plain transfer up to a busy multi-call transaction, with the burn
// placed last so every log is inspected.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use alloy_primitives::{Address, Bytes, U256};

use pray_protocol::config::{self, units};
use pray_protocol::ledger::abi::address_word;
use pray_protocol::ledger::{LogEntry, Receipt, ReceiptStatus, TxHash};
use pray_protocol::payment::{find_burn, is_matching_burn, BurnCriteria};

fn transfer(from: Address, to: Address, amount: U256) -> LogEntry {
    LogEntry {
        address: config::TOKEN_CONTRACT,
        topics: vec![
            config::TRANSFER_EVENT_SIGNATURE,
            address_word(&from),
            address_word(&to),
        ],
        data: Bytes::from(amount.to_be_bytes::<32>().to_vec()),
    }
}

fn receipt_with_burn_last(payer: Address, noise: usize) -> Receipt {
    let mut logs: Vec<LogEntry> = (0..noise)
        .map(|i| transfer(payer, Address::repeat_byte((i % 250 + 1) as u8), units(10)))
        .collect();
    logs.push(transfer(payer, config::BURN_ADDRESS, units(10)));
    Receipt {
        tx_hash: TxHash::repeat_byte(0x42),
        status: ReceiptStatus::Success,
        logs,
    }
}

fn bench_single_log(c: &mut Criterion) {
    let payer = Address::repeat_byte(0xaa);
    let criteria = BurnCriteria::default();
    let log = transfer(payer, config::BURN_ADDRESS, units(10));

    c.bench_function("payment/is_matching_burn", |b| {
        b.iter(|| is_matching_burn(&log, &criteria, &payer, units(10)));
    });
}

fn bench_receipt_scan(c: &mut Criterion) {
    let payer = Address::repeat_byte(0xaa);
    let criteria = BurnCriteria::default();
    let mut group = c.benchmark_group("payment/find_burn");

    for noise in [0usize, 8, 64, 512] {
        let receipt = receipt_with_burn_last(payer, noise);
        group.throughput(Throughput::Elements(receipt.logs.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(noise), &receipt, |b, r| {
            b.iter(|| find_burn(r, &criteria, &payer, units(10)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_single_log, bench_receipt_scan);
criterion_main!(benches);
