use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dgov_governance::{GovernanceLedger, NewProposal};
use dgov_nullables::{NullBalanceOracle, NullClock, NullGovernanceStore};
use dgov_types::{Address, GovernanceParams, TokenAmount};

type Ledger = GovernanceLedger<NullGovernanceStore, Arc<NullBalanceOracle>, Arc<NullClock>>;

fn addr(seed: u8) -> Address {
    Address::new([seed; 20])
}

/// A ledger where delegatee `addr(2)` holds a live vote on `live` proposals.
fn ledger_with_live_votes(live: usize) -> Ledger {
    let oracle = Arc::new(NullBalanceOracle::new(addr(0xCC)));
    oracle.set_balance(&addr(0xCC), TokenAmount::new(u64::MAX as u128));
    oracle.set_balance(&addr(1), TokenAmount::new(1_000));
    oracle.set_balance(&addr(2), TokenAmount::new(1_000));
    let mut ledger = GovernanceLedger::open(
        NullGovernanceStore::new(),
        oracle,
        Arc::new(NullClock::new(0)),
        GovernanceParams::default(),
    )
    .unwrap();
    for _ in 0..live {
        let id = ledger
            .create_proposal(&addr(2), NewProposal {
                title: "bench".into(),
                description: String::new(),
                amount: TokenAmount::new(1),
                recipient: addr(0xEE),
            })
            .unwrap();
        ledger.up_vote(&addr(2), id).unwrap();
    }
    ledger
}

fn delegate_undelegate_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("delegate_undelegate");
    for live in [0usize, 10, 100, 1_000] {
        let mut ledger = ledger_with_live_votes(live);
        group.bench_with_input(BenchmarkId::from_parameter(live), &live, |b, _| {
            b.iter(|| {
                ledger.delegate(black_box(&addr(1)), &addr(2)).unwrap();
                ledger.undelegate(black_box(&addr(1))).unwrap();
            })
        });
    }
    group.finish();
}

fn vote_bench(c: &mut Criterion) {
    c.bench_function("up_vote_fresh_proposal", |b| {
        let mut ledger = ledger_with_live_votes(0);
        b.iter(|| {
            let id = ledger
                .create_proposal(&addr(1), NewProposal {
                    title: "bench".into(),
                    description: String::new(),
                    amount: TokenAmount::new(1),
                    recipient: addr(0xEE),
                })
                .unwrap();
            ledger.up_vote(black_box(&addr(2)), id).unwrap()
        })
    });
}

criterion_group!(benches, delegate_undelegate_bench, vote_bench);
criterion_main!(benches);
