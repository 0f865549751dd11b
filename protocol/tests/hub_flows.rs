//! End-to-end tests for the hub's request flows.
//!
//! Each test builds a full hub over a real key-value backend and the
//! in-process ledger, then drives it the way HTTP clients would: several
//! addresses, concurrent requests, notes flowing from one client to another.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};

use pray_protocol::config::units;
use pray_protocol::ledger::MemoryLedger;
use pray_protocol::{
    Hub, HubConfig, HubError, KeyValueStore, MemoryStore, RandomSource, SeededRandom,
    SequenceRandom, SledStore,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn operator() -> Address {
    Address::repeat_byte(0x0b)
}

fn client(n: u8) -> Address {
    Address::repeat_byte(n)
}

fn setup_with(
    kv: Arc<dyn KeyValueStore>,
    draws: Option<Vec<u64>>,
) -> (Arc<MemoryLedger>, Arc<Hub>) {
    let ledger = Arc::new(MemoryLedger::new(operator()));
    let rng: Arc<dyn RandomSource> = match draws {
        Some(d) => Arc::new(SequenceRandom::new(d)),
        None => Arc::new(SeededRandom::seed_from_u64(2331)),
    };
    let hub = Arc::new(Hub::new(kv, ledger.clone(), rng, HubConfig::default()));
    (ledger, hub)
}

fn setup() -> (Arc<MemoryLedger>, Arc<Hub>) {
    setup_with(Arc::new(MemoryStore::new()), None)
}

// ---------------------------------------------------------------------------
// Knock
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_address_knock_credits_base_amount() {
    let (ledger, hub) = setup();
    let before = ledger.balance_of(&client(1));

    let r = hub.knock(client(1), None).await.unwrap();

    assert_eq!(r.add_tokens, units(1));
    assert_eq!(r.total_tokens, Some(before + units(1)));
}

#[tokio::test]
async fn knock_with_note_mints_within_boost_range() {
    let (ledger, hub) = setup();
    let r = hub.knock(client(0xaa), Some("hello")).await.unwrap();

    assert!(r.add_tokens >= units(5) && r.add_tokens <= units(10));
    assert_eq!(r.add_tokens % units(1), U256::ZERO);
    assert_eq!(ledger.balance_of(&client(0xaa)), r.add_tokens);
}

#[tokio::test]
async fn stored_note_eventually_gets_sampled() {
    let (_, hub) = setup();
    for i in 0..4u8 {
        hub.knock(client(i + 1), Some(&format!("filler {i}")))
            .await
            .unwrap();
    }
    hub.knock(client(0xaa), Some("hello")).await.unwrap();

    let mut seen = false;
    for _ in 0..200 {
        let note = hub.notes().random_note(rand_draw()).await.unwrap();
        if note.content.ends_with(": hello") {
            seen = true;
            break;
        }
    }
    assert!(seen, "note never came up in 200 samples");
}

fn rand_draw() -> u64 {
    rand::random()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_knocks_from_one_address_admit_one() {
    let (ledger, hub) = setup();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.knock(client(7), None).await })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => ok += 1,
            Err(HubError::TooManyRequests) => limited += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((ok, limited), (1, 1));
    assert_eq!(ledger.balance_of(&client(7)), units(1));
}

#[tokio::test(start_paused = true)]
async fn cooldown_expires() {
    let (ledger, hub) = setup();
    hub.knock(client(3), None).await.unwrap();
    assert!(matches!(
        hub.knock(client(3), None).await,
        Err(HubError::TooManyRequests)
    ));

    tokio::time::advance(Duration::from_secs(6)).await;
    hub.knock(client(3), None).await.unwrap();
    assert_eq!(ledger.balance_of(&client(3)), units(2));
}

#[tokio::test]
async fn different_addresses_do_not_share_a_cooldown() {
    let (_, hub) = setup();
    for n in 1..=5u8 {
        hub.knock(client(n), None).await.unwrap();
    }
}

#[tokio::test]
async fn notes_travel_between_clients() {
    // Boost draw, then sample draw, for each knock.
    let (_, hub) = setup_with(Arc::new(MemoryStore::new()), Some(vec![0, 0]));

    let first = hub.knock(client(1), Some("from one")).await.unwrap();
    let second = hub.knock(client(2), None).await.unwrap();

    let shown = second.note.expect("second client should see a note");
    assert_eq!(Some(shown.id), first.stored_note);
    assert!(shown.content.ends_with(": from one"));
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replies_all_land() {
    let (_, hub) = setup();
    let seed = hub.knock(client(1), Some("thread")).await.unwrap();
    let id = seed.stored_note.unwrap();

    let handles: Vec<_> = (0..6u8)
        .map(|i| {
            let hub = Arc::clone(&hub);
            let id = id.clone();
            tokio::spawn(async move {
                hub.reply(&id, client(i + 10), &format!("reply {i}"))
                    .await
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let note = hub.notes().get_note(&id).await.unwrap();
    assert_eq!(note.replies.len(), 6);
}

#[tokio::test]
async fn replies_keep_their_order() {
    let (_, hub) = setup();
    let id = hub
        .knock(client(1), Some("ordered"))
        .await
        .unwrap()
        .stored_note
        .unwrap();

    for text in ["a", "b", "c"] {
        hub.reply(&id, client(2), text).await.unwrap();
    }
    let replies = hub.notes().get_note(&id).await.unwrap().replies;
    let tails: Vec<&str> = replies
        .iter()
        .map(|r| r.rsplit(": ").next().unwrap())
        .collect();
    assert_eq!(tails, vec!["a", "b", "c"]);
}

// ---------------------------------------------------------------------------
// Peek and faucet
// ---------------------------------------------------------------------------

#[tokio::test]
async fn earn_burn_and_peek() {
    let (ledger, hub) = setup();
    hub.knock(client(1), Some("worth ten tokens")).await.unwrap();

    // Client 2 earns enough to pay for a peek.
    ledger.credit(client(2), units(10));
    let tx = ledger.burn(client(2), units(10)).unwrap();
    let note = hub.peek_note(client(2), tx).await.unwrap();
    assert!(note.content.ends_with(": worth ten tokens"));

    // Same payment with the wrong amount.
    ledger.credit(client(2), units(11));
    let tx = ledger.burn(client(2), units(11)).unwrap();
    assert!(matches!(
        hub.peek_note(client(2), tx).await,
        Err(HubError::BadPayment)
    ));
}

#[tokio::test]
async fn concurrent_faucet_requests_get_distinct_transactions() {
    let (ledger, hub) = setup();
    let (a, b) = tokio::join!(hub.faucet(client(1)), hub.faucet(client(2)));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a, b);
    assert_eq!(ledger.operator_nonce(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn faucet_burst_never_collides() {
    let (ledger, hub) = setup();
    let handles: Vec<_> = (1..=10u8)
        .map(|n| {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move { hub.faucet(client(n)).await })
        })
        .collect();

    let mut hashes = HashSet::new();
    for h in handles {
        hashes.insert(h.await.unwrap().unwrap());
    }
    assert_eq!(hashes.len(), 10);
    assert_eq!(ledger.operator_nonce(), 10);
}

// ---------------------------------------------------------------------------
// Durable store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn notes_survive_a_restart_on_sled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let id = {
        let store = Arc::new(SledStore::open(dir.path()).unwrap());
        let (_, hub) = setup_with(store.clone(), None);
        let id = hub
            .knock(client(1), Some("persisted"))
            .await
            .unwrap()
            .stored_note
            .unwrap();
        hub.reply(&id, client(2), "me too").await.unwrap();
        store.flush().unwrap();
        id
    };

    let store = Arc::new(SledStore::open(dir.path()).unwrap());
    let (_, hub) = setup_with(store, None);
    let note = hub.notes().get_note(&id).await.unwrap();
    assert!(note.content.ends_with(": persisted"));
    assert_eq!(note.replies.len(), 1);
}
