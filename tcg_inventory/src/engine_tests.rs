//! Tests for the inventory engine
//!
//! Run against the in-memory store; `tests/ledger_sqlite.rs` repeats the key
//! scenarios on SQLite.

use super::*;
use crate::store::MemoryStore;
use chrono::TimeZone;

fn inventory() -> Inventory<MemoryStore> {
    let inventory = Inventory::new(MemoryStore::new());
    inventory.register_user("alice", "Alice", None).unwrap();
    inventory
        .register_user("bob", "Bob", Some("bob@example.com"))
        .unwrap();
    inventory
}

fn lotus() -> NewCard {
    NewCard::new("Black Lotus", "Alpha", "NM")
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

fn total_held<S: LedgerStore>(inventory: &Inventory<S>, card_id: &CardId) -> i64 {
    inventory
        .store()
        .read(|tx| tx.holdings_for_card(card_id))
        .unwrap()
        .iter()
        .map(|h| h.quantity)
        .sum()
}

fn net_purchased<S: LedgerStore>(inventory: &Inventory<S>, card_id: &CardId) -> i64 {
    inventory
        .store()
        .read(|tx| tx.transactions())
        .unwrap()
        .iter()
        .filter(|t| &t.card_id == card_id)
        .map(|t| match t.kind {
            TransactionKind::Purchase => t.quantity,
            TransactionKind::Sale => -t.quantity,
            TransactionKind::Transfer => 0,
        })
        .sum()
}

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

// ── Users and cards ────────────────────────────────────────────────────────

#[test]
fn register_user_rejects_duplicates() {
    let inventory = inventory();
    let err = inventory.register_user("alice", "Alice Again", None).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn register_user_rejects_empty_username() {
    let inventory = inventory();
    let err = inventory.register_user("   ", "Nobody", None).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn register_user_defaults_display_name() {
    let inventory = Inventory::new(MemoryStore::new());
    let user = inventory.register_user("carol", "", Some("  ")).unwrap();
    assert_eq!(user.display_name, "carol");
    assert_eq!(user.email, None);
}

#[test]
fn register_card_is_idempotent() {
    let inventory = inventory();
    let first = inventory.register_card(&lotus()).unwrap();
    let second = inventory
        .register_card(&NewCard::new("black lotus", " Alpha", "nm"))
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(second.name, "Black Lotus");
}

#[test]
fn remove_user_requires_empty_holdings() {
    let inventory = inventory();
    let tx = inventory.purchase("alice", &lotus(), 1, 5.0).unwrap();

    let err = inventory.remove_user("alice").unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    inventory.sell("alice", &tx.card_id, 1, 5.0).unwrap();
    inventory.remove_user("alice").unwrap();
    let err = inventory.purchase("alice", &lotus(), 1, 5.0).unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(_)));
}

#[test]
fn remove_unknown_user_is_not_found() {
    let inventory = inventory();
    assert!(inventory.remove_user("mallory").unwrap_err().is_not_found());
}

// ── Purchase ───────────────────────────────────────────────────────────────

#[test]
fn purchase_creates_card_and_holding() {
    let inventory = inventory();
    let tx = inventory.purchase("alice", &lotus(), 10, 5.0).unwrap();

    assert_eq!(tx.kind, TransactionKind::Purchase);
    assert_eq!(tx.quantity, 10);
    assert_eq!(tx.unit_price, Some(5.0));
    assert_eq!(tx.from_user, None);
    assert_eq!(tx.to_user.as_deref(), Some("alice"));
    assert!(approx(tx.cost_basis, 50.0));

    let card = inventory.card(&tx.card_id).unwrap();
    assert_eq!(card.name, "Black Lotus");
    assert!(card.last_price.is_none());

    let holding = inventory.holding("alice", &tx.card_id).unwrap();
    assert_eq!(holding.quantity, 10);
    assert!(approx(holding.cost_basis, 50.0));
}

#[test]
fn purchase_accumulates_cost_basis() {
    let inventory = inventory();
    let tx = inventory.purchase("alice", &lotus(), 2, 5.0).unwrap();
    inventory.purchase("alice", &lotus(), 3, 10.0).unwrap();

    let holding = inventory.holding("alice", &tx.card_id).unwrap();
    assert_eq!(holding.quantity, 5);
    assert!(approx(holding.cost_basis, 40.0));
    assert!(approx(holding.average_cost().unwrap(), 8.0));
}

#[test]
fn purchase_allows_free_cards() {
    let inventory = inventory();
    let tx = inventory.purchase("alice", &lotus(), 1, 0.0).unwrap();
    assert!(approx(inventory.holding("alice", &tx.card_id).unwrap().cost_basis, 0.0));
}

#[test]
fn purchase_validates_input() {
    let inventory = inventory();
    for (quantity, price) in [(0, 5.0), (-1, 5.0), (1, -0.01), (1, f64::NAN)] {
        let err = inventory
            .purchase("alice", &lotus(), quantity, price)
            .unwrap_err();
        assert!(
            matches!(err, LedgerError::Validation(_)),
            "quantity {quantity}, price {price}"
        );
    }
    let err = inventory
        .purchase("alice", &NewCard::new(" ", "Alpha", "NM"), 1, 1.0)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    assert!(inventory.store().read(|tx| tx.transactions()).unwrap().is_empty());
}

#[test]
fn purchase_for_unknown_user_creates_nothing() {
    let inventory = inventory();
    let err = inventory.purchase("mallory", &lotus(), 1, 5.0).unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(ref u) if u == "mallory"));

    // The card is not created either
    assert!(inventory.card(&lotus().id()).unwrap_err().is_not_found());
}

// ── Sale ───────────────────────────────────────────────────────────────────

#[test]
fn sale_removes_average_cost() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 10, 5.0).unwrap().card_id;

    let receipt = inventory.sell("alice", &card_id, 4, 8.0).unwrap();
    assert!(approx(receipt.proceeds, 32.0));
    assert!(approx(receipt.cost_removed, 20.0));
    assert!(approx(receipt.realized_gain, 12.0));
    assert_eq!(receipt.transaction.kind, TransactionKind::Sale);
    assert_eq!(receipt.transaction.to_user, None);
    assert_eq!(receipt.transaction.proceeds(), Some(32.0));
    assert!(approx(receipt.transaction.realized_gain().unwrap(), 12.0));

    let holding = inventory.holding("alice", &card_id).unwrap();
    assert_eq!(holding.quantity, 6);
    assert!(approx(holding.cost_basis, 30.0));
}

#[test]
fn sale_at_a_loss_reports_negative_gain() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 2, 10.0).unwrap().card_id;
    let receipt = inventory.sell("alice", &card_id, 2, 4.0).unwrap();
    assert!(approx(receipt.realized_gain, -12.0));
    assert!(inventory.holding("alice", &card_id).unwrap().is_empty());
}

#[test]
fn oversell_fails_and_changes_nothing() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 3, 5.0).unwrap().card_id;
    let log_before = inventory.store().read(|tx| tx.transactions()).unwrap();

    let err = inventory.sell("alice", &card_id, 4, 8.0).unwrap_err();
    match err {
        LedgerError::InsufficientInventory {
            requested,
            available,
            ..
        } => {
            assert_eq!(requested, 4);
            assert_eq!(available, 3);
        }
        other => panic!("unexpected error: {other}"),
    }

    let holding = inventory.holding("alice", &card_id).unwrap();
    assert_eq!(holding.quantity, 3);
    assert!(approx(holding.cost_basis, 15.0));
    assert_eq!(
        inventory.store().read(|tx| tx.transactions()).unwrap(),
        log_before
    );
}

#[test]
fn sale_without_holding_is_insufficient() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 1, 5.0).unwrap().card_id;
    let err = inventory.sell("bob", &card_id, 1, 5.0).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientInventory { available: 0, .. }));
}

#[test]
fn sale_of_unknown_card_is_not_found() {
    let inventory = inventory();
    let err = inventory
        .sell("alice", &CardId::new("nothing|here|nm"), 1, 5.0)
        .unwrap_err();
    assert!(matches!(err, LedgerError::CardNotFound(_)));
}

#[test]
fn sale_validates_input() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 3, 5.0).unwrap().card_id;
    assert!(matches!(
        inventory.sell("alice", &card_id, 0, 5.0),
        Err(LedgerError::Validation(_))
    ));
    assert!(matches!(
        inventory.sell("alice", &card_id, 1, -1.0),
        Err(LedgerError::Validation(_))
    ));
}

// ── Transfer ───────────────────────────────────────────────────────────────

#[test]
fn transfer_moves_quantity_and_cost() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 6, 5.0).unwrap().card_id;

    let tx = inventory.transfer("alice", "bob", &card_id, 3, None).unwrap();
    assert_eq!(tx.kind, TransactionKind::Transfer);
    assert_eq!(tx.unit_price, None);
    assert_eq!(tx.from_user.as_deref(), Some("alice"));
    assert_eq!(tx.to_user.as_deref(), Some("bob"));
    assert!(approx(tx.cost_basis, 15.0));

    let alice = inventory.holding("alice", &card_id).unwrap();
    let bob = inventory.holding("bob", &card_id).unwrap();
    assert_eq!((alice.quantity, bob.quantity), (3, 3));
    assert!(approx(alice.cost_basis, 15.0));
    assert!(approx(bob.cost_basis, 15.0));
}

#[test]
fn transfer_conserves_cost_basis_across_prices() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 3, 7.0).unwrap().card_id;
    inventory.purchase("bob", &lotus(), 2, 11.0).unwrap();

    let before = inventory.holding("alice", &card_id).unwrap().cost_basis
        + inventory.holding("bob", &card_id).unwrap().cost_basis;
    inventory.transfer("alice", "bob", &card_id, 2, None).unwrap();
    let after = inventory.holding("alice", &card_id).unwrap().cost_basis
        + inventory.holding("bob", &card_id).unwrap().cost_basis;

    assert!(approx(before, after));
    let bob = inventory.holding("bob", &card_id).unwrap();
    assert_eq!(bob.quantity, 4);
    assert!(approx(bob.cost_basis, 22.0 + 14.0));
}

#[test]
fn transfer_to_self_is_rejected() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 1, 5.0).unwrap().card_id;
    let err = inventory.transfer("alice", "alice", &card_id, 1, None).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn transfer_over_quantity_changes_nothing() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 2, 5.0).unwrap().card_id;

    let err = inventory.transfer("alice", "bob", &card_id, 3, None).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientInventory { .. }));
    assert_eq!(inventory.holding("alice", &card_id).unwrap().quantity, 2);
    assert_eq!(inventory.holding("bob", &card_id).unwrap().quantity, 0);
}

#[test]
fn transfer_to_unknown_user_is_not_found() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 2, 5.0).unwrap().card_id;
    let err = inventory.transfer("alice", "mallory", &card_id, 1, None).unwrap_err();
    assert!(matches!(err, LedgerError::UserNotFound(ref u) if u == "mallory"));
    assert_eq!(inventory.holding("alice", &card_id).unwrap().quantity, 2);
}

#[test]
fn priced_transfer_records_price_and_moves_average_cost() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 4, 5.0).unwrap().card_id;

    let tx = inventory
        .transfer("alice", "bob", &card_id, 2, Some(9.0))
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Transfer);
    assert_eq!(tx.unit_price, Some(9.0));
    assert!(approx(tx.cost_basis, 10.0));
    // Only sales realize gains
    assert_eq!(tx.proceeds(), None);

    let alice = inventory.holding("alice", &card_id).unwrap();
    let bob = inventory.holding("bob", &card_id).unwrap();
    assert!(approx(alice.cost_basis, 10.0));
    assert!(approx(bob.cost_basis, 10.0));
    assert_eq!(
        inventory.store().read(|tx| tx.transactions()).unwrap().last(),
        Some(&tx)
    );
}

#[test]
fn priced_transfer_validates_price() {
    let inventory = inventory();
    let card_id = inventory.purchase("alice", &lotus(), 2, 5.0).unwrap().card_id;
    for price in [-1.0, f64::NAN, f64::MAX] {
        let err = inventory
            .transfer("alice", "bob", &card_id, 2, Some(price))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)), "price {price}");
    }
    assert_eq!(inventory.holding("alice", &card_id).unwrap().quantity, 2);
}

#[test]
fn transfer_refuses_destination_overflow() {
    let inventory = inventory();
    let x = inventory
        .purchase("alice", &lotus(), i64::MAX, 0.0)
        .unwrap()
        .card_id;
    inventory.purchase("bob", &lotus(), 1, 1.0).unwrap();

    let err = inventory.transfer("bob", "alice", &x, 1, None).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    // Nothing moved and the store is still usable
    assert_eq!(inventory.holding("alice", &x).unwrap().quantity, i64::MAX);
    let bob = inventory.holding("bob", &x).unwrap();
    assert_eq!(bob.quantity, 1);
    assert!(approx(bob.cost_basis, 1.0));
    inventory.sell("bob", &x, 1, 2.0).unwrap();
    assert_eq!(inventory.store().read(|tx| tx.transactions()).unwrap().len(), 3);
}

#[test]
fn purchase_refuses_quantity_overflow() {
    let inventory = inventory();
    let x = inventory
        .purchase("alice", &lotus(), i64::MAX, 0.0)
        .unwrap()
        .card_id;
    let err = inventory.purchase("alice", &lotus(), 1, 0.0).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(inventory.holding("alice", &x).unwrap().quantity, i64::MAX);
}

#[test]
fn purchase_refuses_cost_that_overflows() {
    let inventory = inventory();
    let err = inventory
        .purchase("alice", &lotus(), 4, f64::MAX)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert!(inventory.store().read(|tx| tx.transactions()).unwrap().is_empty());

    // Each purchase fits, but the running cost basis would not
    let x = inventory.purchase("alice", &lotus(), 1, f64::MAX).unwrap().card_id;
    let err = inventory
        .purchase("alice", &lotus(), 1, f64::MAX)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    let holding = inventory.holding("alice", &x).unwrap();
    assert_eq!(holding.quantity, 1);
    assert!(holding.cost_basis.is_finite());
}

#[test]
fn sale_refuses_proceeds_that_overflow() {
    let inventory = inventory();
    let x = inventory.purchase("alice", &lotus(), 4, 1.0).unwrap().card_id;
    let err = inventory.sell("alice", &x, 4, f64::MAX).unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));

    let receipt = inventory.sell("alice", &x, 1, 1.0).unwrap();
    assert!(receipt.realized_gain.is_finite());
    let holding = inventory.holding("alice", &x).unwrap();
    assert_eq!(holding.quantity, 3);
    assert!(approx(holding.cost_basis, 3.0));
}

// ── Scenarios and invariants ───────────────────────────────────────────────

#[test]
fn alice_and_bob_scenario() {
    let inventory = inventory();
    let x = inventory.purchase("alice", &lotus(), 10, 5.0).unwrap().card_id;
    let alice = inventory.holding("alice", &x).unwrap();
    assert_eq!(alice.quantity, 10);
    assert!(approx(alice.cost_basis, 50.0));

    let receipt = inventory.sell("alice", &x, 4, 8.0).unwrap();
    assert!(approx(receipt.proceeds, 32.0));
    assert!(approx(receipt.cost_removed, 20.0));
    assert!(approx(receipt.realized_gain, 12.0));
    let alice = inventory.holding("alice", &x).unwrap();
    assert_eq!(alice.quantity, 6);
    assert!(approx(alice.cost_basis, 30.0));

    inventory.transfer("alice", "bob", &x, 3, None).unwrap();
    let alice = inventory.holding("alice", &x).unwrap();
    let bob = inventory.holding("bob", &x).unwrap();
    assert_eq!(alice.quantity, 3);
    assert!(approx(alice.cost_basis, 15.0));
    assert_eq!(bob.quantity, 3);
    assert!(approx(bob.cost_basis, 15.0));

    let err = inventory.sell("alice", &x, 10, 8.0).unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientInventory { .. }));
    assert_eq!(inventory.holding("alice", &x).unwrap(), alice);
    assert_eq!(inventory.holding("bob", &x).unwrap(), bob);
}

#[test]
fn quantity_is_conserved_at_every_step() {
    let inventory = inventory();
    inventory.register_user("carol", "Carol", None).unwrap();
    let x = lotus().id();

    // (op, user, other, quantity); failures are part of the sequence
    let steps: &[(&str, &str, &str, i64)] = &[
        ("buy", "alice", "", 5),
        ("buy", "bob", "", 2),
        ("move", "alice", "carol", 3),
        ("sell", "carol", "", 1),
        ("move", "bob", "alice", 5),
        ("sell", "alice", "", 4),
        ("move", "carol", "bob", 2),
        ("buy", "carol", "", 7),
        ("sell", "bob", "", 3),
        ("move", "alice", "bob", 1),
        ("sell", "bob", "", 3),
    ];

    for &(op, user, other, quantity) in steps {
        let _ = match op {
            "buy" => inventory.purchase(user, &lotus(), quantity, 3.0).map(|_| ()),
            "sell" => inventory.sell(user, &x, quantity, 4.0).map(|_| ()),
            _ => inventory.transfer(user, other, &x, quantity, None).map(|_| ()),
        };
        assert_eq!(
            total_held(&inventory, &x),
            net_purchased(&inventory, &x),
            "after {op} {user} {quantity}"
        );
        for holding in inventory.store().read(|tx| tx.holdings_for_card(&x)).unwrap() {
            assert!(holding.quantity >= 0);
            assert!(holding.cost_basis >= -1e-9);
        }
    }
    // Three purchases of 14 copies, two successful sales of 4 copies in total
    assert_eq!(total_held(&inventory, &x), 10);
}

// ── Price reconciliation ───────────────────────────────────────────────────

#[test]
fn reconcile_keeps_newest_observation() {
    let inventory = inventory();
    let x = inventory.register_card(&lotus()).unwrap().id;

    let first = inventory
        .reconcile_price(&x, Some(PriceObservation::new(100.0, at(10))))
        .unwrap();
    assert!(matches!(first, Reconciliation::Accepted(_)));

    let second = inventory
        .reconcile_price(&x, Some(PriceObservation::new(90.0, at(5))))
        .unwrap();
    assert!(matches!(second, Reconciliation::Stale { current } if current.price == 100.0));

    let card = inventory.card(&x).unwrap();
    assert_eq!(card.last_price.map(|o| o.price), Some(100.0));
    assert_eq!(card.price_history.len(), 1);
}

#[test]
fn reconcile_replay_is_noop() {
    let inventory = inventory();
    let x = inventory.register_card(&lotus()).unwrap().id;
    let obs = PriceObservation::new(100.0, at(10));

    inventory.reconcile_price(&x, Some(obs)).unwrap();
    let replay = inventory.reconcile_price(&x, Some(obs)).unwrap();
    assert!(matches!(replay, Reconciliation::Stale { .. }));
    // Same timestamp, different price: still not newer
    inventory
        .reconcile_price(&x, Some(PriceObservation::new(55.0, at(10))))
        .unwrap();

    let card = inventory.card(&x).unwrap();
    assert_eq!(card.price_history, vec![obs]);
}

#[test]
fn reconcile_builds_ordered_history() {
    let inventory = inventory();
    let x = inventory.register_card(&lotus()).unwrap().id;
    for (price, secs) in [(10.0, 1), (12.0, 2), (11.0, 3)] {
        inventory
            .reconcile_price(&x, Some(PriceObservation::new(price, at(secs))))
            .unwrap();
    }
    let card = inventory.card(&x).unwrap();
    let times: Vec<_> = card.price_history.iter().map(|o| o.observed_at).collect();
    assert_eq!(times, vec![at(1), at(2), at(3)]);
    assert_eq!(card.last_price.map(|o| o.price), Some(11.0));
}

#[test]
fn reconcile_absent_observation_is_noop() {
    let inventory = inventory();
    let x = inventory.register_card(&lotus()).unwrap().id;
    assert_eq!(
        inventory.reconcile_price(&x, None).unwrap(),
        Reconciliation::NoObservation
    );
    assert!(inventory.card(&x).unwrap().last_price.is_none());
}

#[test]
fn reconcile_rejects_malformed_price() {
    let inventory = inventory();
    let x = inventory.register_card(&lotus()).unwrap().id;
    let err = inventory
        .reconcile_price(&x, Some(PriceObservation::new(-1.0, at(10))))
        .unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[test]
fn reconcile_unknown_card_is_not_found() {
    let inventory = inventory();
    let err = inventory
        .reconcile_price(&CardId::new("ghost"), Some(PriceObservation::new(1.0, at(1))))
        .unwrap_err();
    assert!(matches!(err, LedgerError::CardNotFound(_)));
}

// ── Concurrency ────────────────────────────────────────────────────────────

#[test]
fn concurrent_sales_never_oversell() {
    use std::sync::Arc;

    let inventory = Arc::new(inventory());
    let x = inventory.purchase("alice", &lotus(), 10, 1.0).unwrap().card_id;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let inventory = Arc::clone(&inventory);
            let x = x.clone();
            std::thread::spawn(move || inventory.sell("alice", &x, 3, 2.0).is_ok())
        })
        .collect();
    let succeeded = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(succeeded, 3);
    assert_eq!(inventory.holding("alice", &x).unwrap().quantity, 1);
}
