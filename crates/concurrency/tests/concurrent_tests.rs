//! Concurrent/Multi-threaded Tests for tally-concurrency
//!
//! These tests verify correct behavior under actual concurrent execution:
//!
//! 1. **Serialization Point** - Validation+update of one commit excludes all others
//! 2. **Unique Numbering** - tids and tnums stay unique under load
//! 3. **Lost Updates** - Read-modify-write retried on abort never loses an increment
//! 4. **Conservation** - Concurrent transfers never create or destroy money
//! 5. **Serializability** - No committed transaction overlaps a conflicting writer
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test concurrent_tests
//! ```

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use rand::Rng;
use tally_concurrency::{AbortReason, Coordinator, LogView};
use tally_core::AccountStorage;
use tally_storage::AccountStore;

// ============================================================================
// Test Helpers
// ============================================================================

fn create_coordinator(accounts: u64, initial_balance: i64) -> Arc<Coordinator<AccountStore>> {
    let store = AccountStore::with_accounts(accounts, initial_balance);
    Arc::new(Coordinator::new(Arc::new(store), LogView::Deferred))
}

/// Run `body` in a fresh transaction until it commits, returning the number
/// of attempts
fn retry_until_committed<F>(coord: &Coordinator<AccountStore>, mut body: F) -> usize
where
    F: FnMut(&mut tally_concurrency::Transaction, &AccountStore),
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let mut txn = coord.open();
        body(&mut txn, coord.store().as_ref());
        if coord.close(txn).unwrap().is_committed() {
            return attempts;
        }
    }
}

// ============================================================================
// SECTION 1: Serialization Point
// ============================================================================

mod serialization_point {
    use super::*;

    /// Two transactions read and write the same account, then close at the
    /// same moment. Exactly one can commit.
    #[test]
    fn test_concurrent_read_modify_write_one_winner() {
        let coord = create_coordinator(1, 0);
        let barrier = Arc::new(Barrier::new(2));
        let success_count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let coord = Arc::clone(&coord);
                let barrier = Arc::clone(&barrier);
                let success_count = Arc::clone(&success_count);

                thread::spawn(move || {
                    let mut txn = coord.open();
                    let v = txn.read(coord.store().as_ref(), 0).unwrap();
                    txn.write(coord.store().as_ref(), 0, v + i + 1).unwrap();

                    // Both opened and read before either closes
                    barrier.wait();

                    if coord.close(txn).unwrap().is_committed() {
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(success_count.load(Ordering::SeqCst), 1);
        let final_value = coord.store().read(0).unwrap();
        assert!(final_value == 1 || final_value == 2);
    }

    /// Many readers of the same account race to commit a write to it
    #[test]
    fn test_many_contenders_single_winner() {
        let coord = create_coordinator(1, 0);
        let num_threads = 10;
        let barrier = Arc::new(Barrier::new(num_threads));
        let success_count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..num_threads)
            .map(|i| {
                let coord = Arc::clone(&coord);
                let barrier = Arc::clone(&barrier);
                let success_count = Arc::clone(&success_count);

                thread::spawn(move || {
                    let mut txn = coord.open();
                    txn.read(coord.store().as_ref(), 0).unwrap();
                    txn.write(coord.store().as_ref(), 0, i as i64).unwrap();
                    barrier.wait();
                    if coord.close(txn).unwrap().is_committed() {
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(success_count.load(Ordering::SeqCst), 1);
        let stats = coord.stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.validation_failures, num_threads as u64 - 1);
    }

    /// Disjoint read/write sets never conflict, however they interleave
    #[test]
    fn test_disjoint_transactions_all_commit() {
        let num_threads = 20;
        let coord = create_coordinator(num_threads as u64, 10);
        let barrier = Arc::new(Barrier::new(num_threads));

        let handles: Vec<_> = (0..num_threads)
            .map(|i| {
                let coord = Arc::clone(&coord);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let account = i as u64;
                    let mut txn = coord.open();
                    let v = txn.read(coord.store().as_ref(), account).unwrap();
                    txn.write(coord.store().as_ref(), account, v * 2).unwrap();
                    barrier.wait();
                    coord.close(txn).unwrap().is_committed()
                })
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        for account in 0..num_threads as u64 {
            assert_eq!(coord.store().read(account).unwrap(), 20);
        }
    }
}

// ============================================================================
// SECTION 2: Unique Numbering
// ============================================================================

mod numbering {
    use super::*;

    #[test]
    fn test_tid_uniqueness_concurrent() {
        let coord = create_coordinator(1, 0);
        let seen = Arc::new(Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coord = Arc::clone(&coord);
                let seen = Arc::clone(&seen);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let txn = coord.open();
                        assert!(seen.lock().insert(txn.tid()), "duplicate tid");
                        coord.abort_client(txn, AbortReason::ClientRequested).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(seen.lock().len(), 1_600);
        assert_eq!(coord.aborted_transactions().len(), 1_600);
        assert!(coord.running_transactions().is_empty());
    }

    /// Committed and validation-aborted transactions share one tnum sequence
    /// with no duplicates and no holes
    #[test]
    fn test_tnum_sequence_dense_and_unique() {
        let coord = create_coordinator(4, 0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coord = Arc::clone(&coord);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..100 {
                        let mut txn = coord.open();
                        let a = rng.gen_range(0..4);
                        let b = rng.gen_range(0..4);
                        txn.read(coord.store().as_ref(), a).unwrap();
                        txn.write(coord.store().as_ref(), b, 1).unwrap();
                        coord.close(txn).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let mut tnums: Vec<u64> = coord
            .committed_transactions()
            .iter()
            .chain(coord.aborted_transactions().iter())
            .map(|t| t.tnum().unwrap())
            .collect();
        tnums.sort_unstable();
        let expected: Vec<u64> = (1..=800).collect();
        assert_eq!(tnums, expected);
        assert_eq!(coord.last_tnum(), 800);
    }

    /// Commits racing on different threads must still validate and install
    /// one at a time, in tnum order. The global event sequence shows the
    /// order in which each step actually ran.
    #[test]
    fn test_commits_run_one_at_a_time_in_tnum_order() {
        const THREADS: u64 = 4;
        const PER_THREAD: i64 = 100;
        let coord = create_coordinator(THREADS * 2, 0);
        let barrier = Arc::new(Barrier::new(THREADS as usize));

        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let coord = Arc::clone(&coord);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_THREAD {
                        let mut txn = coord.open();
                        let store = coord.store().as_ref();
                        txn.write(store, t * 2, i).unwrap();
                        txn.write(store, t * 2 + 1, -i).unwrap();
                        assert!(coord.close(txn).unwrap().is_committed());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let committed = coord.committed_transactions();
        assert_eq!(committed.len(), (THREADS as i64 * PER_THREAD) as usize);

        let seq_of = |txn: &tally_concurrency::Transaction, prefix: &str| -> u64 {
            txn.log_entries()
                .iter()
                .find(|e| e.message.starts_with(prefix))
                .map(|e| e.seq)
                .unwrap_or_else(|| panic!("txn #{} never logged {:?}", txn.tid(), prefix))
        };
        let last_seq = |txn: &tally_concurrency::Transaction| -> u64 {
            txn.log_entries().last().map(|e| e.seq).unwrap()
        };

        for pair in committed.windows(2) {
            let (earlier, later) = (pair[0].as_ref(), pair[1].as_ref());
            assert!(earlier.tnum().unwrap() < later.tnum().unwrap());
            assert!(
                seq_of(earlier, "validation passed") < seq_of(later, "validation passed"),
                "txn #{} passed validation before txn #{} despite a greater tnum",
                later.tid(),
                earlier.tid()
            );
            // the later commit starts validating only once the earlier one
            // has installed every write
            assert!(
                last_seq(earlier) < seq_of(later, "validating"),
                "txn #{} started validating while txn #{} was still installing",
                later.tid(),
                earlier.tid()
            );
        }
    }
}

// ============================================================================
// SECTION 3: Lost Updates and Conservation
// ============================================================================

mod invariants_under_load {
    use super::*;

    /// Every thread increments the same counter with retries. OCC must not
    /// lose a single increment.
    #[test]
    fn test_contended_counter_no_lost_updates() {
        let coord = create_coordinator(1, 0);
        let num_threads = 8;
        let increments = 100;

        let handles: Vec<_> = (0..num_threads)
            .map(|_| {
                let coord = Arc::clone(&coord);
                thread::spawn(move || {
                    let mut attempts = 0;
                    for _ in 0..increments {
                        attempts += retry_until_committed(&coord, |txn, store| {
                            let v = txn.read(store, 0).unwrap();
                            txn.write(store, 0, v + 1).unwrap();
                        });
                    }
                    attempts
                })
            })
            .collect();

        let attempts: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let expected = (num_threads * increments) as i64;
        assert_eq!(coord.store().read(0).unwrap(), expected);
        let stats = coord.stats();
        assert_eq!(stats.committed, expected as u64);
        assert_eq!(stats.started as usize, attempts);
        assert_eq!(stats.validation_failures as usize, attempts - expected as usize);
    }

    /// Random transfers between accounts keep the total balance constant
    #[test]
    fn test_transfers_conserve_total() {
        let accounts = 10;
        let coord = create_coordinator(accounts, 100);
        let initial_total = coord.store().total_balance();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coord = Arc::clone(&coord);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..200 {
                        let from = rng.gen_range(0..accounts);
                        let to = rng.gen_range(0..accounts);
                        let amount = rng.gen_range(1..20);
                        retry_until_committed(&coord, |txn, store| {
                            let a = txn.read(store, from).unwrap();
                            txn.write(store, from, a - amount).unwrap();
                            let b = txn.read(store, to).unwrap();
                            txn.write(store, to, b + amount).unwrap();
                        });
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(coord.store().total_balance(), initial_total);
        assert_eq!(coord.stats().committed, 8 * 200);
    }

    /// Client aborts interleaved with commits never touch the store
    #[test]
    fn test_client_aborts_leave_no_trace() {
        let coord = create_coordinator(4, 50);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let coord = Arc::clone(&coord);
                thread::spawn(move || {
                    for i in 0..100 {
                        let mut txn = coord.open();
                        txn.write(coord.store().as_ref(), t, 9_999).unwrap();
                        if i % 2 == 0 {
                            coord.abort_client(txn, AbortReason::Disconnected).unwrap();
                        } else {
                            let mut undo = txn;
                            undo.write(coord.store().as_ref(), t, 50).unwrap();
                            assert!(coord.close(undo).unwrap().is_committed());
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for account in 0..4 {
            assert_eq!(coord.store().read(account).unwrap(), 50);
        }
        assert_eq!(coord.aborted_transactions().len(), 200);
        assert!(coord
            .aborted_transactions()
            .iter()
            .all(|t| t.tnum().is_none()));
    }

    /// Post-hoc check of the backward validation guarantee on a random
    /// workload: no committed transaction read an account written by a
    /// committed transaction that overlapped it.
    #[test]
    fn test_committed_history_has_no_overlapping_conflicts() {
        let coord = create_coordinator(6, 0);

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let coord = Arc::clone(&coord);
                thread::spawn(move || {
                    let mut rng = rand::thread_rng();
                    for _ in 0..150 {
                        let mut txn = coord.open();
                        for _ in 0..rng.gen_range(1..4) {
                            let account = rng.gen_range(0..6);
                            if rng.gen_bool(0.5) {
                                txn.read(coord.store().as_ref(), account).unwrap();
                            } else {
                                txn.write(coord.store().as_ref(), account, rng.gen_range(0..100))
                                    .unwrap();
                            }
                        }
                        coord.close(txn).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let committed = coord.committed_transactions();
        for t in &committed {
            let tnum = t.tnum().unwrap();
            for u in &committed {
                let u_tnum = u.tnum().unwrap();
                if t.snapshot_tnum() < u_tnum && u_tnum < tnum {
                    assert!(
                        t.read_set().iter().all(|a| !u.write_set().contains_key(a)),
                        "#{} committed despite overlapping writer #{}",
                        t.tid(),
                        u.tid()
                    );
                }
            }
        }
    }
}
