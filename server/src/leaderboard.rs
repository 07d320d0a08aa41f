//! Process-wide record of plays, wins and winning times
//!
//! Every worker shares one [`Leaderboard`]. Access follows the classic
//! readers-writer discipline built from two locks:
//!
//! - a reader counter guarded by its own mutex, and
//! - a write gate that admits either one writer or the whole group of
//!   concurrent readers.
//!
//! The first reader to arrive closes the gate on behalf of every reader and
//! the last one to leave opens it again, so readers never wait on each other
//! while a writer always has the records to itself. Under sustained load either
//! side can starve the other.
//!
//! The gate alone provides the exclusion between readers and writers. The
//! records sit in an `RwLock` only so that readers inside the gate can borrow
//! them at the same time; by the time a thread touches the `RwLock` the other
//! side is already locked out, so it never blocks. A plain `Mutex` in its
//! place would serialize the readers the gate lets in together.

use log::{debug, info};
use shared::LeaderboardEntry;
use std::collections::TryReserveError;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaderboardError {
    #[error("out of memory while recording a result for {name}")]
    OutOfMemory {
        name: String,
        #[source]
        source: TryReserveError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinRecord {
    pub seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub name: String,
    pub plays: u32,
    pub wins: u32,
    /// Winning times in the order they were achieved.
    pub win_records: Vec<WinRecord>,
}

impl UserRecord {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            plays: 0,
            wins: 0,
            win_records: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Binary semaphore. Unlike a mutex guard, it may be released by a different
/// thread than the one that acquired it, which the last-reader hand-off needs.
#[derive(Debug, Default)]
struct WriteGate {
    closed: Mutex<bool>,
    opened: Condvar,
}

impl WriteGate {
    fn close(&self) {
        let mut closed = lock(&self.closed);
        while *closed {
            closed = self
                .opened
                .wait(closed)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *closed = true;
    }

    fn open(&self) {
        *lock(&self.closed) = false;
        self.opened.notify_one();
    }
}

/// Held by a reader for the duration of a read.
struct ReadAccess<'a> {
    board: &'a Leaderboard,
}

impl<'a> ReadAccess<'a> {
    fn enter(board: &'a Leaderboard) -> Self {
        let mut readers = lock(&board.readers);
        *readers += 1;
        if *readers == 1 {
            board.gate.close();
        }
        Self { board }
    }
}

impl Drop for ReadAccess<'_> {
    fn drop(&mut self) {
        let mut readers = lock(&self.board.readers);
        *readers -= 1;
        if *readers == 0 {
            self.board.gate.open();
        }
    }
}

/// Held by a writer for the duration of a write.
struct WriteAccess<'a> {
    gate: &'a WriteGate,
}

impl<'a> WriteAccess<'a> {
    fn enter(gate: &'a WriteGate) -> Self {
        gate.close();
        Self { gate }
    }
}

impl Drop for WriteAccess<'_> {
    fn drop(&mut self) {
        self.gate.open();
    }
}

#[derive(Debug, Default)]
pub struct Leaderboard {
    /// Shared borrows for the readers the gate admits together.
    users: RwLock<Vec<UserRecord>>,
    readers: Mutex<usize>,
    gate: WriteGate,
}

impl Leaderboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a finished game for `name`, creating the user on first sight.
    /// A win also stores its completion time.
    pub fn record_result(
        &self,
        name: &str,
        won: bool,
        seconds: u64,
    ) -> Result<(), LeaderboardError> {
        let _access = WriteAccess::enter(&self.gate);
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);

        let out_of_memory = |source| LeaderboardError::OutOfMemory {
            name: name.to_string(),
            source,
        };

        let index = match users.iter().position(|user| user.name == name) {
            Some(index) => index,
            None => {
                users.try_reserve(1).map_err(out_of_memory)?;
                users.push(UserRecord::new(name));
                info!("Created leaderboard record for {}", name);
                users.len() - 1
            }
        };

        let user = &mut users[index];
        if won {
            user.win_records.try_reserve(1).map_err(out_of_memory)?;
            user.win_records.push(WinRecord { seconds });
            user.wins += 1;
        }
        user.plays += 1;

        debug!(
            "Recorded {} for {} ({} wins / {} plays)",
            if won { "win" } else { "loss" },
            name,
            user.wins,
            user.plays
        );
        Ok(())
    }

    /// Runs `f` with shared access to the user records.
    pub fn read<R>(&self, f: impl FnOnce(&[UserRecord]) -> R) -> R {
        let _access = ReadAccess::enter(self);
        let users = self.users.read().unwrap_or_else(PoisonError::into_inner);
        f(&users)
    }

    /// One entry per recorded win, in storage order: users by first
    /// appearance, each user's wins chronologically. Users without a win
    /// contribute nothing.
    pub fn snapshot(&self) -> Vec<LeaderboardEntry> {
        self.read(|users| {
            users
                .iter()
                .flat_map(|user| {
                    user.win_records.iter().map(move |record| LeaderboardEntry {
                        name: user.name.clone(),
                        seconds: record.seconds,
                        wins: user.wins,
                        plays: user.plays,
                    })
                })
                .collect()
        })
    }

    pub fn user(&self, name: &str) -> Option<UserRecord> {
        self.read(|users| users.iter().find(|user| user.name == name).cloned())
    }

    /// Releases every record.
    pub fn shutdown(&self) {
        let _access = WriteAccess::enter(&self.gate);
        let mut users = self.users.write().unwrap_or_else(PoisonError::into_inner);
        let released = users.len();
        users.clear();
        users.shrink_to_fit();
        info!("Leaderboard released {} user records", released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_loss_counts_play_without_entry() {
        let board = Leaderboard::new();
        board.record_result("Maolin", false, 30).unwrap();

        assert!(board.snapshot().is_empty());
        let user = board.user("Maolin").unwrap();
        assert_eq!(user.plays, 1);
        assert_eq!(user.wins, 0);
    }

    #[test]
    fn test_snapshot_storage_order() {
        let board = Leaderboard::new();
        board.record_result("b", true, 50).unwrap();
        board.record_result("a", true, 20).unwrap();
        board.record_result("b", false, 0).unwrap();
        board.record_result("b", true, 40).unwrap();

        let snapshot = board.snapshot();
        let lines: Vec<(&str, u64, u32, u32)> = snapshot
            .iter()
            .map(|e| (e.name.as_str(), e.seconds, e.wins, e.plays))
            .collect();
        assert_eq!(
            lines,
            vec![("b", 50, 2, 3), ("b", 40, 2, 3), ("a", 20, 1, 1)]
        );
    }

    #[test]
    fn test_concurrent_writers_distinct_users() {
        let board = Arc::new(Leaderboard::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    board.record_result(&format!("user{}", i), true, i).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = board.snapshot();
        assert_eq!(snapshot.len(), 16);
        for i in 0..16u64 {
            let name = format!("user{}", i);
            let matching: Vec<_> = snapshot.iter().filter(|e| e.name == name).collect();
            assert_eq!(matching.len(), 1);
            assert_eq!(matching[0].seconds, i);
            assert_eq!(matching[0].wins, 1);
            assert_eq!(matching[0].plays, 1);
        }
    }

    #[test]
    fn test_concurrent_writers_same_user() {
        let board = Arc::new(Leaderboard::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    for round in 0..25u64 {
                        board.record_result("shared", round % 2 == 0, round).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let user = board.user("shared").unwrap();
        assert_eq!(user.plays, 200);
        assert_eq!(user.wins, 8 * 13);
        assert_eq!(user.win_records.len(), 8 * 13);
    }

    #[test]
    fn test_readers_do_not_block_each_other() {
        let board = Arc::new(Leaderboard::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let board = Arc::clone(&board);
                let entered_tx = entered_tx.clone();
                let release_rx = Arc::clone(&release_rx);
                thread::spawn(move || {
                    board.read(|_| {
                        entered_tx.send(()).unwrap();
                        let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
                    })
                })
            })
            .collect();

        // Both readers must be inside at the same time before either leaves.
        entered_rx.recv_timeout(WAIT).unwrap();
        entered_rx.recv_timeout(WAIT).unwrap();

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_writer_waits_for_active_reader() {
        let board = Arc::new(Leaderboard::new());
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let reader = {
            let board = Arc::clone(&board);
            thread::spawn(move || {
                board.read(|users| {
                    entered_tx.send(users.len()).unwrap();
                    let _ = release_rx.recv_timeout(WAIT);
                })
            })
        };
        assert_eq!(entered_rx.recv_timeout(WAIT).unwrap(), 0);

        let written = Arc::new(AtomicBool::new(false));
        let writer = {
            let board = Arc::clone(&board);
            let written = Arc::clone(&written);
            thread::spawn(move || {
                board.record_result("writer", true, 5).unwrap();
                written.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!written.load(Ordering::SeqCst));

        release_tx.send(()).unwrap();
        reader.join().unwrap();
        writer.join().unwrap();

        assert!(written.load(Ordering::SeqCst));
        assert_eq!(board.snapshot().len(), 1);
    }

    #[test]
    fn test_snapshots_during_writes_are_consistent() {
        let board = Arc::new(Leaderboard::new());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    for round in 0..50u64 {
                        board
                            .record_result(&format!("player{}", i), round % 3 != 0, round)
                            .unwrap();
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let board = Arc::clone(&board);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let snapshot = board.snapshot();
                        let mut per_user: HashMap<&str, Vec<&LeaderboardEntry>> = HashMap::new();
                        for entry in &snapshot {
                            per_user.entry(entry.name.as_str()).or_default().push(entry);
                        }
                        for entries in per_user.values() {
                            let first = entries[0];
                            assert_eq!(first.wins as usize, entries.len());
                            assert!(first.plays >= first.wins);
                            assert!(entries
                                .iter()
                                .all(|e| e.wins == first.wins && e.plays == first.plays));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }

        assert_eq!(board.user("player0").unwrap().plays, 50);
    }

    #[test]
    fn test_shutdown_releases_records() {
        let board = Leaderboard::new();
        board.record_result("a", true, 1).unwrap();
        board.record_result("b", false, 1).unwrap();

        board.shutdown();
        assert!(board.snapshot().is_empty());
        assert!(board.user("a").is_none());
    }
}
