use anyhow::Result;
use heapdb::access::{DataType, Schema, SeqScan, Tuple, Value};
use heapdb::storage::buffer::Permission;
use heapdb::storage::{BufferPool, HeapFile, PageId, StorageError, TableId};
use heapdb::transaction::Transaction;
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::{tempdir, TempDir};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn schema() -> Schema {
    Schema::new(vec![(DataType::Int, "id"), (DataType::Int, "payload")])
}

const TABLE: TableId = TableId(1);

fn setup(capacity: usize) -> Result<(Arc<BufferPool>, TempDir)> {
    let dir = tempdir()?;
    let file = HeapFile::create(&dir.path().join("table.dat"), schema())?;
    let pool = Arc::new(BufferPool::new(capacity));
    pool.register_table(TABLE, file);
    Ok((pool, dir))
}

fn row(id: i32, payload: i32) -> Tuple {
    Tuple::new(vec![Value::Int(id), Value::Int(payload)])
}

fn count_rows(pool: &Arc<BufferPool>) -> Result<usize> {
    let txn = Transaction::begin(Arc::clone(pool));
    let mut scan = SeqScan::new(Arc::clone(pool), txn.id(), TABLE);
    scan.open()?;
    let mut n = 0;
    while scan.has_next()? {
        scan.next()?;
        n += 1;
    }
    txn.commit()?;
    Ok(n)
}

#[test]
fn test_commit_is_durable_across_reopen() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let path = dir.path().join("table.dat");

    {
        let pool = Arc::new(BufferPool::new(10));
        pool.register_table(TABLE, HeapFile::create(&path, schema())?);
        let txn = Transaction::begin(Arc::clone(&pool));
        for i in 0..10 {
            pool.insert(txn.id(), TABLE, row(i, i * 100))?;
        }
        txn.commit()?;
    }

    // A fresh pool over the same file sees the committed rows.
    let pool = Arc::new(BufferPool::new(10));
    pool.register_table(TABLE, HeapFile::open(&path, schema())?);
    assert_eq!(count_rows(&pool)?, 10);
    Ok(())
}

#[test]
fn test_abort_leaves_no_trace() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(10)?;

    let txn = Transaction::begin(Arc::clone(&pool));
    pool.insert(txn.id(), TABLE, row(1, 1))?;
    txn.commit()?;

    let txn = Transaction::begin(Arc::clone(&pool));
    pool.insert(txn.id(), TABLE, row(2, 2))?;
    pool.insert(txn.id(), TABLE, row(3, 3))?;
    txn.abort()?;

    assert_eq!(count_rows(&pool)?, 1);
    Ok(())
}

#[test]
fn test_dropped_transaction_aborts() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(10)?;

    {
        let txn = Transaction::begin(Arc::clone(&pool));
        pool.insert(txn.id(), TABLE, row(7, 7))?;
        // Falls out of scope without commit.
    }

    assert_eq!(count_rows(&pool)?, 0);
    Ok(())
}

#[test]
fn test_delete_then_commit() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(10)?;

    let txn = Transaction::begin(Arc::clone(&pool));
    for i in 0..5 {
        pool.insert(txn.id(), TABLE, row(i, i))?;
    }
    txn.commit()?;

    let txn = Transaction::begin(Arc::clone(&pool));
    let mut scan = SeqScan::new(Arc::clone(&pool), txn.id(), TABLE);
    scan.open()?;
    let mut deleted = 0;
    while scan.has_next()? {
        let tuple = scan.next()?;
        if let Value::Int(id) = tuple.values[0] {
            if id % 2 == 0 {
                pool.delete(txn.id(), &tuple)?;
                deleted += 1;
            }
        }
    }
    txn.commit()?;

    assert_eq!(deleted, 3);
    assert_eq!(count_rows(&pool)?, 2);
    Ok(())
}

#[test]
fn test_scan_rewind_is_stable() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(10)?;

    let txn = Transaction::begin(Arc::clone(&pool));
    for i in 0..6 {
        pool.insert(txn.id(), TABLE, row(i, 0))?;
    }
    txn.commit()?;

    let txn = Transaction::begin(Arc::clone(&pool));
    let mut scan = SeqScan::new(Arc::clone(&pool), txn.id(), TABLE);
    scan.open()?;
    let first: Vec<_> = {
        let mut v = Vec::new();
        while scan.has_next()? {
            v.push(scan.next()?.values.clone());
        }
        v
    };
    scan.rewind()?;
    let second: Vec<_> = {
        let mut v = Vec::new();
        while scan.has_next()? {
            v.push(scan.next()?.values.clone());
        }
        v
    };
    assert_eq!(first, second);
    assert_eq!(first.len(), 6);
    txn.commit()?;
    Ok(())
}

// 3 tuples fill a page with this schema, so a handful of rows spans pages.
fn wide_schema() -> Schema {
    Schema::new(vec![
        (DataType::Text, "c0"),
        (DataType::Text, "c1"),
        (DataType::Text, "c2"),
        (DataType::Text, "c3"),
        (DataType::Text, "c4"),
        (DataType::Text, "c5"),
        (DataType::Text, "c6"),
        (DataType::Text, "c7"),
    ])
}

fn wide_row(tag: &str) -> Tuple {
    Tuple::new(vec![Value::Text(tag.to_string()); 8])
}

#[test]
fn test_deadlock_picks_one_victim() -> Result<()> {
    init_logger();
    let dir = tempdir()?;
    let file = HeapFile::create(&dir.path().join("table.dat"), wide_schema())?;
    let pool = Arc::new(BufferPool::new(10));
    pool.register_table(TABLE, file);

    // Four rows span two pages.
    let txn = Transaction::begin(Arc::clone(&pool));
    for i in 0..4 {
        pool.insert(txn.id(), TABLE, wide_row(&format!("r{}", i)))?;
    }
    txn.commit()?;
    assert_eq!(pool.num_pages(TABLE)?, 2);

    let barrier = Arc::new(Barrier::new(2));
    let mut handles = Vec::new();
    for order in [[0u32, 1], [1, 0]] {
        let pool = Arc::clone(&pool);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || -> Result<bool, StorageError> {
            let tid = pool.next_transaction_id();
            let first = PageId::new(TABLE, order[0]);
            let second = PageId::new(TABLE, order[1]);

            pool.fetch(tid, first, Permission::ReadWrite)?;
            barrier.wait();
            match pool.fetch(tid, second, Permission::ReadWrite) {
                Ok(_) => {
                    pool.transaction_complete(tid, true)?;
                    Ok(true)
                }
                // The pool already rolled the victim back.
                Err(StorageError::TransactionAborted(_)) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let outcomes: Vec<bool> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect::<Result<_, _>>()?;

    // Exactly one transaction survives, the other is the deadlock victim.
    assert_eq!(outcomes.iter().filter(|&&ok| ok).count(), 1);
    assert_eq!(outcomes.len(), 2);
    Ok(())
}

#[test]
fn test_tiny_pool_writes_through_under_pressure() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(2)?;

    // One row per transaction keeps at most one page dirty at a time, so a
    // two-page pool always finds an eviction victim.
    for i in 0..1200 {
        let txn = Transaction::begin(Arc::clone(&pool));
        pool.insert(txn.id(), TABLE, row(i, i))?;
        txn.commit()?;
    }

    assert!(pool.num_pages(TABLE)? >= 2);
    assert_eq!(count_rows(&pool)?, 1200);
    Ok(())
}

#[test]
fn test_pool_of_dirty_pages_reports_exhaustion() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(1)?;

    // Fill page 0 completely within one open transaction, then force a
    // second page to be admitted while the first is still dirty.
    let tid = pool.next_transaction_id();
    pool.insert(tid, TABLE, row(0, 0))?;
    let slots = pool
        .fetch(tid, PageId::new(TABLE, 0), Permission::ReadOnly)?
        .read()
        .num_slots();
    for i in 1..slots as i32 {
        pool.insert(tid, TABLE, row(i, i))?;
    }

    let result = pool.insert(tid, TABLE, row(-1, -1));
    assert!(matches!(result, Err(StorageError::CacheExhausted)));

    // Committing flushes the page and unblocks the pool.
    pool.transaction_complete(tid, true)?;
    let txn = Transaction::begin(Arc::clone(&pool));
    pool.insert(txn.id(), TABLE, row(-1, -1))?;
    txn.commit()?;
    Ok(())
}

#[test]
fn test_concurrent_inserts_all_land() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(50)?;

    const THREADS: usize = 8;
    const ROWS_PER_THREAD: usize = 50;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || -> Result<(), StorageError> {
                let mut rng = rand::thread_rng();
                for i in 0..ROWS_PER_THREAD {
                    let id = (t * ROWS_PER_THREAD + i) as i32;
                    let payload = rng.gen_range(0..1_000_000);
                    loop {
                        let tid = pool.next_transaction_id();
                        match pool.insert(tid, TABLE, row(id, payload)) {
                            Ok(()) => {
                                pool.transaction_complete(tid, true)?;
                                break;
                            }
                            // Deadlock victims retry with a fresh id.
                            Err(StorageError::TransactionAborted(_)) => continue,
                            Err(e) => return Err(e),
                        }
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked")?;
    }

    assert_eq!(count_rows(&pool)?, THREADS * ROWS_PER_THREAD);
    Ok(())
}

#[test]
fn test_readers_share_writers_exclude() -> Result<()> {
    init_logger();
    let (pool, _dir) = setup(10)?;

    let txn = Transaction::begin(Arc::clone(&pool));
    pool.insert(txn.id(), TABLE, row(1, 1))?;
    txn.commit()?;

    let pid = PageId::new(TABLE, 0);
    let reader_a = pool.next_transaction_id();
    let reader_b = pool.next_transaction_id();
    pool.fetch(reader_a, pid, Permission::ReadOnly)?;
    pool.fetch(reader_b, pid, Permission::ReadOnly)?;
    assert!(pool.holds_lock(reader_a, pid));
    assert!(pool.holds_lock(reader_b, pid));

    // A writer cannot break in while readers hold the page; once they
    // finish it can.
    let writer = Arc::clone(&pool);
    let handle = thread::spawn(move || -> Result<(), StorageError> {
        let tid = writer.next_transaction_id();
        writer.insert(tid, TABLE, row(2, 2))?;
        writer.transaction_complete(tid, true)?;
        Ok(())
    });

    thread::sleep(std::time::Duration::from_millis(50));
    pool.transaction_complete(reader_a, true)?;
    pool.transaction_complete(reader_b, true)?;
    handle.join().expect("thread panicked")?;

    assert_eq!(count_rows(&pool)?, 2);
    Ok(())
}
