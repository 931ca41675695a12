use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc::channel};

/// Resolve the effective worker count for `items` work units.
///
/// `configured` of 0 means auto (one worker per available core).
pub(crate) fn effective_workers(configured: usize, items: usize) -> usize {
    let auto = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let workers = if configured > 0 { configured } else { auto };
    workers.min(items).max(1)
}

/// Run `job` for every index in `0..count` across a fixed worker pool.
///
/// Each worker owns one scratch value built by `make_scratch`; scratch is
/// never shared between workers. Results come back ordered by index. The
/// caller thread blocks until all work is done (fork-join).
pub(crate) fn map_indexed<S, T, G, F>(
    workers: usize,
    count: usize,
    make_scratch: G,
    job: F,
) -> Vec<T>
where
    S: Send,
    T: Send,
    G: Fn() -> S + Sync,
    F: Fn(&mut S, usize) -> T + Sync,
{
    if count == 0 {
        return Vec::new();
    }
    if workers <= 1 {
        let mut scratch = make_scratch();
        return (0..count).map(|index| job(&mut scratch, index)).collect();
    }

    let queue = Arc::new(Mutex::new(VecDeque::from_iter(0..count)));
    let (tx, rx) = channel();
    let make_scratch = &make_scratch;
    let job = &job;

    std::thread::scope(|scope| {
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            scope.spawn(move || {
                let mut scratch = make_scratch();
                loop {
                    let next = {
                        let mut guard = match queue.lock() {
                            Ok(guard) => guard,
                            Err(_) => return,
                        };
                        guard.pop_front()
                    };
                    let Some(index) = next else {
                        break;
                    };
                    let value = job(&mut scratch, index);
                    if tx.send((index, value)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);
    });

    let mut collected: Vec<(usize, T)> = rx.iter().collect();
    collected.sort_unstable_by_key(|(index, _)| *index);
    collected.into_iter().map(|(_, value)| value).collect()
}
