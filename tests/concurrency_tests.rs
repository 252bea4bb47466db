//! # Concurrency Tests using Loom / 使用 Loom 的并发测试
//!
//! Models the cancellation of a test run with loom: the adapter clears its
//! cancel flag when a run starts and checks it before every batch, while the
//! host may set it at any moment.
//!
//! 使用 loom 对测试运行的取消进行建模：适配器在运行开始时清除取消标志，
//! 并在每个批次之前检查它，而宿主可以随时设置该标志。

#[cfg(test)]
mod tests {
    use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use loom::sync::{Arc, Mutex};
    use loom::thread;

    const STACK_SIZE: usize = 8 * 1024 * 1024; // 8 MB
    const BATCHES: usize = 2;

    fn run_model<F>(model: F)
    where
        F: Fn() + Sync + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .name("loom-test-thread".into())
            .stack_size(STACK_SIZE)
            .spawn(move || loom::model(model))
            .unwrap();
        handle.join().unwrap();
    }

    /// Once a batch has been skipped, no later batch of the same run starts,
    /// and every batch is either run or skipped.
    ///
    /// 一旦某个批次被跳过，同一次运行中之后的批次都不会启动，且每个批次要么运行要么跳过。
    #[test]
    fn test_cancel_skips_remaining_batches() {
        run_model(|| {
            let cancelled = Arc::new(AtomicBool::new(false));
            let outcomes = Arc::new(Mutex::new(Vec::new()));

            let runner = {
                let cancelled = cancelled.clone();
                let outcomes = outcomes.clone();
                thread::spawn(move || {
                    cancelled.store(false, Ordering::SeqCst);
                    for _ in 0..BATCHES {
                        let ran = !cancelled.load(Ordering::SeqCst);
                        outcomes.lock().unwrap().push(ran);
                    }
                })
            };
            let canceller = {
                let cancelled = cancelled.clone();
                thread::spawn(move || cancelled.store(true, Ordering::SeqCst))
            };

            runner.join().unwrap();
            canceller.join().unwrap();

            let outcomes = outcomes.lock().unwrap();
            assert_eq!(outcomes.len(), BATCHES);
            if let Some(first_skip) = outcomes.iter().position(|ran| !ran) {
                assert!(outcomes[first_skip..].iter().all(|ran| !ran));
            }
        });
    }

    /// A cancel that completed before a run cleared the flag does not leak
    /// into that run.
    ///
    /// 在运行清除标志之前已完成的取消不会影响该运行。
    #[test]
    fn test_earlier_cancel_does_not_leak_into_next_run() {
        run_model(|| {
            let cancelled = Arc::new(AtomicBool::new(false));
            let cancel_done = Arc::new(AtomicBool::new(false));
            let started = Arc::new(AtomicUsize::new(0));

            let canceller = {
                let cancelled = cancelled.clone();
                let cancel_done = cancel_done.clone();
                thread::spawn(move || {
                    cancelled.store(true, Ordering::SeqCst);
                    cancel_done.store(true, Ordering::SeqCst);
                })
            };
            let runner = {
                let cancelled = cancelled.clone();
                let cancel_done = cancel_done.clone();
                let started = started.clone();
                thread::spawn(move || {
                    let earlier = cancel_done.load(Ordering::SeqCst);
                    cancelled.store(false, Ordering::SeqCst);
                    if !cancelled.load(Ordering::SeqCst) {
                        started.fetch_add(1, Ordering::SeqCst);
                    }
                    earlier
                })
            };

            canceller.join().unwrap();
            let earlier = runner.join().unwrap();

            if earlier {
                assert_eq!(started.load(Ordering::SeqCst), 1);
            }
        });
    }
}
