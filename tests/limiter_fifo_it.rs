// std
use std::sync::atomic::{AtomicUsize, Ordering};
// self
use http_loader::{
	_preludet::*,
	CancellationToken,
	config::RateLimitConfig,
	limit::{AdmissionResult, RateLimiter, RejectReason, Ticket},
};

fn limiter(config: RateLimitConfig) -> RateLimiter {
	RateLimiter::new(config).expect("Limiter configuration should be valid.")
}

fn queued(result: AdmissionResult) -> Ticket {
	match result {
		AdmissionResult::Queued(ticket) => ticket,
		other => panic!("Expected the caller to be queued, got {other:?}."),
	}
}

#[tokio::test]
async fn first_k_callers_are_admitted_and_the_rest_queue_in_order() {
	let limiter = limiter(RateLimitConfig::concurrent(3));
	let results = (0..5).map(|_| limiter.admit()).collect::<Vec<_>>();

	for result in &results[..3] {
		assert!(matches!(result, AdmissionResult::Admitted(_)));
	}

	assert_eq!(results[3].queue_position(), Some(0));
	assert_eq!(results[4].queue_position(), Some(1));
	assert_eq!(limiter.snapshot().in_flight, 3);
	assert_eq!(limiter.snapshot().queued, 2);
}

#[tokio::test]
async fn queued_callers_are_promoted_strictly_in_arrival_order() {
	let limiter = limiter(RateLimitConfig::concurrent(1).with_admission_timeout(None));
	let held = limiter.acquire().await.expect("First caller should be admitted.");
	let order = Arc::new(Mutex::new(Vec::new()));
	let handles = (0..4)
		.map(|id| {
			let ticket = queued(limiter.admit());
			let order = order.clone();

			assert_eq!(ticket.position(), id);

			tokio::spawn(async move {
				let permit = ticket.wait().await.expect("Every waiter should be admitted.");

				order.lock().push(id);
				drop(permit);
			})
		})
		.collect::<Vec<_>>();

	drop(held);

	for handle in handles {
		handle.await.expect("Waiter task should not panic.");
	}

	assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
	assert_eq!(limiter.metrics().admitted(), 5);
}

#[tokio::test]
async fn dropped_tickets_are_never_admitted_and_never_block() {
	let limiter = limiter(RateLimitConfig::concurrent(1));
	let held = limiter.acquire().await.expect("First caller should be admitted.");
	let abandoned = queued(limiter.admit());
	let waiting = queued(limiter.admit());

	assert_eq!(waiting.current_position(), Some(1));

	drop(abandoned);

	assert_eq!(waiting.current_position(), Some(0));

	drop(held);

	let permit = waiting.wait().await.expect("The surviving waiter should be admitted.");

	assert_eq!(limiter.snapshot().in_flight, 1);
	assert_eq!(limiter.metrics().cancelled(), 1);

	drop(permit);
}

#[tokio::test]
async fn a_grant_racing_with_cancellation_is_refunded_to_the_next_waiter() {
	let limiter = limiter(RateLimitConfig::concurrent(1));
	let held = limiter.acquire().await.expect("First caller should be admitted.");
	let first = queued(limiter.admit());
	let second = queued(limiter.admit());

	// Releasing grants the slot to `first` before it ever polls.
	drop(held);

	assert_eq!(first.current_position(), None);

	drop(first);

	let permit = second.wait().await.expect("The refunded slot should reach the next waiter.");

	assert_eq!(limiter.snapshot().in_flight, 1);

	drop(permit);

	assert_eq!(limiter.snapshot().in_flight, 0);
}

#[tokio::test]
async fn cancellation_tokens_withdraw_queued_callers() {
	let limiter = limiter(RateLimitConfig::concurrent(1).with_admission_timeout(None));
	let held = limiter.acquire().await.expect("First caller should be admitted.");
	let cancel = CancellationToken::new();
	let waiter = tokio::spawn({
		let limiter = limiter.clone();
		let cancel = cancel.clone();

		async move { limiter.acquire_or_cancel(&cancel).await }
	});

	while limiter.snapshot().queued == 0 {
		tokio::task::yield_now().await;
	}

	cancel.cancel();

	let result = waiter.await.expect("Waiter task should not panic.");

	assert!(matches!(result, Err(Error::Cancelled)));
	assert_eq!(limiter.snapshot().queued, 0);

	drop(held);

	assert_eq!(limiter.snapshot().in_flight, 0);
	assert!(matches!(limiter.acquire_or_cancel(&cancel).await, Err(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn waiting_past_the_admission_timeout_fails() {
	let limiter = limiter(
		RateLimitConfig::concurrent(1).with_admission_timeout(Some(Duration::from_millis(100))),
	);
	let _held = limiter.acquire().await.expect("First caller should be admitted.");
	let err = limiter.acquire().await.expect_err("The second caller should time out.");

	assert!(err.is_retryable());

	match err {
		Error::Timeout { waited } => assert!(waited >= Duration::from_millis(100)),
		other => panic!("Expected a timeout, got {other:?}."),
	}

	assert_eq!(limiter.snapshot().queued, 0);
	assert_eq!(limiter.metrics().timed_out(), 1);
}

#[tokio::test(start_paused = true)]
async fn window_expiry_admits_a_queued_caller_without_any_release() {
	let limiter = limiter(
		RateLimitConfig::per_window(2, Duration::from_secs(1)).with_admission_timeout(None),
	);
	let started = Instant::now();
	// Keep both permits alive so nothing is ever released.
	let _first = limiter.acquire().await.expect("First caller should be admitted.");
	let _second = limiter.acquire().await.expect("Second caller should be admitted.");
	let third = queued(limiter.admit());
	let _permit = third.wait().await.expect("The window reset should admit the third caller.");
	let elapsed = started.elapsed();

	assert!(elapsed >= Duration::from_secs(1), "Admitted too early: {elapsed:?}.");
	assert!(elapsed < Duration::from_millis(1_100), "Admitted too late: {elapsed:?}.");
	assert_eq!(limiter.snapshot().window_count, 1);
}

#[tokio::test(start_paused = true)]
async fn window_reset_reaches_callers_queued_behind_the_concurrency_ceiling() {
	let limiter = limiter(
		RateLimitConfig::concurrent(1)
			.with_window(2, Duration::from_secs(1))
			.with_admission_timeout(Some(Duration::from_secs(10))),
	);
	let started = Instant::now();
	let first = limiter.acquire().await.expect("First caller should be admitted.");
	// Both callers queue on concurrency while the window still has room.
	let second = queued(limiter.admit());
	let third = tokio::spawn(queued(limiter.admit()).wait());

	tokio::task::yield_now().await;
	drop(first);

	// Promoting the second caller fills the window; releasing it frees concurrency only.
	let second = second.wait().await.expect("Second caller should be promoted.");

	assert_eq!(limiter.snapshot().window_count, 2);

	drop(second);

	let _third = third
		.await
		.expect("Waiter task should not panic.")
		.expect("The window reset should admit the third caller.");
	let elapsed = started.elapsed();

	assert!(elapsed >= Duration::from_secs(1), "Admitted too early: {elapsed:?}.");
	assert!(elapsed < Duration::from_millis(1_100), "Admitted too late: {elapsed:?}.");
	assert_eq!(limiter.metrics().timed_out(), 0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_and_window_ceilings_hold_together() {
	let limiter = limiter(
		RateLimitConfig::concurrent(2)
			.with_window(3, Duration::from_secs(1))
			.with_admission_timeout(None),
	);
	let active = Arc::new(AtomicUsize::new(0));
	let peak = Arc::new(AtomicUsize::new(0));
	let admitted = Arc::new(Mutex::new(Vec::new()));
	let handles = (0..9)
		.map(|_| {
			let limiter = limiter.clone();
			let active = active.clone();
			let peak = peak.clone();
			let admitted = admitted.clone();

			tokio::spawn(async move {
				let permit = limiter.acquire().await.expect("Every caller should be admitted.");
				let now = active.fetch_add(1, Ordering::SeqCst) + 1;

				peak.fetch_max(now, Ordering::SeqCst);
				admitted.lock().push(permit.admitted_at());
				tokio::time::sleep(Duration::from_millis(100)).await;
				active.fetch_sub(1, Ordering::SeqCst);
				drop(permit);
			})
		})
		.collect::<Vec<_>>();

	for handle in handles {
		handle.await.expect("Caller task should not panic.");
	}

	let mut admitted = admitted.lock().clone();

	admitted.sort();

	assert_eq!(admitted.len(), 9);
	assert_eq!(peak.load(Ordering::SeqCst), 2);

	for (idx, at) in admitted.iter().enumerate() {
		let in_window =
			admitted[idx..].iter().filter(|later| **later - *at < Duration::from_secs(1)).count();

		assert!(in_window <= 3, "{in_window} admissions within one window starting at {at:?}.");
	}

	assert!(admitted[8] - admitted[0] >= Duration::from_secs(2));
	assert_eq!(limiter.snapshot().in_flight, 0);
}

#[tokio::test]
async fn shutdown_fails_waiters_and_rejects_new_callers() {
	let limiter = limiter(RateLimitConfig::concurrent(2));
	let _a = limiter.acquire().await.expect("Caller should be admitted.");
	let _b = limiter.acquire().await.expect("Caller should be admitted.");
	let ticket = queued(limiter.admit());

	limiter.shutdown();

	assert!(matches!(ticket.wait().await, Err(Error::ServiceTornDown)));
	assert!(matches!(limiter.admit(), AdmissionResult::Rejected(RejectReason::ServiceTornDown)));
}
