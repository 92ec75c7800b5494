// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::sleep;
use std::time::Duration;
use rayo::{AsyncTimeout, Buffer, CancelScope};
use rayo::pool::Pool;
use rayo::streams::{BufSink, BufSource, Result, Source, SourceBuffer};

/// A transport double that dawdles before producing each byte.
struct SlowSource {
	delay: Duration,
	reads: Arc<AtomicUsize>,
}

impl SlowSource {
	fn new(delay: Duration) -> Self {
		Self {
			delay,
			reads: Arc::new(AtomicUsize::new(0)),
		}
	}
}

impl Source for SlowSource {
	fn read(&mut self, sink: &mut Buffer<impl Pool>, _count: usize) -> Result<usize> {
		self.reads.fetch_add(1, Ordering::SeqCst);
		sleep(self.delay);
		sink.write_u8(b'x')?;
		Ok(1)
	}
}

#[test]
fn expired_deadline_cancels_a_slow_read() {
	CancelScope::run(Some(Duration::from_millis(25)), |_| {
		let mut reader = SlowSource::new(Duration::from_millis(80)).buffer();
		let error = reader.read_u8().unwrap_err();
		assert!(error.is_cancelled(), "expected cancellation, got {error}");
	});
}

#[test]
fn fast_reads_pass_under_a_deadline() {
	CancelScope::run(Some(Duration::from_millis(500)), |_| {
		let mut reader = SlowSource::new(Duration::from_millis(5)).buffer();
		assert_eq!(reader.read_u8().unwrap(), b'x');
	});
}

#[test]
fn cancelled_scope_blocks_io_before_it_starts() {
	CancelScope::run(None, |scope| {
		scope.cancel();

		let source = SlowSource::new(Duration::ZERO);
		let reads = source.reads.clone();
		let mut reader = source.buffer();

		let error = reader.read_u8().unwrap_err();
		assert!(error.is_cancelled());
		assert_eq!(
			reads.load(Ordering::SeqCst), 0,
			"a cancelled scope must not initiate further work"
		);
	});
}

#[test]
fn nested_scope_inherits_the_tighter_deadline() {
	CancelScope::run(Some(Duration::from_millis(25)), |_| {
		CancelScope::run(Some(Duration::from_secs(10)), |_| {
			let mut reader = SlowSource::new(Duration::from_millis(80)).buffer();
			let error = reader.read_u8().unwrap_err();
			assert!(error.is_cancelled(), "parent deadline must bound the child");
		});
	});
}

#[test]
fn default_timeout_cancels_only_the_armed_read() {
	CancelScope::run(None, |scope| {
		let source = SlowSource::new(Duration::from_millis(60));
		let mut reader = source.buffer();
		reader.set_default_timeout(Duration::from_millis(15));

		let error = reader.read_u8().unwrap_err();
		assert!(error.is_cancelled());
		assert!(
			!scope.is_cancelled(),
			"a per-read default timeout must not cancel the enclosing scope"
		);

		// The interrupted fill still delivered its byte; a later, independent
		// read in the same scope proceeds normally.
		assert_eq!(reader.read_u8().unwrap(), b'x');
	});
}

#[test]
fn scope_deadline_fires_the_watchdog_once() {
	CancelScope::run(Some(Duration::from_millis(20)), |_| {
		let timeout = AsyncTimeout::new();

		let node = timeout.enter(Duration::ZERO);
		sleep(Duration::from_millis(60));
		assert!(node.exit(), "the watchdog should have fired");

		// The scope stays cancelled, but the fired node is spent: a fresh
		// enter registers (and fires) independently.
		let node = timeout.enter(Duration::ZERO);
		sleep(Duration::from_millis(5));
		assert!(node.exit(), "the scope deadline is already past");
	});
}

#[test]
fn call_reports_cancellation() {
	let result: rayo::streams::Result<()> =
		CancelScope::call(Some(Duration::from_millis(10)), |_| {
			sleep(Duration::from_millis(40));
			Ok(())
		});
	assert!(result.unwrap_err().is_cancelled());

	let value = CancelScope::call(None, |_| Ok(7)).unwrap();
	assert_eq!(value, 7);
}

#[test]
fn explicit_cancel_reaches_other_threads() {
	let handoff = std::sync::mpsc::channel();
	let (send, recv) = handoff;

	let worker = std::thread::spawn(move || {
		CancelScope::run(None, |scope| {
			send.send(scope.clone()).unwrap();
			while !scope.is_cancelled() {
				sleep(Duration::from_millis(1));
			}
			true
		})
	});

	let scope = recv.recv().unwrap();
	scope.cancel();
	assert!(worker.join().unwrap(), "the worker should observe the cancel");
}
