// SPDX-License-Identifier: Apache-2.0

//! Scoped cancellation and the deadline watchdog.
//!
//! A [`CancelScope`] bounds a region of work with an optional deadline.
//! Scopes nest per thread; the innermost scope is the *ambient* scope that
//! blocking stream operations consult. An [`AsyncTimeout`] arms one blocking
//! operation at a time: [`enter`](AsyncTimeout::enter) registers the
//! operation's effective deadline with a single process-wide watchdog thread,
//! and the returned guard's [`exit`](TimeoutNode::exit) reports whether the
//! watchdog fired while the operation was in flight.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use once_cell::sync::Lazy;
use crate::streams::{Error, OperationKind, Result};

/// How long the watchdog thread lingers on an empty queue before exiting.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

thread_local! {
	static AMBIENT: RefCell<Vec<Arc<ScopeInner>>> = RefCell::new(Vec::new());
}

pub(crate) struct ScopeInner {
	/// The effective deadline: the scope's own deadline bounded by every
	/// ancestor's.
	deadline: Option<Instant>,
	cancelled: AtomicBool,
	parent: Option<Arc<ScopeInner>>,
}

impl ScopeInner {
	fn is_cancelled(&self) -> bool {
		if self.cancelled.load(Ordering::Relaxed) { return true }
		if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
			return true
		}
		self.parent.as_deref().is_some_and(Self::is_cancelled)
	}
}

/// A nested cancellation scope carrying an optional deadline. Cancellation is
/// monotonic: once cancelled, a scope stays cancelled, and cancelling a scope
/// cancels all of its descendants.
///
/// The handle is cheaply cloneable; cancelling from another thread is done by
/// cloning the scope out of the body and calling [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct CancelScope {
	inner: Arc<ScopeInner>,
}

impl CancelScope {
	/// Opens a new scope, installs it as the current thread's innermost scope
	/// for the duration of `body`, and removes it on every exit path. The
	/// scope's effective deadline is `timeout` from now, bounded by the
	/// enclosing scope's deadline.
	pub fn run<T>(timeout: Option<Duration>, body: impl FnOnce(&CancelScope) -> T) -> T {
		let parent = ambient();
		let own = timeout.map(|t| Instant::now() + t);
		let deadline = match (own, parent.as_ref().and_then(|p| p.deadline)) {
			(Some(a), Some(b)) => Some(a.min(b)),
			(a, b) => a.or(b),
		};

		let scope = Self {
			inner: Arc::new(ScopeInner {
				deadline,
				cancelled: AtomicBool::new(false),
				parent,
			}),
		};

		let _guard = AmbientGuard::install(scope.inner.clone());
		body(&scope)
	}

	/// Like [`run`], but for fallible bodies: fails with a cancellation error
	/// when the scope is already cancelled on entry, or became cancelled by
	/// the time the body returned.
	///
	/// [`run`]: Self::run
	pub fn call<T>(
		timeout: Option<Duration>,
		body: impl FnOnce(&CancelScope) -> Result<T>
	) -> Result<T> {
		Self::run(timeout, |scope| {
			if scope.is_cancelled() {
				return Err(Error::cancelled(OperationKind::Unknown))
			}
			let value = body(scope)?;
			if scope.is_cancelled() {
				return Err(Error::cancelled(OperationKind::Unknown))
			}
			Ok(value)
		})
	}

	/// Cancels the scope and all of its descendants.
	pub fn cancel(&self) {
		self.inner.cancelled.store(true, Ordering::Relaxed);
	}

	/// Returns `true` once the scope is cancelled: explicitly, by its
	/// deadline passing, or by an ancestor's cancellation.
	pub fn is_cancelled(&self) -> bool {
		self.inner.is_cancelled()
	}

	/// Returns the scope's effective deadline.
	pub fn deadline(&self) -> Option<Instant> {
		self.inner.deadline
	}
}

fn ambient() -> Option<Arc<ScopeInner>> {
	AMBIENT.with(|stack| stack.borrow().last().cloned())
}

/// Returns `true` if the current thread's innermost scope is cancelled.
pub(crate) fn ambient_cancelled() -> bool {
	ambient().is_some_and(|scope| scope.is_cancelled())
}

struct AmbientGuard;

impl AmbientGuard {
	fn install(scope: Arc<ScopeInner>) -> Self {
		AMBIENT.with(|stack| stack.borrow_mut().push(scope));
		Self
	}
}

impl Drop for AmbientGuard {
	fn drop(&mut self) {
		AMBIENT.with(|stack| { stack.borrow_mut().pop(); });
	}
}

struct Node {
	deadline: Instant,
	fired: AtomicBool,
	callback: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// A watchdog registration arming a single blocking operation. Owned by the
/// subsystem performing the operation (a buffered stream, a socket); the
/// optional callback is the transport-specific interrupt that unblocks the
/// operation in flight.
///
/// Entering is re-entrant across iterations of a loop, but overlapping use of
/// one timeout is a contract violation and panics.
#[derive(Default)]
pub struct AsyncTimeout {
	callback: Option<Arc<dyn Fn() + Send + Sync>>,
	entered: Cell<bool>,
}

impl AsyncTimeout {
	pub fn new() -> Self { Self::default() }

	/// Creates a timeout whose watchdog callback interrupts the transport.
	pub fn with_callback(callback: impl Fn() + Send + Sync + 'static) -> Self {
		Self {
			callback: Some(Arc::new(callback)),
			entered: Cell::new(false),
		}
	}

	/// Arms the watchdog for one blocking operation. The effective deadline
	/// is the earliest of the ambient scope's deadline and `default_timeout`
	/// from now; a zero `default_timeout` means no default. When neither
	/// applies, no registration occurs and a no-op guard is returned.
	pub fn enter(&self, default_timeout: Duration) -> TimeoutNode<'_> {
		self.enter_with_deadline(None, default_timeout)
	}

	/// Arms the watchdog like [`enter`](Self::enter), additionally bounded by
	/// an explicit per-call `deadline`.
	pub fn enter_with_deadline(
		&self,
		deadline: Option<Instant>,
		default_timeout: Duration
	) -> TimeoutNode<'_> {
		assert!(
			!self.entered.replace(true),
			"overlapping enter on the same timeout"
		);

		let effective = [
			ambient().and_then(|scope| scope.deadline),
			(!default_timeout.is_zero()).then(|| Instant::now() + default_timeout),
			deadline,
		]
		.into_iter()
		.flatten()
		.min();

		let node = effective.map(|deadline| {
			let node = Arc::new(Node {
				deadline,
				fired: AtomicBool::new(false),
				callback: self.callback.clone(),
			});
			WATCHDOG.insert(node.clone());
			node
		});

		TimeoutNode {
			timeout: self,
			node,
			exited: false,
		}
	}
}

/// The guard for one armed operation. Dropping the guard deregisters it, so
/// the registration unwinds on every exit path; call
/// [`exit`](Self::exit) to also learn whether the watchdog fired.
pub struct TimeoutNode<'t> {
	timeout: &'t AsyncTimeout,
	node: Option<Arc<Node>>,
	exited: bool,
}

impl TimeoutNode<'_> {
	/// Deregisters the operation, returning `true` iff the watchdog fired its
	/// callback while the operation was armed.
	pub fn exit(mut self) -> bool {
		self.finish()
	}

	fn finish(&mut self) -> bool {
		if self.exited { return false }
		self.exited = true;
		self.timeout.entered.set(false);

		match self.node.take() {
			None => false,
			Some(node) => WATCHDOG.remove(&node),
		}
	}
}

impl Drop for TimeoutNode<'_> {
	fn drop(&mut self) {
		self.finish();
	}
}

static WATCHDOG: Lazy<Watchdog> = Lazy::new(Watchdog::default);

#[derive(Default)]
struct Watchdog {
	state: Mutex<WatchState>,
	wake: Condvar,
}

#[derive(Default)]
struct WatchState {
	/// Pending nodes, ordered by ascending deadline.
	queue: Vec<Arc<Node>>,
	running: bool,
}

impl Watchdog {
	fn insert(&self, node: Arc<Node>) {
		let mut state = self.lock();
		let at = state.queue
			.binary_search_by_key(&Reverse(node.deadline), |n| Reverse(n.deadline))
			.map_or_else(|i| i, |i| i);
		// Reverse ordering keeps equal deadlines FIFO while Vec::pop stays
		// cheap from the back; the head is the *last* element.
		state.queue.insert(at, node);

		let head_changed = at == state.queue.len() - 1;
		if !state.running {
			state.running = true;
			drop(state);
			thread::Builder::new()
				.name("rayo-watchdog".into())
				.spawn(|| WATCHDOG.run())
				.expect("failed to spawn the watchdog thread");
			log::trace!("watchdog thread started");
		} else if head_changed {
			self.wake.notify_one();
		}
	}

	fn remove(&self, node: &Arc<Node>) -> bool {
		let mut state = self.lock();
		if let Some(at) = state.queue.iter().position(|n| Arc::ptr_eq(n, node)) {
			state.queue.remove(at);
		}
		node.fired.load(Ordering::Acquire)
	}

	fn run(&self) {
		let mut state = self.lock();
		loop {
			let Some(head) = state.queue.last().cloned() else {
				let (next, timed_out) = self.wake
					.wait_timeout(state, IDLE_TIMEOUT)
					.unwrap_or_else(PoisonError::into_inner);
				state = next;
				if timed_out.timed_out() && state.queue.is_empty() {
					state.running = false;
					log::trace!("watchdog thread idle, exiting");
					return
				}
				continue
			};

			let now = Instant::now();
			if head.deadline <= now {
				state.queue.pop();
				head.fired.store(true, Ordering::Release);
				drop(state);

				// The callback only interrupts the in-flight call; the
				// armed operation reports cancellation via its exit guard.
				log::trace!("watchdog fired");
				if let Some(callback) = &head.callback {
					callback();
				}

				state = self.lock();
			} else {
				let (next, _) = self.wake
					.wait_timeout(state, head.deadline - now)
					.unwrap_or_else(PoisonError::into_inner);
				state = next;
			}
		}
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, WatchState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

#[cfg(test)]
mod test {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::thread::sleep;
	use std::time::{Duration, Instant};
	use super::{AsyncTimeout, CancelScope};

	#[test]
	fn nested_deadline_takes_minimum() {
		CancelScope::run(Some(Duration::from_millis(50)), |outer| {
			let outer_deadline = outer.deadline().unwrap();
			CancelScope::run(Some(Duration::from_secs(10)), |inner| {
				assert_eq!(
					inner.deadline().unwrap(), outer_deadline,
					"child deadline should not exceed the parent's"
				);
			});
			CancelScope::run(Some(Duration::from_millis(1)), |inner| {
				assert!(inner.deadline().unwrap() < outer_deadline);
			});
		});
	}

	#[test]
	fn cancel_propagates_to_descendants() {
		CancelScope::run(None, |outer| {
			CancelScope::run(None, |inner| {
				assert!(!inner.is_cancelled());
				outer.cancel();
				assert!(inner.is_cancelled(), "parent cancel should reach the child");
			});
		});
	}

	#[test]
	fn watchdog_fires_after_deadline() {
		CancelScope::run(Some(Duration::from_millis(25)), |_| {
			let timeout = AsyncTimeout::new();
			let node = timeout.enter(Duration::ZERO);
			sleep(Duration::from_millis(50));
			assert!(node.exit(), "watchdog should have fired");
		});
	}

	#[test]
	fn watchdog_spares_fast_operations() {
		CancelScope::run(Some(Duration::from_millis(50)), |_| {
			let timeout = AsyncTimeout::new();
			let node = timeout.enter(Duration::ZERO);
			sleep(Duration::from_millis(5));
			assert!(!node.exit(), "watchdog should not have fired");
		});
	}

	#[test]
	fn callback_runs_once_per_enter() {
		let count = Arc::new(AtomicUsize::new(0));
		let counted = count.clone();
		let timeout = AsyncTimeout::with_callback(move || {
			counted.fetch_add(1, Ordering::SeqCst);
		});

		let node = timeout.enter(Duration::from_millis(10));
		sleep(Duration::from_millis(60));
		assert!(node.exit());
		assert_eq!(count.load(Ordering::SeqCst), 1);

		// Re-entry after exit is allowed and arms a fresh registration.
		let node = timeout.enter(Duration::from_millis(10));
		assert!(!node.exit());
		assert_eq!(count.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn no_deadline_means_no_registration() {
		let timeout = AsyncTimeout::new();
		let node = timeout.enter(Duration::ZERO);
		assert!(!node.exit());
	}

	#[test]
	#[should_panic(expected = "overlapping enter")]
	fn overlapping_enter_panics() {
		let timeout = AsyncTimeout::new();
		let _a = timeout.enter(Duration::from_secs(1));
		let _b = timeout.enter(Duration::from_secs(1));
	}

	#[test]
	fn guard_drop_deregisters() {
		let deadline = Instant::now() + Duration::from_millis(10);
		let timeout = AsyncTimeout::new();
		{
			let _node = timeout.enter_with_deadline(Some(deadline), Duration::ZERO);
		}
		// The drop released the entered flag; re-entry must not panic.
		let node = timeout.enter(Duration::ZERO);
		assert!(!node.exit());
	}
}
