//! Per-principal refresh leases shared by every flow.

// crates.io
use async_lock::MutexGuardArc;
// self
use crate::{_prelude::*, auth::PrincipalId};

type LeaseSlots = Arc<Mutex<HashMap<PrincipalId, LeaseSlot>>>;

struct LeaseSlot {
	lock: Arc<AsyncMutex<()>>,
	// Holders plus waiters; the slot is removed when this drops to zero.
	users: usize,
}

/// Map from principal to the async mutex serializing its refreshes.
///
/// Entries exist only while someone holds or waits for a lease, so the table never grows
/// beyond the number of principals with in-flight refreshes. The table mutex is held for map
/// operations only, never across `.await`.
#[derive(Clone, Default)]
pub struct LeaseTable {
	slots: LeaseSlots,
}
impl LeaseTable {
	/// Waits for the principal's lease.
	///
	/// Leases for different principals never block each other. Dropping the returned value (or
	/// the pending future) releases the caller's claim.
	pub async fn acquire(&self, principal: &PrincipalId) -> RefreshLease {
		let lock = {
			let mut slots = self.slots.lock();
			let slot = slots
				.entry(principal.clone())
				.or_insert_with(|| LeaseSlot { lock: Arc::new(AsyncMutex::new(())), users: 0 });

			slot.users += 1;

			slot.lock.clone()
		};
		let mut lease =
			RefreshLease { slots: self.slots.clone(), principal: principal.clone(), guard: None };

		lease.guard = Some(lock.lock_arc().await);

		lease
	}

	/// Number of principals with a held or awaited lease.
	pub fn len(&self) -> usize {
		self.slots.lock().len()
	}

	/// Returns true when no lease is held or awaited.
	pub fn is_empty(&self) -> bool {
		self.slots.lock().is_empty()
	}
}
impl Debug for LeaseTable {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("LeaseTable").field("active", &self.len()).finish()
	}
}

/// Exclusive right to refresh one principal's credential.
pub struct RefreshLease {
	slots: LeaseSlots,
	principal: PrincipalId,
	guard: Option<MutexGuardArc<()>>,
}
impl Debug for RefreshLease {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshLease")
			.field("principal", &self.principal)
			.field("held", &self.guard.is_some())
			.finish()
	}
}
impl Drop for RefreshLease {
	fn drop(&mut self) {
		drop(self.guard.take());

		let mut slots = self.slots.lock();

		if let Some(slot) = slots.get_mut(&self.principal) {
			slot.users = slot.users.saturating_sub(1);

			if slot.users == 0 {
				slots.remove(&self.principal);
			}
		}
	}
}
