// self
use crate::{_prelude::*, limit::LimiterShared};

/// RAII guard for one unit of admitted capacity.
///
/// Dropping the permit frees its concurrency slot and promotes the longest-waiting caller.
/// The admission itself stays counted in the sliding window until the window moves past it.
pub struct AdmissionPermit {
	shared: Arc<LimiterShared>,
	admitted_at: Instant,
}
impl AdmissionPermit {
	pub(crate) fn new(shared: Arc<LimiterShared>, admitted_at: Instant) -> Self {
		Self { shared, admitted_at }
	}

	/// Instant the slot was granted.
	pub fn admitted_at(&self) -> Instant {
		self.admitted_at
	}

	/// Releases the slot now; equivalent to dropping the permit.
	pub fn release(self) {}
}
impl Drop for AdmissionPermit {
	fn drop(&mut self) {
		self.shared.release();
	}
}
impl Debug for AdmissionPermit {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AdmissionPermit").field("admitted_at", &self.admitted_at).finish()
	}
}
