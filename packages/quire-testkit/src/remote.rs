use std::{
	collections::{HashMap, VecDeque},
	sync::{
		Mutex,
		atomic::{AtomicBool, Ordering},
	},
};

use tokio::sync::Notify;

use quire_domain::outbox::{NoteDraft, NoteMove, NotePatch, ThreadPatch};
use quire_providers::{
	BoxFuture, Error as ProviderError, RemoteNotes, Result as ProviderResult,
	remote::{NoteListing, RemoteNote},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteCall {
	ListNotes { cursor: Option<String> },
	CreateNote { id: String },
	UpdateNote { id: String },
	MoveNote { id: String, folder_id: Option<String> },
	DeleteNote { id: String },
	UpdateThread { id: String, title: String },
	DeleteThread { id: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FakeFailure {
	Network,
	Status(u16),
}
impl FakeFailure {
	fn to_error(self) -> ProviderError {
		match self {
			Self::Network => ProviderError::Network { message: "connection reset".to_string() },
			Self::Status(status) => ProviderError::from_status(status, "scripted failure"),
		}
	}
}

/// In-memory stand-in for the notes server. Records every call and fails on demand.
#[derive(Default)]
pub struct FakeRemote {
	calls: Mutex<Vec<RemoteCall>>,
	listing: Mutex<NoteListing>,
	listing_failure: Mutex<Option<FakeFailure>>,
	scripted: Mutex<HashMap<String, VecDeque<FakeFailure>>>,
	persistent: Mutex<HashMap<String, FakeFailure>>,
	listing_blocked: AtomicBool,
	listing_started: Notify,
	listing_release: Notify,
	mutation_held: AtomicBool,
	mutation_started: Notify,
	mutation_release: Notify,
}
impl FakeRemote {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_listing(&self, notes: Vec<RemoteNote>, next_cursor: Option<&str>) {
		*self.listing.lock().unwrap_or_else(|err| err.into_inner()) =
			NoteListing { notes, next_cursor: next_cursor.map(str::to_string) };
	}

	pub fn fail_listing(&self, failure: Option<FakeFailure>) {
		*self.listing_failure.lock().unwrap_or_else(|err| err.into_inner()) = failure;
	}

	/// Fails the next call touching `entity_id` once per queued failure.
	pub fn fail_next(&self, entity_id: &str, failure: FakeFailure) {
		self.scripted
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.entry(entity_id.to_string())
			.or_default()
			.push_back(failure);
	}

	/// Fails every call touching `entity_id` until [`FakeRemote::heal`].
	pub fn fail_always(&self, entity_id: &str, failure: FakeFailure) {
		self.persistent
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.insert(entity_id.to_string(), failure);
	}

	pub fn heal(&self, entity_id: &str) {
		self.persistent.lock().unwrap_or_else(|err| err.into_inner()).remove(entity_id);
	}

	/// Makes `list_notes` park until [`FakeRemote::release_listing`].
	pub fn block_listing(&self) {
		self.listing_blocked.store(true, Ordering::SeqCst);
	}

	/// Resolves once a blocked `list_notes` call is parked.
	pub async fn listing_parked(&self) {
		self.listing_started.notified().await;
	}

	pub fn release_listing(&self) {
		self.listing_blocked.store(false, Ordering::SeqCst);
		self.listing_release.notify_one();
	}

	/// Makes the next mutating call park until [`FakeRemote::release_mutation`]. Later calls go
	/// through.
	pub fn hold_next_mutation(&self) {
		self.mutation_held.store(true, Ordering::SeqCst);
	}

	pub async fn mutation_parked(&self) {
		self.mutation_started.notified().await;
	}

	pub fn release_mutation(&self) {
		self.mutation_release.notify_one();
	}

	pub fn calls(&self) -> Vec<RemoteCall> {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	/// Calls that changed server state, in order.
	pub fn mutations(&self) -> Vec<RemoteCall> {
		self.calls()
			.into_iter()
			.filter(|call| !matches!(call, RemoteCall::ListNotes { .. }))
			.collect()
	}

	fn record(&self, call: RemoteCall) {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).push(call);
	}

	fn outcome(&self, entity_id: &str) -> ProviderResult<()> {
		if let Some(failure) = self
			.scripted
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.get_mut(entity_id)
			.and_then(VecDeque::pop_front)
		{
			return Err(failure.to_error());
		}
		if let Some(failure) =
			self.persistent.lock().unwrap_or_else(|err| err.into_inner()).get(entity_id).copied()
		{
			return Err(failure.to_error());
		}

		Ok(())
	}

	async fn list(&self, cursor: Option<&str>) -> ProviderResult<NoteListing> {
		self.record(RemoteCall::ListNotes { cursor: cursor.map(str::to_string) });

		if self.listing_blocked.load(Ordering::SeqCst) {
			self.listing_started.notify_one();
			self.listing_release.notified().await;
		}
		if let Some(failure) = *self.listing_failure.lock().unwrap_or_else(|err| err.into_inner()) {
			return Err(failure.to_error());
		}

		Ok(self.listing.lock().unwrap_or_else(|err| err.into_inner()).clone())
	}

	async fn mutate(&self, entity_id: &str, call: RemoteCall) -> ProviderResult<()> {
		self.record(call);

		if self.mutation_held.swap(false, Ordering::SeqCst) {
			self.mutation_started.notify_one();
			self.mutation_release.notified().await;
		}

		self.outcome(entity_id)
	}
}
impl RemoteNotes for FakeRemote {
	fn list_notes<'a>(
		&'a self,
		cursor: Option<&'a str>,
	) -> BoxFuture<'a, ProviderResult<NoteListing>> {
		Box::pin(self.list(cursor))
	}

	fn create_note<'a>(&'a self, draft: &'a NoteDraft) -> BoxFuture<'a, ProviderResult<()>> {
		Box::pin(self.mutate(&draft.id, RemoteCall::CreateNote { id: draft.id.clone() }))
	}

	fn update_note<'a>(
		&'a self,
		id: &'a str,
		_patch: &'a NotePatch,
	) -> BoxFuture<'a, ProviderResult<()>> {
		Box::pin(self.mutate(id, RemoteCall::UpdateNote { id: id.to_string() }))
	}

	fn move_note<'a>(
		&'a self,
		id: &'a str,
		dest: &'a NoteMove,
	) -> BoxFuture<'a, ProviderResult<()>> {
		let call = RemoteCall::MoveNote { id: id.to_string(), folder_id: dest.folder_id.clone() };

		Box::pin(self.mutate(id, call))
	}

	fn delete_note<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
		Box::pin(self.mutate(id, RemoteCall::DeleteNote { id: id.to_string() }))
	}

	fn update_thread<'a>(
		&'a self,
		id: &'a str,
		patch: &'a ThreadPatch,
	) -> BoxFuture<'a, ProviderResult<()>> {
		let call = RemoteCall::UpdateThread { id: id.to_string(), title: patch.title.clone() };

		Box::pin(self.mutate(id, call))
	}

	fn delete_thread<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ProviderResult<()>> {
		Box::pin(self.mutate(id, RemoteCall::DeleteThread { id: id.to_string() }))
	}
}
