use quire_domain::{
	backoff::BackoffPolicy,
	outbox::{
		Attention, NoteDraft, NoteMove, NotePatch, OpPayload, OpStatus, OutboxOp, ThreadPatch,
	},
};
use quire_storage::{
	Error,
	db::Db,
	outbox::{self, Coalesced},
};

async fn db() -> Db {
	quire_testkit::test_db().await.expect("Failed to open test database.")
}

fn create(id: &str) -> OpPayload {
	OpPayload::NoteCreate(NoteDraft {
		id: id.to_string(),
		title: "Draft".to_string(),
		content: "Draft".to_string(),
		folder_id: None,
	})
}

fn update(content: &str) -> OpPayload {
	OpPayload::NoteUpdate(NotePatch { title: None, content: Some(content.to_string()) })
}

async fn enqueue(db: &Db, op_id: &str, entity_id: &str, payload: OpPayload, now: i64) {
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::enqueue(tx.conn(), &OutboxOp::new(op_id, entity_id, payload, now))
		.await
		.expect("Failed to enqueue.");
	tx.commit().await.expect("Failed to commit.");
}

async fn claim(db: &Db, now: i64) -> Option<OutboxOp> {
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let op = outbox::claim_next(tx.conn(), now).await.expect("Failed to claim.");

	tx.commit().await.expect("Failed to commit.");

	op
}

#[tokio::test]
async fn duplicate_op_id_is_rejected() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;

	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let err = outbox::enqueue(tx.conn(), &OutboxOp::new("op-1", "n2", update("x"), 0))
		.await
		.expect_err("Expected a duplicate op id to fail.");

	assert!(matches!(err, Error::DuplicateOp(ref op_id) if op_id == "op-1"));
}

#[tokio::test]
async fn invalid_payload_never_reaches_the_table() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let err = outbox::enqueue(tx.conn(), &OutboxOp::new("op-1", "n1", create("other"), 0))
		.await
		.expect_err("Expected a mismatched draft to fail.");

	assert!(matches!(err, Error::Domain(_)));
	assert!(outbox::list_all(tx.conn()).await.expect("list").is_empty());
}

#[tokio::test]
async fn enqueue_forces_a_fresh_pending_state() {
	let db = db().await;
	let mut op = OutboxOp::new("op-1", "n1", create("n1"), 10);

	op.status = OpStatus::Processing;
	op.retry_count = 4;
	op.attention = Some(Attention::Rejected);

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::enqueue(tx.conn(), &op).await.expect("Failed to enqueue.");

	let stored = outbox::get(tx.conn(), "op-1").await.expect("get").expect("missing op");

	assert_eq!(stored.status, OpStatus::Pending);
	assert_eq!(stored.retry_count, 0);
	assert_eq!(stored.attention, None);
}

#[tokio::test]
async fn one_op_per_entity_is_in_flight() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	enqueue(&db, "op-2", "n1", update("second"), 0).await;
	enqueue(&db, "op-3", "n2", create("n2"), 0).await;

	let first = claim(&db, 100).await.expect("Expected a claim.");
	let second = claim(&db, 100).await.expect("Expected a claim.");

	assert_eq!(first.op_id, "op-1");
	assert_eq!(first.status, OpStatus::Processing);
	assert_eq!(second.op_id, "op-3");
	assert!(claim(&db, 100).await.is_none(), "n1 already has an op in flight");

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::complete(tx.conn(), "op-1").await.expect("Failed to complete.");
	tx.commit().await.expect("Failed to commit.");

	assert_eq!(claim(&db, 100).await.map(|op| op.op_id), Some("op-2".to_string()));
}

#[tokio::test]
async fn later_ops_wait_behind_a_backed_off_sibling() {
	let db = db().await;
	let policy = BackoffPolicy::default();

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	enqueue(&db, "op-2", "n1", OpPayload::NoteMove(NoteMove { folder_id: None }), 0).await;

	let claimed = claim(&db, 0).await.expect("Expected a claim.");
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::fail(tx.conn(), &claimed.op_id, "boom", 0, &policy).await.expect("Failed to fail.");
	tx.commit().await.expect("Failed to commit.");

	assert!(claim(&db, 1_000).await.is_none(), "the move must not overtake the create");
	assert_eq!(claim(&db, 3_000).await.map(|op| op.op_id), Some("op-1".to_string()));
}

#[tokio::test]
async fn sixth_failure_flags_the_op() {
	let db = db().await;
	let policy = BackoffPolicy::default();
	let mut now = 0;
	let mut previous_next = 0;

	enqueue(&db, "op-1", "n1", create("n1"), now).await;

	for attempt in 1..=6 {
		let claimed = claim(&db, now).await.expect("Expected the op to be due.");
		let mut tx = db.begin_write().await.expect("Failed to begin.");
		let failed = outbox::fail(tx.conn(), &claimed.op_id, "HTTP 503", now, &policy)
			.await
			.expect("Failed to record failure.");

		tx.commit().await.expect("Failed to commit.");

		assert_eq!(failed.retry_count, attempt);
		assert_eq!(failed.status, OpStatus::Pending);
		assert!(failed.next_retry_at >= previous_next, "next_retry_at moved backwards");
		assert_eq!(failed.next_retry_at - now, policy.delay_for(attempt));

		if attempt < 6 {
			assert_eq!(failed.attention, None, "attempt {attempt} flagged too early");
		} else {
			assert_eq!(failed.attention, Some(Attention::RetriesExhausted));
			assert_eq!(failed.last_error.as_deref(), Some("HTTP 503"));
		}

		previous_next = failed.next_retry_at;
		now = failed.next_retry_at;
	}

	assert!(claim(&db, i64::MAX / 2).await.is_none(), "flagged ops are never auto-claimed");

	let mut conn = db.acquire().await.expect("Failed to acquire.");
	let flagged = outbox::list_attention(&mut conn).await.expect("Failed to list.");

	assert_eq!(flagged.len(), 1);
	assert_eq!(flagged[0].op_id, "op-1");
}

#[tokio::test]
async fn rejected_op_is_flagged_immediately() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;

	let claimed = claim(&db, 0).await.expect("Expected a claim.");
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let rejected =
		outbox::reject(tx.conn(), &claimed.op_id, "HTTP 403", 5).await.expect("Failed to reject.");

	assert_eq!(rejected.attention, Some(Attention::Rejected));
	assert_eq!(rejected.retry_count, 0);
	assert!(outbox::claim_next(tx.conn(), i64::MAX / 2).await.expect("claim").is_none());
}

#[tokio::test]
async fn undecodable_op_is_flagged_and_skipped() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	enqueue(&db, "op-2", "n2", create("n2"), 0).await;

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	sqlx::query("UPDATE outbox SET payload = '{\"type\":\"note.bogus\"}' WHERE op_id = 'op-1'")
		.execute(tx.conn())
		.await
		.expect("Failed to corrupt payload.");
	tx.commit().await.expect("Failed to commit.");

	let claimed = claim(&db, 10).await.expect("Expected the healthy op to be claimed.");

	assert_eq!(claimed.op_id, "op-2");
	assert!(claim(&db, i64::MAX / 2).await.is_none(), "flagged ops are never auto-claimed");

	let mut conn = db.acquire().await.expect("Failed to acquire.");
	let (status, attention): (String, Option<String>) =
		sqlx::query_as("SELECT status, attention FROM outbox WHERE op_id = 'op-1'")
			.fetch_one(&mut *conn)
			.await
			.expect("Failed to read flagged row.");

	assert_eq!(status, "pending");
	assert_eq!(attention.as_deref(), Some(Attention::Corrupt.as_str()));

	let stats = outbox::stats(&mut conn).await.expect("Failed to read stats.");

	assert_eq!((stats.processing, stats.attention), (1, 1));
	assert!(outbox::list_attention(&mut conn).await.expect("Failed to list.").is_empty());

	drop(conn);

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::discard(tx.conn(), "op-1").await.expect("Failed to discard.");
	tx.commit().await.expect("Failed to commit.");
}

#[tokio::test]
async fn retry_and_discard_resolve_flagged_ops() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	enqueue(&db, "op-2", "n2", create("n2"), 0).await;

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::reject(tx.conn(), "op-1", "HTTP 401", 0).await.expect("reject");
	outbox::reject(tx.conn(), "op-2", "HTTP 401", 0).await.expect("reject");

	let retried = outbox::retry(tx.conn(), "op-1", 50).await.expect("Failed to retry.");

	assert_eq!(retried.attention, None);
	assert_eq!(retried.next_retry_at, 50);

	outbox::discard(tx.conn(), "op-2").await.expect("Failed to discard.");

	assert!(outbox::get(tx.conn(), "op-2").await.expect("get").is_none());
	assert!(matches!(outbox::discard(tx.conn(), "op-2").await, Err(Error::NotFound(_))));
	assert_eq!(
		outbox::claim_next(tx.conn(), 50).await.expect("claim").map(|op| op.op_id),
		Some("op-1".to_string())
	);
	assert!(matches!(outbox::discard(tx.conn(), "op-1").await, Err(Error::InvalidArgument(_))));
}

#[tokio::test]
async fn stale_leases_are_recovered() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	claim(&db, 1_000).await.expect("Expected a claim.");

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	assert_eq!(outbox::recover_stale(tx.conn(), 30_000, 60_000).await.expect("recover"), 0);
	assert_eq!(outbox::recover_stale(tx.conn(), 61_000, 60_000).await.expect("recover"), 1);

	let op = outbox::claim_next(tx.conn(), 61_000)
		.await
		.expect("Failed to claim.")
		.expect("Expected a claim.");

	assert_eq!(op.op_id, "op-1");
}

#[tokio::test]
async fn create_absorbs_later_edits() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let first = outbox::enqueue_coalesced(tx.conn(), "op-1", "n1", create("n1"), 0)
		.await
		.expect("enqueue");
	let second = outbox::enqueue_coalesced(tx.conn(), "op-2", "n1", update("Edited"), 5)
		.await
		.expect("enqueue");
	let third = outbox::enqueue_coalesced(
		tx.conn(),
		"op-3",
		"n1",
		OpPayload::NoteMove(NoteMove { folder_id: Some("f1".to_string()) }),
		6,
	)
	.await
	.expect("enqueue");

	assert_eq!(first, Coalesced::Inserted { op_id: "op-1".to_string() });
	assert_eq!(second, Coalesced::Merged { op_id: "op-1".to_string() });
	assert_eq!(third, Coalesced::Merged { op_id: "op-1".to_string() });

	let pending = outbox::list_pending_for_entity(tx.conn(), "n1").await.expect("list");

	assert_eq!(pending.len(), 1);

	let OpPayload::NoteCreate(draft) = &pending[0].payload else {
		panic!("Expected a create payload.");
	};

	assert_eq!(draft.content, "Edited");
	assert_eq!(draft.folder_id.as_deref(), Some("f1"));
}

#[tokio::test]
async fn delete_cancels_an_unsent_create() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::enqueue_coalesced(tx.conn(), "op-1", "n1", create("n1"), 0).await.expect("enqueue");

	let outcome = outbox::enqueue_coalesced(tx.conn(), "op-2", "n1", OpPayload::NoteDelete, 1)
		.await
		.expect("enqueue");

	assert_eq!(outcome, Coalesced::Cancelled);
	assert!(outbox::list_all(tx.conn()).await.expect("list").is_empty());
}

#[tokio::test]
async fn delete_supersedes_pending_edits() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	claim(&db, 0).await.expect("Expected a claim.");

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::enqueue_coalesced(tx.conn(), "op-2", "n1", update("a"), 1).await.expect("enqueue");
	outbox::enqueue_coalesced(
		tx.conn(),
		"op-3",
		"n1",
		OpPayload::NoteMove(NoteMove { folder_id: None }),
		2,
	)
	.await
	.expect("enqueue");

	let outcome = outbox::enqueue_coalesced(tx.conn(), "op-4", "n1", OpPayload::NoteDelete, 3)
		.await
		.expect("enqueue");
	let ops: Vec<String> =
		outbox::list_all(tx.conn()).await.expect("list").into_iter().map(|op| op.op_id).collect();

	assert_eq!(outcome, Coalesced::Inserted { op_id: "op-4".to_string() });
	assert_eq!(ops, vec!["op-1".to_string(), "op-4".to_string()], "in-flight create is kept");
}

#[tokio::test]
async fn updates_keep_one_pending_op_and_revive_flagged_ones() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", update("one"), 0).await;

	let mut tx = db.begin_write().await.expect("Failed to begin.");

	outbox::reject(tx.conn(), "op-1", "HTTP 403", 1).await.expect("reject");

	let outcome = outbox::enqueue_coalesced(tx.conn(), "op-2", "n1", update("two"), 9)
		.await
		.expect("enqueue");
	let op = outbox::get(tx.conn(), "op-1").await.expect("get").expect("missing op");

	assert_eq!(outcome, Coalesced::Merged { op_id: "op-1".to_string() });
	assert_eq!(op.payload, update("two"));
	assert_eq!(op.attention, None);
	assert_eq!(op.retry_count, 0);
	assert_eq!(op.next_retry_at, 9);
}

#[tokio::test]
async fn thread_ops_coalesce_per_thread() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let title = |title: &str| OpPayload::ThreadUpdate(ThreadPatch { title: title.to_string() });

	outbox::enqueue_coalesced(tx.conn(), "op-1", "t1", title("First"), 0).await.expect("enqueue");
	outbox::enqueue_coalesced(tx.conn(), "op-2", "t1", title("Second"), 1).await.expect("enqueue");

	let pending = outbox::list_pending_for_entity(tx.conn(), "t1").await.expect("list");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].payload, title("Second"));

	outbox::enqueue_coalesced(tx.conn(), "op-3", "t1", OpPayload::ThreadDelete, 2)
		.await
		.expect("enqueue");

	let pending = outbox::list_pending_for_entity(tx.conn(), "t1").await.expect("list");

	assert_eq!(pending.len(), 1);
	assert_eq!(pending[0].payload, OpPayload::ThreadDelete);
}

#[tokio::test]
async fn locked_ids_cover_every_op_state() {
	let db = db().await;

	enqueue(&db, "op-1", "n1", create("n1"), 0).await;
	enqueue(&db, "op-2", "n2", create("n2"), 0).await;
	claim(&db, 0).await.expect("Expected a claim.");

	let mut conn = db.acquire().await.expect("Failed to acquire.");
	let ids: Vec<String> = (0..1_200).map(|idx| format!("n{idx}")).collect();
	let locked = outbox::locked_entity_ids(&mut conn, &ids).await.expect("Failed to query.");

	assert_eq!(locked.len(), 2);
	assert!(locked.contains("n1") && locked.contains("n2"));

	let stats = outbox::stats(&mut conn).await.expect("Failed to read stats.");

	assert_eq!((stats.pending, stats.processing, stats.attention), (1, 1, 0));
}

#[tokio::test]
async fn concurrent_claims_never_share_an_op() {
	let test_db = quire_testkit::TestDatabase::new(4).await.expect("Failed to open database.");
	let db = test_db.db();

	for idx in 0..20 {
		enqueue(db, &format!("op-{idx}"), &format!("n{idx}"), create(&format!("n{idx}")), 0).await;
	}

	let claimer = || async {
		let mut claimed = Vec::new();

		for _ in 0..10 {
			if let Some(op) = claim(db, 0).await {
				claimed.push(op.op_id);
			}

			tokio::task::yield_now().await;
		}

		claimed
	};
	let (a, b, c, d) = tokio::join!(claimer(), claimer(), claimer(), claimer());
	let mut claimed: Vec<String> = [a, b, c, d].into_iter().flatten().collect();
	let total = claimed.len();

	claimed.sort();
	claimed.dedup();

	assert_eq!(total, 20);
	assert_eq!(claimed.len(), 20);
}
