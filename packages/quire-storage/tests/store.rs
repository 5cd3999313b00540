use quire_domain::vector::MessageVector;
use quire_storage::{db::Db, folders, notes, sync_state, vectors};
use quire_testkit::{folder, note};

async fn db() -> Db {
	quire_testkit::test_db().await.expect("Failed to open test database.")
}

fn vector(id: &str, thread_id: &str, ts: i64, vec: Vec<f32>) -> MessageVector {
	MessageVector::new(id, thread_id, ts, "test-model", vec).with_source_text(id, 500)
}

#[tokio::test]
async fn writes_are_visible_to_the_next_read() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	notes::put(tx.conn(), &note("n1", "# First", None, 10)).await.expect("put");
	tx.commit().await.expect("Failed to commit.");

	let mut conn = db.acquire().await.expect("Failed to acquire.");
	let stored = notes::get(&mut conn, "n1").await.expect("get").expect("missing note");

	assert_eq!(stored.title, "First");
	assert!(notes::get(&mut conn, "n2").await.expect("get").is_none());
}

#[tokio::test]
async fn update_times_cover_known_ids_only() {
	let db = db().await;
	let batch: Vec<_> = (0..600).map(|idx| note(&format!("n{idx}"), "body", None, idx)).collect();
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	notes::bulk_put(tx.conn(), &batch).await.expect("bulk_put");

	let mut ids: Vec<String> = batch.iter().map(|note| note.id.clone()).collect();

	ids.push("ghost".to_string());

	let times = notes::updated_at_by_id(tx.conn(), &ids).await.expect("updated_at_by_id");

	assert_eq!(times.len(), 600);
	assert_eq!(times.get("n599"), Some(&599));
	assert!(!times.contains_key("ghost"));
}

#[tokio::test]
async fn dropped_transaction_rolls_back() {
	let db = db().await;

	{
		let mut tx = db.begin_write().await.expect("Failed to begin.");

		notes::put(tx.conn(), &note("n1", "body", None, 10)).await.expect("put");
	}

	let mut conn = db.acquire().await.expect("Failed to acquire.");

	assert!(notes::list(&mut conn).await.expect("list").is_empty());
}

#[tokio::test]
async fn bulk_put_upserts_across_batches() {
	let db = db().await;
	let batch: Vec<_> =
		(0..1_234).map(|idx| note(&format!("n{idx}"), "old", None, idx)).collect();
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	notes::bulk_put(tx.conn(), &batch).await.expect("bulk_put");
	notes::bulk_put(tx.conn(), &[note("n7", "new", Some("f1"), 9_999)]).await.expect("bulk_put");

	let all = notes::list(tx.conn()).await.expect("list");
	let in_folder = notes::list_in_folder(tx.conn(), Some("f1")).await.expect("list");
	let at_root = notes::list_in_folder(tx.conn(), None).await.expect("list");

	assert_eq!(all.len(), 1_234);
	assert_eq!(all[0].id, "n7", "newest update first");
	assert_eq!(in_folder.len(), 1);
	assert_eq!(at_root.len(), 1_233);

	let matched = notes::query(tx.conn(), |note| note.content == "new").await.expect("query");

	assert_eq!(matched.len(), 1);
	assert!(notes::delete(tx.conn(), "n7").await.expect("delete"));
	assert!(!notes::delete(tx.conn(), "n7").await.expect("delete"));
}

#[tokio::test]
async fn folders_list_by_parent() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	folders::bulk_put(
		tx.conn(),
		&[folder("a", None), folder("b", Some("a")), folder("c", Some("a"))],
	)
	.await
	.expect("bulk_put");

	let roots = folders::list_children(tx.conn(), None).await.expect("list");
	let children = folders::list_children(tx.conn(), Some("a")).await.expect("list");

	assert_eq!(roots.len(), 1);
	assert_eq!(children.len(), 2);

	let mut renamed = folder("b", Some("a"));

	renamed.name = "Renamed".to_string();

	folders::put(tx.conn(), &renamed).await.expect("put");

	assert_eq!(
		folders::get(tx.conn(), "b").await.expect("get").map(|folder| folder.name),
		Some("Renamed".to_string())
	);
}

#[tokio::test]
async fn sync_state_round_trips() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	assert!(sync_state::get(tx.conn(), "notes.cursor").await.expect("get").is_none());

	sync_state::set(tx.conn(), "notes.cursor", "c1", 1).await.expect("set");
	sync_state::set(tx.conn(), "notes.cursor", "c2", 2).await.expect("set");

	assert_eq!(sync_state::get(tx.conn(), "notes.cursor").await.expect("get"), Some("c2".into()));

	sync_state::clear(tx.conn(), "notes.cursor").await.expect("clear");

	assert!(sync_state::get(tx.conn(), "notes.cursor").await.expect("get").is_none());
}

#[tokio::test]
async fn vector_upsert_is_idempotent() {
	let db = db().await;
	let row = vector("m1", "t1", 10, vec![0.25, -0.5, 1.0]);
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	vectors::upsert(tx.conn(), &[row.clone()]).await.expect("upsert");
	vectors::upsert(tx.conn(), &[row.clone()]).await.expect("upsert");

	assert_eq!(vectors::count(tx.conn()).await.expect("count"), 1);
	assert_eq!(vectors::get(tx.conn(), "m1").await.expect("get"), Some(row));
}

#[tokio::test]
async fn vector_upsert_replaces_by_id() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	vectors::upsert(tx.conn(), &[vector("m1", "t1", 10, vec![1.0, 0.0])]).await.expect("upsert");
	vectors::upsert(tx.conn(), &[vector("m1", "t2", 20, vec![0.0, 1.0, 0.0])])
		.await
		.expect("upsert");

	let stored = vectors::get(tx.conn(), "m1").await.expect("get").expect("missing vector");

	assert_eq!(stored.thread_id, "t2");
	assert_eq!(stored.dim, 3);
}

#[tokio::test]
async fn malformed_vectors_are_refused() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");
	let empty = MessageVector::new("m1", "t1", 1, "test-model", Vec::new());

	assert!(vectors::upsert(tx.conn(), &[empty]).await.is_err());
	assert_eq!(vectors::count(tx.conn()).await.expect("count"), 0);
}

#[tokio::test]
async fn scans_by_thread_and_recency() {
	let db = db().await;
	let rows: Vec<_> = (0..6)
		.map(|idx| {
			vector(&format!("m{idx}"), if idx % 2 == 0 { "even" } else { "odd" }, idx, vec![1.0])
		})
		.collect();
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	vectors::upsert(tx.conn(), &rows).await.expect("upsert");

	let even: Vec<String> = vectors::by_thread(tx.conn(), "even")
		.await
		.expect("scan")
		.into_iter()
		.map(|row| row.id)
		.collect();
	let recent: Vec<String> = vectors::recent(tx.conn(), 2)
		.await
		.expect("scan")
		.into_iter()
		.map(|row| row.id)
		.collect();

	assert_eq!(even, vec!["m4", "m2", "m0"]);
	assert_eq!(recent, vec!["m5", "m4"]);

	let removed = vectors::delete_by_ids(tx.conn(), &["m0".to_string(), "missing".to_string()])
		.await
		.expect("delete");

	assert_eq!(removed, 1);
	assert_eq!(vectors::delete_by_thread(tx.conn(), "odd").await.expect("delete"), 3);
	assert_eq!(vectors::count(tx.conn()).await.expect("count"), 2);
}

#[tokio::test]
async fn fingerprints_report_model_and_hash() {
	let db = db().await;
	let mut tx = db.begin_write().await.expect("Failed to begin.");

	vectors::upsert(tx.conn(), &[vector("m1", "t1", 1, vec![1.0])]).await.expect("upsert");

	let found = vectors::fingerprints(tx.conn(), &["m1".to_string(), "m2".to_string()])
		.await
		.expect("fingerprints");

	assert_eq!(found.len(), 1);
	assert_eq!(
		found.get("m1"),
		Some(&("test-model".to_string(), Some(quire_domain::vector::content_hash("m1"))))
	);
}
