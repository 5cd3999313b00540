use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Guards the cosine denominator against zero-magnitude vectors.
pub const COSINE_EPSILON: f32 = 1e-8;
pub const MAX_PREVIEW_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageVector {
	pub id: String,
	pub thread_id: String,
	pub ts: i64,
	pub model: String,
	pub dim: usize,
	pub vec: Vec<f32>,
	pub preview: Option<String>,
	/// blake3 of the embedded text; lets re-indexing skip unchanged messages.
	pub content_hash: Option<String>,
}
impl MessageVector {
	pub fn new(
		id: impl Into<String>,
		thread_id: impl Into<String>,
		ts: i64,
		model: impl Into<String>,
		vec: Vec<f32>,
	) -> Self {
		Self {
			id: id.into(),
			thread_id: thread_id.into(),
			ts,
			model: model.into(),
			dim: vec.len(),
			vec,
			preview: None,
			content_hash: None,
		}
	}

	pub fn with_source_text(mut self, text: &str, preview_chars: usize) -> Self {
		self.preview = Some(truncate_chars(text, preview_chars.min(MAX_PREVIEW_CHARS)).to_string());
		self.content_hash = Some(content_hash(text));

		self
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
	pub id: String,
	pub thread_id: String,
	pub ts: i64,
	pub preview: Option<String>,
	pub score: f32,
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

/// Scores candidates against `query` and keeps the best `k`. Higher score first; equal scores
/// prefer the newer `ts`, then the smaller id so results are deterministic. Candidates whose
/// dimension differs from the query are not comparable and are dropped.
pub fn rank_top_k<I>(query: &[f32], candidates: I, k: usize) -> Vec<SearchHit>
where
	I: IntoIterator<Item = MessageVector>,
{
	let mut hits: Vec<SearchHit> = candidates
		.into_iter()
		.filter(|candidate| candidate.vec.len() == query.len())
		.map(|candidate| SearchHit {
			score: cosine(query, &candidate.vec),
			id: candidate.id,
			thread_id: candidate.thread_id,
			ts: candidate.ts,
			preview: candidate.preview,
		})
		.collect();

	hits.sort_by(compare_hits);
	hits.truncate(k);

	hits
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
	b.score
		.partial_cmp(&a.score)
		.unwrap_or(Ordering::Equal)
		.then_with(|| b.ts.cmp(&a.ts))
		.then_with(|| a.id.cmp(&b.id))
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((byte_idx, _)) => &text[..byte_idx],
		None => text,
	}
}

pub fn content_hash(text: &str) -> String {
	blake3::hash(text.as_bytes()).to_hex().to_string()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(id: &str, ts: i64, vec: Vec<f32>) -> MessageVector {
		MessageVector::new(id, "t1", ts, "test-model", vec)
	}

	#[test]
	fn identical_vectors_score_one() {
		let score = cosine(&[0.3, -0.2, 0.9], &[0.3, -0.2, 0.9]);

		assert!((score - 1.0).abs() < 1e-5, "score was {score}");
	}

	#[test]
	fn zero_vector_scores_zero_without_nan() {
		let score = cosine(&[0.0, 0.0], &[1.0, 0.0]);

		assert_eq!(score, 0.0);
		assert!(!cosine(&[0.0, 0.0], &[0.0, 0.0]).is_nan());
	}

	#[test]
	fn magnitude_does_not_matter() {
		let a = cosine(&[1.0, 2.0], &[2.0, 4.0]);

		assert!((a - 1.0).abs() < 1e-5);
	}

	#[test]
	fn ties_prefer_newer_rows() {
		let hits = rank_top_k(
			&[1.0, 0.0],
			vec![row("old", 10, vec![1.0, 0.0]), row("new", 20, vec![2.0, 0.0])],
			2,
		);

		assert_eq!(hits[0].id, "new");
		assert_eq!(hits[1].id, "old");
	}

	#[test]
	fn keeps_only_top_k_by_score() {
		let hits = rank_top_k(
			&[1.0, 0.0],
			vec![
				row("far", 30, vec![0.0, 1.0]),
				row("near", 10, vec![1.0, 0.1]),
				row("mid", 20, vec![1.0, 1.0]),
			],
			2,
		);
		let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();

		assert_eq!(ids, vec!["near", "mid"]);
	}

	#[test]
	fn mismatched_dimensions_are_skipped() {
		let hits = rank_top_k(&[1.0, 0.0], vec![row("short", 1, vec![1.0])], 5);

		assert!(hits.is_empty());
	}

	#[test]
	fn truncation_respects_char_boundaries() {
		assert_eq!(truncate_chars("héllo", 2), "hé");
		assert_eq!(truncate_chars("abc", 10), "abc");
	}

	#[test]
	fn preview_is_capped() {
		let text = "x".repeat(800);
		let row = row("m", 0, vec![1.0]).with_source_text(&text, 2_000);

		assert_eq!(row.preview.map(|p| p.chars().count()), Some(MAX_PREVIEW_CHARS));
		assert_eq!(row.content_hash, Some(content_hash(&text)));
	}
}
