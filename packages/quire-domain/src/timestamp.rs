//! Local timestamps are epoch milliseconds. Remote payloads may carry RFC 3339 strings, numeric
//! strings, or numbers; everything is normalized on ingestion.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::{Error, Result};

pub fn now_millis() -> i64 {
	(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Source of "now" for scheduling decisions.
pub trait Clock
where
	Self: Send + Sync,
{
	fn now_millis(&self) -> i64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now_millis(&self) -> i64 {
		now_millis()
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
	Millis(i64),
	Fractional(f64),
	Text(String),
}
impl RemoteTimestamp {
	pub fn to_millis(&self) -> Result<i64> {
		match self {
			Self::Millis(value) => Ok(*value),
			Self::Fractional(value) =>
				if value.is_finite() {
					Ok(value.trunc() as i64)
				} else {
					Err(Error::InvalidTimestamp { value: value.to_string() })
				},
			Self::Text(raw) => parse_timestamp(raw),
		}
	}
}
impl From<i64> for RemoteTimestamp {
	fn from(value: i64) -> Self {
		Self::Millis(value)
	}
}

pub fn parse_timestamp(raw: &str) -> Result<i64> {
	let trimmed = raw.trim();

	if let Ok(value) = trimmed.parse::<i64>() {
		return Ok(value);
	}

	let parsed = OffsetDateTime::parse(trimmed, &Rfc3339)
		.map_err(|_| Error::InvalidTimestamp { value: raw.to_string() })?;

	Ok((parsed.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub fn format_timestamp(millis: i64) -> Option<String> {
	let nanos = i128::from(millis).checked_mul(1_000_000)?;

	OffsetDateTime::from_unix_timestamp_nanos(nanos).ok()?.format(&Rfc3339).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rfc3339_and_epoch_agree() {
		let iso = RemoteTimestamp::Text("2024-03-01T12:00:00Z".to_string());
		let epoch = RemoteTimestamp::Millis(1_709_294_400_000);

		assert_eq!(iso.to_millis().expect("iso"), epoch.to_millis().expect("epoch"));
	}

	#[test]
	fn offsets_are_folded_into_utc() {
		let shifted = parse_timestamp("2024-03-01T21:00:00+09:00").expect("parse failed");

		assert_eq!(shifted, 1_709_294_400_000);
	}

	#[test]
	fn numeric_strings_are_millis() {
		assert_eq!(parse_timestamp(" 1709294400000 ").expect("parse failed"), 1_709_294_400_000);
	}

	#[test]
	fn garbage_is_rejected() {
		assert!(parse_timestamp("yesterday").is_err());
		assert!(RemoteTimestamp::Fractional(f64::NAN).to_millis().is_err());
	}

	#[test]
	fn untagged_json_forms_deserialize() {
		let values: Vec<RemoteTimestamp> =
			serde_json::from_str(r#"[1709294400000, 1709294400000.5, "2024-03-01T12:00:00Z"]"#)
				.expect("decode failed");

		for value in values {
			assert_eq!(value.to_millis().expect("normalize failed"), 1_709_294_400_000);
		}
	}

	#[test]
	fn formats_back_to_rfc3339() {
		assert_eq!(
			format_timestamp(1_709_294_400_000).as_deref(),
			Some("2024-03-01T12:00:00Z")
		);
	}
}
