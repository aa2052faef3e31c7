//! ISO-8601 timestamp codec for the remote store
//!
//! The server emits timestamps both with and without fractional seconds;
//! the decoder must accept either form.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse an ISO-8601 timestamp, fractional seconds optional.
///
/// Accepts a full RFC 3339 string (`2024-05-01T10:30:00+00:00`,
/// `2024-05-01T10:30:00.123456Z`) or a naive timestamp without offset,
/// which is taken as UTC.
pub fn parse(input: &str) -> Option<DateTime<Utc>> {
	if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
		return Some(dt.with_timezone(&Utc));
	}
	if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f") {
		return Some(naive.and_utc());
	}
	None
}

/// serde codec for required `DateTime<Utc>` fields
pub mod iso8601 {
	use super::*;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&dt.to_rfc3339())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<DateTime<Utc>, D::Error> {
		let raw = String::deserialize(deserializer)?;
		super::parse(&raw)
			.ok_or_else(|| serde::de::Error::custom(format!("cannot decode date: {raw}")))
	}
}

/// serde codec for `Option<DateTime<Utc>>` fields; absent and null both
/// decode to `None`
pub mod iso8601_option {
	use super::*;
	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(
		dt: &Option<DateTime<Utc>>,
		serializer: S,
	) -> Result<S::Ok, S::Error> {
		match dt {
			Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
			None => serializer.serialize_none(),
		}
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Option<DateTime<Utc>>, D::Error> {
		let raw: Option<String> = Option::deserialize(deserializer)?;
		match raw {
			None => Ok(None),
			Some(raw) => super::parse(&raw)
				.map(Some)
				.ok_or_else(|| serde::de::Error::custom(format!("cannot decode date: {raw}"))),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_with_and_without_fractional_seconds() {
		let plain = parse("2024-05-01T10:30:00+00:00").unwrap();
		let fractional = parse("2024-05-01T10:30:00.250000+00:00").unwrap();
		assert!(fractional > plain);

		let zulu = parse("2024-05-01T10:30:00Z").unwrap();
		assert_eq!(plain, zulu);
	}

	#[test]
	fn parses_naive_as_utc() {
		let naive = parse("2024-05-01T10:30:00.5").unwrap();
		let explicit = parse("2024-05-01T10:30:00.5Z").unwrap();
		assert_eq!(naive, explicit);
	}

	#[test]
	fn rejects_garbage() {
		assert!(parse("yesterday").is_none());
	}
}
