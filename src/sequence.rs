//! Named counters stored as dictionaries.
//!
//! A sequence `orders` lives in the hash `sequence:orders` with three fields:
//! `Value` (the last number handed out), `Interval` (the step) and
//! `FormatString` (template for `next_string`). Fields are seeded without
//! overwriting the first time a sequence is touched.
//!
//! # Format strings
//!
//! `{#}` is replaced with the new number; `{#:6}` or `{#:D6}` pads it with zeros
//! to six digits. `{other}` inserts the current value of the sequence `other`.
//! Text outside braces is copied as is.

use crate::entry::DictionaryEntry;
use crate::error::{KvError, KvResult};
use crate::facade::KvFacade;
use crate::store::EntryType;
use serde::Serialize;
use std::sync::Arc;

pub const SEQUENCE_PREFIX: &str = "sequence:";

const VALUE_FIELD: &str = "Value";
const INTERVAL_FIELD: &str = "Interval";
const FORMAT_FIELD: &str = "FormatString";

/// Stored state of one sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceInfo {
    pub name: String,
    pub value: i64,
    pub interval: i64,
    pub format_string: String,
}

/// Sequence operations over a facade's current database.
#[derive(Debug, Clone, Copy)]
pub struct Sequences<'a> {
    facade: &'a KvFacade,
}

impl KvFacade {
    pub fn sequences(&self) -> Sequences<'_> {
        Sequences { facade: self }
    }
}

impl Sequences<'_> {
    /// Advance by the stored interval and return the new value.
    pub async fn next(&self, name: &str) -> KvResult<i64> {
        let dictionary = self.dictionary(name, 1, 0, "").await?;
        let interval = stored_interval(dictionary.get(INTERVAL_FIELD).await?);
        dictionary.increment(VALUE_FIELD, interval).await
    }

    /// Advance by `interval`, seeding the sequence at `seed` if it is new.
    pub async fn next_with(&self, name: &str, interval: i64, seed: i64) -> KvResult<i64> {
        check_interval(interval)?;
        let dictionary = self.dictionary(name, interval, seed, "").await?;
        dictionary.increment(VALUE_FIELD, interval).await
    }

    /// Advance and render the result through the stored format string.
    pub async fn next_string(&self, name: &str) -> KvResult<String> {
        let dictionary = self.dictionary(name, 1, 0, "").await?;
        let fields = dictionary
            .get_values(&[INTERVAL_FIELD.to_string(), FORMAT_FIELD.to_string()])
            .await?;
        let mut fields = fields.into_iter();
        let interval = stored_interval(fields.next().flatten());
        let format = fields.next().flatten().unwrap_or_default();

        let number = dictionary.increment(VALUE_FIELD, interval).await?;
        self.render(&format, number).await
    }

    /// Current state, `None` if the sequence was never used.
    pub async fn info(&self, name: &str) -> KvResult<Option<SequenceInfo>> {
        let key = sequence_key(name)?;
        if self.facade.get_entry_type(&key).await? == EntryType::None {
            return Ok(None);
        }
        let fields = self.facade.get_dictionary(&key).await?.get_all().await?;
        let parse = |field: &str, default: i64| {
            fields
                .get(field)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };
        Ok(Some(SequenceInfo {
            name: name.trim().to_string(),
            value: parse(VALUE_FIELD, 0),
            interval: parse(INTERVAL_FIELD, 1),
            format_string: fields.get(FORMAT_FIELD).cloned().unwrap_or_default(),
        }))
    }

    /// Overwrite value, interval and format string.
    pub async fn reset(&self, name: &str, value: i64, interval: i64, format: &str) -> KvResult<()> {
        check_interval(interval)?;
        let dictionary = self.facade.get_dictionary(&sequence_key(name)?).await?;
        dictionary
            .set_range(&[
                (VALUE_FIELD.to_string(), value.to_string()),
                (INTERVAL_FIELD.to_string(), interval.to_string()),
                (FORMAT_FIELD.to_string(), format.to_string()),
            ])
            .await
    }

    async fn dictionary(
        &self,
        name: &str,
        interval: i64,
        seed: i64,
        format: &str,
    ) -> KvResult<Arc<DictionaryEntry>> {
        let key = sequence_key(name)?;
        let interval = if interval == 0 { 1 } else { interval };
        self.facade
            .get_dictionary_with(
                &key,
                &[
                    (VALUE_FIELD.to_string(), seed.to_string()),
                    (INTERVAL_FIELD.to_string(), interval.to_string()),
                    (FORMAT_FIELD.to_string(), format.to_string()),
                ],
            )
            .await
    }

    async fn render(&self, format: &str, number: i64) -> KvResult<String> {
        if format.trim().is_empty() {
            return Ok(number.to_string());
        }

        let mut out = String::with_capacity(format.len() + 8);
        for segment in parse_template(format)? {
            match segment {
                Segment::Text(text) => out.push_str(&text),
                Segment::Number { source, width } => {
                    let value = match source {
                        Source::Current => number,
                        Source::Sequence(other) => self.current_value(&other).await?,
                    };
                    out.push_str(&pad(value, width));
                }
            }
        }
        Ok(out)
    }

    async fn current_value(&self, name: &str) -> KvResult<i64> {
        Ok(self.info(name).await?.map_or(0, |info| info.value))
    }
}

fn sequence_key(name: &str) -> KvResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(KvError::invalid_argument("Sequence name cannot be empty"));
    }
    Ok(format!("{SEQUENCE_PREFIX}{name}"))
}

fn check_interval(interval: i64) -> KvResult<()> {
    if interval == 0 {
        return Err(KvError::invalid_argument("Sequence interval cannot be zero"));
    }
    Ok(())
}

/// Interval stored in the hash; missing, zero or garbled values mean 1.
fn stored_interval(raw: Option<String>) -> i64 {
    raw.and_then(|v| v.trim().parse().ok())
        .filter(|i: &i64| *i != 0)
        .unwrap_or(1)
}

#[derive(Debug, PartialEq, Eq)]
enum Source {
    Current,
    Sequence(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Text(String),
    Number { source: Source, width: usize },
}

fn parse_template(format: &str) -> KvResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut rest = format;

    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open..].find('}') else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Text(rest[..open].to_string()));
        }
        let inner = rest[open + 1..open + len].trim();
        segments.push(parse_placeholder(inner)?);
        rest = &rest[open + len + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Text(rest.to_string()));
    }
    Ok(segments)
}

fn parse_placeholder(inner: &str) -> KvResult<Segment> {
    let (name, spec) = match inner.split_once(':') {
        Some((name, spec)) => (name.trim(), spec.trim()),
        None => (inner, ""),
    };

    let source = match name {
        "#" | "." => Source::Current,
        "" => {
            return Err(KvError::invalid_argument(
                "Empty placeholder in sequence format string",
            ));
        }
        other => Source::Sequence(other.to_string()),
    };

    let digits = spec.strip_prefix(['D', 'd']).unwrap_or(spec);
    let width = if digits.is_empty() {
        0
    } else {
        digits.parse().map_err(|_| {
            KvError::invalid_argument(format!("Unsupported number format '{spec}'"))
        })?
    };
    Ok(Segment::Number { source, width })
}

fn pad(value: i64, width: usize) -> String {
    if value < 0 {
        format!("-{:0width$}", value.unsigned_abs(), width = width)
    } else {
        format!("{:0width$}", value, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreSettings;
    use crate::store::{Connector, MemoryStore};

    fn facade() -> KvFacade {
        KvFacade::with_connector(
            Connector::Memory(MemoryStore::new()),
            &StoreSettings::memory(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_template() {
        let segments = parse_template("INV-{#:6}/{year}").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("INV-".to_string()),
                Segment::Number {
                    source: Source::Current,
                    width: 6
                },
                Segment::Text("/".to_string()),
                Segment::Number {
                    source: Source::Sequence("year".to_string()),
                    width: 0
                },
            ]
        );
        assert!(parse_template("{#:x4}").is_err());
        assert_eq!(
            parse_template("open {brace").unwrap(),
            vec![Segment::Text("open {brace".to_string())]
        );
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad(42, 5), "00042");
        assert_eq!(pad(42, 0), "42");
        assert_eq!(pad(-7, 3), "-007");
    }

    #[tokio::test]
    async fn test_next_uses_stored_interval() {
        let facade = facade();
        let seq = facade.sequences();
        assert_eq!(seq.next("orders").await.unwrap(), 1);
        assert_eq!(seq.next("orders").await.unwrap(), 2);

        seq.reset("orders", 100, 10, "").await.unwrap();
        assert_eq!(seq.next("orders").await.unwrap(), 110);
    }

    #[tokio::test]
    async fn test_next_with_seed() {
        let facade = facade();
        let seq = facade.sequences();
        assert_eq!(seq.next_with("tickets", 5, 1000).await.unwrap(), 1005);
        // Seed is ignored once the sequence exists.
        assert_eq!(seq.next_with("tickets", 5, 0).await.unwrap(), 1010);
        assert!(matches!(
            seq.next_with("tickets", 0, 0).await,
            Err(KvError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn test_next_string_formats() {
        let facade = facade();
        let seq = facade.sequences();
        assert_eq!(seq.next_string("plain").await.unwrap(), "1");

        seq.reset("year", 2026, 1, "").await.unwrap();
        seq.reset("invoice", 0, 1, "INV-{year}-{#:D4}").await.unwrap();
        assert_eq!(seq.next_string("invoice").await.unwrap(), "INV-2026-0001");
        assert_eq!(seq.next_string("invoice").await.unwrap(), "INV-2026-0002");
    }

    #[tokio::test]
    async fn test_info() {
        let facade = facade();
        let seq = facade.sequences();
        assert!(seq.info("unused").await.unwrap().is_none());

        seq.next_with("orders", 3, 10).await.unwrap();
        let info = seq.info("orders").await.unwrap().unwrap();
        assert_eq!(info.value, 13);
        assert_eq!(info.interval, 3);
        assert_eq!(info.format_string, "");
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let facade = facade();
        let seq = facade.sequences();
        assert!(matches!(seq.next("  ").await, Err(KvError::InvalidArgument { .. })));
        assert!(matches!(
            seq.reset("s", 0, 0, "").await,
            Err(KvError::InvalidArgument { .. })
        ));
    }
}
