//! [`Recorder`] – the write side of a replay session.
//!
//! Turns a [`RecordValue`] into a `(tag, payload)` pair with the matching
//! encoder and appends it to the [`EntryStore`] stamped with the current
//! wall-clock time.  Recording is a synchronous append; it never suspends.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rewind_types::{RecordValue, TypeTag, codec};
use tracing::warn;

use crate::error::ReplayError;
use crate::store::{EntryStore, Mode};

/// Seconds since the Unix epoch, with sub-second precision.
pub fn now_timestamp() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) / 1e9
}

/// Appends typed values to a replay log.
pub struct Recorder {
    store: EntryStore,
}

impl Recorder {
    /// Create (or replace) the log at `path` and record into it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        Ok(Self {
            store: EntryStore::open(path, Mode::Write)?,
        })
    }

    /// Record into an already opened store.
    pub fn from_store(store: EntryStore) -> Self {
        Self { store }
    }

    /// Encode `value` and append exactly one entry under `key`.
    ///
    /// A value no encoder accepts is rejected with
    /// [`ReplayError::UnsupportedPayloadType`] and nothing is written.
    pub fn record_output(&self, key: &str, value: impl Into<RecordValue>) -> Result<(), ReplayError> {
        let (tag, payload) = codec::encode(value.into()).inspect_err(|e| {
            warn!(key, error = %e, "rejected value for recording");
        })?;
        self.write(key, tag, &payload, now_timestamp())?;
        Ok(())
    }

    /// Append an already encoded payload with an explicit timestamp.
    pub fn write(
        &self,
        key: &str,
        type_tag: TypeTag,
        payload: &[u8],
        timestamp: f64,
    ) -> Result<i64, ReplayError> {
        self.store.append(key, timestamp, type_tag, payload)
    }

    /// The underlying store.
    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Give the store back, e.g. to replay an in-memory log.
    pub fn into_store(self) -> EntryStore {
        self.store
    }

    /// Flush and release the log file.
    pub fn close(self) -> Result<(), ReplayError> {
        self.store.close()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordSink
// ─────────────────────────────────────────────────────────────────────────────

/// Anything values can be recorded into from any thread.
///
/// Implemented for a locked [`Recorder`], for the process-wide
/// [`SessionSlot`][crate::session::SessionSlot], and for shared references to
/// either.
pub trait RecordSink: Send + Sync {
    fn record(&self, key: &str, value: RecordValue) -> Result<(), ReplayError>;
}

impl RecordSink for Mutex<Recorder> {
    fn record(&self, key: &str, value: RecordValue) -> Result<(), ReplayError> {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .record_output(key, value)
    }
}

impl<T: RecordSink + ?Sized> RecordSink for Arc<T> {
    fn record(&self, key: &str, value: RecordValue) -> Result<(), ReplayError> {
        (**self).record(key, value)
    }
}

impl<T: RecordSink + ?Sized> RecordSink for &T {
    fn record(&self, key: &str, value: RecordValue) -> Result<(), ReplayError> {
        (**self).record(key, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewind_types::{DType, codec};

    fn recorder() -> Recorder {
        Recorder::from_store(EntryStore::open_in_memory().unwrap())
    }

    #[test]
    fn each_value_kind_gets_its_tag() {
        let rec = recorder();
        rec.record_output("f", 2.5).unwrap();
        rec.record_output("i", -7i64).unwrap();
        rec.record_output("s", "text").unwrap();
        rec.record_output("b", vec![1u8, 2, 3]).unwrap();
        rec.record_output("p", RecordValue::Serialized(vec![8, 1])).unwrap();
        rec.record_output("a", RecordValue::f32_array(&[1.0, 2.0], vec![2])).unwrap();

        let store = rec.store();
        let mut tags = Vec::new();
        let mut cursor = 0;
        while let Some(entry) = store.next_after(cursor).unwrap() {
            cursor = entry.id;
            tags.push(entry.type_tag);
        }
        assert_eq!(
            tags,
            vec![
                TypeTag::Float,
                TypeTag::Int,
                TypeTag::Str,
                TypeTag::Bytes,
                TypeTag::Protobuf,
                TypeTag::NdArray
            ]
        );
    }

    #[test]
    fn stored_payloads_decode_to_the_recorded_value() {
        let rec = recorder();
        let float = -1.0f64 / 3.0;
        rec.record_output("flt", float).unwrap();
        rec.record_output("num", i64::MIN).unwrap();
        rec.record_output("txt", "ünïcode").unwrap();
        rec.record_output("raw", vec![0u8, 255, 128]).unwrap();

        let store = rec.store();
        let flt = store.next_after_for_key("flt", 0).unwrap().unwrap();
        assert_eq!(codec::decode_float(&flt.payload).unwrap().to_bits(), float.to_bits());
        let num = store.next_after_for_key("num", 0).unwrap().unwrap();
        assert_eq!(codec::decode_int(&num.payload).unwrap(), i64::MIN);
        let txt = store.next_after_for_key("txt", 0).unwrap().unwrap();
        assert_eq!(codec::decode_text(&txt.payload).unwrap(), "ünïcode");
        let raw = store.next_after_for_key("raw", 0).unwrap().unwrap();
        assert_eq!(raw.payload, vec![0u8, 255, 128]);
    }

    #[test]
    fn rejected_value_writes_nothing() {
        let rec = recorder();
        let bad = RecordValue::RawArray {
            bytes: vec![0; 3],
            dtype: DType::F64,
            shape: vec![1],
        };
        let err = rec.record_output("arr", bad).unwrap_err();
        assert!(matches!(err, ReplayError::UnsupportedPayloadType(_)));
        assert!(rec.store().is_empty().unwrap());
    }

    #[test]
    fn timestamps_come_from_the_wall_clock() {
        let before = now_timestamp();
        let rec = recorder();
        rec.record_output("k", 1i64).unwrap();
        let after = now_timestamp();
        let entry = rec.store().next_after(0).unwrap().unwrap();
        assert!(entry.timestamp >= before && entry.timestamp <= after);
    }

    #[test]
    fn explicit_write_keeps_the_given_timestamp() {
        let rec = recorder();
        let id = rec.write("k", TypeTag::Bytes, b"raw", 42.5).unwrap();
        let entry = rec.store().next_after(0).unwrap().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.timestamp, 42.5);
    }

    #[test]
    fn locked_recorder_is_a_sink() {
        let sink = Arc::new(Mutex::new(recorder()));
        sink.record("k", RecordValue::from("v")).unwrap();
        let rec = Arc::try_unwrap(sink).ok().unwrap().into_inner().unwrap();
        assert_eq!(rec.store().len().unwrap(), 1);
    }
}
