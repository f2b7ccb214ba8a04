//! The `voxpod/1` on-disk envelope: a symmetric `encode_for_storage` /
//! `decode_runtime_value` pair that round-trips every supported `VoxValue`
//! kind (spec §4.G).

use crate::value::{Descriptor, EagerSequence, ImageValue, NdArray, ScalarValue, VoxValue, MAX_PAGE_SIZE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

pub const FORMAT_VERSION: &str = "voxpod/1";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unsupported value type for persistence: {0}")]
    UnsupportedValue(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// One page of a persisted sequence: offset/limit plus the page's own
/// descriptor and JSON-native payload. Page items must be JSON-native;
/// nested non-JSON-native values (e.g. a sequence of images) are rejected
/// with `CodecError::UnsupportedValue` rather than silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedPage {
    pub offset: usize,
    pub limit: usize,
    pub descriptor: Descriptor,
    pub payload_json: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayHeader {
    pub encoding: String,
    pub dtype: String,
    pub shape: Vec<usize>,
    pub order: String,
    pub byte_order: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMeta {
    pub dimension: u8,
    pub size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    pub direction: Vec<f64>,
    pub pixel_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodedRecord {
    pub format_version: String,
    pub vox_type: String,
    pub descriptor: Descriptor,
    pub payload_json: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_bin: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<EncodedPage>>,
}

fn array_header(array: &NdArray) -> ArrayHeader {
    ArrayHeader {
        encoding: "ndarray-binary-v1".to_string(),
        dtype: "f64".to_string(),
        shape: array.shape.clone(),
        order: "row-major".to_string(),
        byte_order: "le".to_string(),
    }
}

fn encode_array_bin(array: &NdArray) -> CodecResult<Vec<u8>> {
    bincode::serialize(&array.data).map_err(|e| CodecError::UnsupportedValue(e.to_string()))
}

fn decode_array_bin(bytes: &[u8], shape: Vec<usize>) -> CodecResult<NdArray> {
    let data: Vec<f64> = bincode::deserialize(bytes).map_err(|e| CodecError::UnsupportedValue(e.to_string()))?;
    Ok(NdArray { shape, data })
}

/// Encode a runtime value into the durable envelope. `page_size` governs how
/// many sequence items land in each `EncodedPage`.
pub fn encode_for_storage(value: &VoxValue, page_size: usize) -> CodecResult<EncodedRecord> {
    let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
    let descriptor = value
        .describe("")
        .ok_or_else(|| CodecError::UnsupportedValue("value could not be described".to_string()))?;

    match value {
        VoxValue::Scalar(s) => Ok(EncodedRecord {
            format_version: FORMAT_VERSION.to_string(),
            vox_type: value.vox_type().to_string(),
            descriptor,
            payload_json: scalar_json(s),
            payload_bin: None,
            pages: None,
        }),
        VoxValue::NdArray(array) => Ok(EncodedRecord {
            format_version: FORMAT_VERSION.to_string(),
            vox_type: "ndarray".to_string(),
            descriptor,
            payload_json: serde_json::to_value(array_header(array)).expect("header always serializes"),
            payload_bin: Some(encode_array_bin(array)?),
            pages: None,
        }),
        VoxValue::Image(image) => {
            let mut payload = serde_json::to_value(ImageMeta {
                dimension: image.dimension,
                size: image.size.clone(),
                spacing: image.spacing.clone(),
                origin: image.origin.clone(),
                direction: image.direction.clone(),
                pixel_id: image.pixel_id.clone(),
            })
            .expect("image meta always serializes");
            if let serde_json::Value::Object(ref mut map) = payload {
                map.insert(
                    "array_header".to_string(),
                    serde_json::to_value(array_header(&image.array)).expect("header always serializes"),
                );
            }
            Ok(EncodedRecord {
                format_version: FORMAT_VERSION.to_string(),
                vox_type: value.vox_type().to_string(),
                descriptor,
                payload_json: payload,
                payload_bin: Some(encode_array_bin(&image.array)?),
                pages: None,
            })
        }
        VoxValue::Mapping(map) => {
            let mut encoded = serde_json::Map::new();
            for (k, v) in map {
                let record = encode_for_storage(v, page_size)?;
                encoded.insert(k.clone(), serde_json::to_value(record).expect("encoded record always serializes"));
            }
            Ok(EncodedRecord {
                format_version: FORMAT_VERSION.to_string(),
                vox_type: "mapping".to_string(),
                descriptor,
                payload_json: serde_json::Value::Object(encoded),
                payload_bin: None,
                pages: None,
            })
        }
        VoxValue::Sequence(seq) => {
            let items = seq.materialize();
            let mut pages = Vec::new();
            let mut offset = 0;
            if items.is_empty() {
                pages.push(encode_sequence_page(&[], 0, page_size)?);
            }
            while offset < items.len() {
                let chunk = &items[offset..(offset + page_size).min(items.len())];
                pages.push(encode_sequence_page(chunk, offset, page_size)?);
                offset += chunk.len();
            }
            Ok(EncodedRecord {
                format_version: FORMAT_VERSION.to_string(),
                vox_type: "sequence".to_string(),
                descriptor,
                payload_json: serde_json::json!({ "total_size": seq.total_size() }),
                payload_bin: None,
                pages: Some(pages),
            })
        }
        VoxValue::Closure(_) => Err(CodecError::UnsupportedValue("closure values cannot be encoded".to_string())),
    }
}

fn encode_sequence_page(chunk: &[VoxValue], offset: usize, limit: usize) -> CodecResult<EncodedPage> {
    let mut items_json = Vec::with_capacity(chunk.len());
    for item in chunk {
        if !is_json_native(item) {
            return Err(CodecError::UnsupportedValue(format!(
                "sequence page item of type '{}' is not JSON-native",
                item.vox_type()
            )));
        }
        items_json.push(item.to_json_native());
    }
    let descriptor = VoxValue::Sequence(Arc::new(EagerSequence::new(chunk.to_vec())))
        .describe("")
        .expect("sequence always describable");
    Ok(EncodedPage {
        offset,
        limit,
        descriptor,
        payload_json: serde_json::Value::Array(items_json),
    })
}

fn is_json_native(value: &VoxValue) -> bool {
    matches!(value, VoxValue::Scalar(_) | VoxValue::Mapping(_) | VoxValue::Sequence(_))
}

fn scalar_json(s: &ScalarValue) -> serde_json::Value {
    VoxValue::Scalar(s.clone()).to_json_native()
}

/// Decode a runtime value back out of its durable envelope.
pub fn decode_runtime_value(record: &EncodedRecord) -> CodecResult<VoxValue> {
    match record.vox_type.as_str() {
        "scalar" => Ok(VoxValue::Scalar(scalar_from_json(&record.payload_json)?)),
        "ndarray" => {
            let header: ArrayHeader =
                serde_json::from_value(record.payload_json.clone()).map_err(|e| CodecError::UnsupportedValue(e.to_string()))?;
            let bytes = record
                .payload_bin
                .as_ref()
                .ok_or_else(|| CodecError::UnsupportedValue("ndarray record missing binary payload".to_string()))?;
            Ok(VoxValue::NdArray(decode_array_bin(bytes, header.shape)?))
        }
        "image2d" | "volume3d" => {
            let meta: ImageMeta =
                serde_json::from_value(record.payload_json.clone()).map_err(|e| CodecError::UnsupportedValue(e.to_string()))?;
            let bytes = record
                .payload_bin
                .as_ref()
                .ok_or_else(|| CodecError::UnsupportedValue("image record missing binary payload".to_string()))?;
            let shape = meta.size.clone();
            let array = decode_array_bin(bytes, shape)?;
            Ok(VoxValue::Image(ImageValue {
                dimension: meta.dimension,
                size: meta.size,
                spacing: meta.spacing,
                origin: meta.origin,
                direction: meta.direction,
                pixel_id: meta.pixel_id,
                array,
            }))
        }
        "mapping" => {
            let object = record
                .payload_json
                .as_object()
                .ok_or_else(|| CodecError::UnsupportedValue("mapping payload must be a JSON object".to_string()))?;
            let mut out = BTreeMap::new();
            for (k, v) in object {
                let nested: EncodedRecord = serde_json::from_value(v.clone()).map_err(|e| CodecError::UnsupportedValue(e.to_string()))?;
                out.insert(k.clone(), decode_runtime_value(&nested)?);
            }
            Ok(VoxValue::Mapping(out))
        }
        "sequence" => {
            let pages = record
                .pages
                .as_ref()
                .ok_or_else(|| CodecError::UnsupportedValue("sequence record missing pages".to_string()))?;
            let mut items = Vec::new();
            for page in pages {
                let array = page
                    .payload_json
                    .as_array()
                    .ok_or_else(|| CodecError::UnsupportedValue("sequence page payload must be a JSON array".to_string()))?;
                for item in array {
                    items.push(scalar_or_container_from_json(item)?);
                }
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(items))))
        }
        other => Err(CodecError::UnsupportedValue(format!("unknown vox_type '{other}'"))),
    }
}

fn scalar_from_json(value: &serde_json::Value) -> CodecResult<ScalarValue> {
    Ok(match value {
        serde_json::Value::Null => ScalarValue::Null,
        serde_json::Value::Bool(b) => ScalarValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ScalarValue::Integer(i)
            } else {
                ScalarValue::Number(n.as_f64().unwrap_or_default())
            }
        }
        serde_json::Value::String(s) => ScalarValue::Str(s.clone()),
        serde_json::Value::Array(bytes) => {
            let decoded: Result<Vec<u8>, _> = bytes
                .iter()
                .map(|b| b.as_u64().map(|n| n as u8).ok_or(()))
                .collect();
            match decoded {
                Ok(bytes) => ScalarValue::Bytes(bytes),
                Err(()) => return Err(CodecError::UnsupportedValue("scalar array payload not byte-encodable".to_string())),
            }
        }
        other => return Err(CodecError::UnsupportedValue(format!("not a scalar JSON value: {other}"))),
    })
}

/// Sequence items may themselves be JSON-native mappings/sequences, not just
/// scalars; decode those generically from plain JSON.
fn scalar_or_container_from_json(value: &serde_json::Value) -> CodecResult<VoxValue> {
    match value {
        serde_json::Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), scalar_or_container_from_json(v)?);
            }
            Ok(VoxValue::Mapping(out))
        }
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(scalar_or_container_from_json(item)?);
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(out))))
        }
        other => Ok(VoxValue::Scalar(scalar_from_json(other)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ScalarValue;

    #[test]
    fn scalar_round_trips() {
        let value = VoxValue::Scalar(ScalarValue::Integer(42));
        let record = encode_for_storage(&value, 50).unwrap();
        let decoded = decode_runtime_value(&record).unwrap();
        assert_eq!(decoded.to_json_native(), value.to_json_native());
    }

    #[test]
    fn ndarray_round_trips_through_binary_payload() {
        let value = VoxValue::NdArray(NdArray { shape: vec![2, 2], data: vec![1.0, 2.0, 3.0, 4.0] });
        let record = encode_for_storage(&value, 50).unwrap();
        assert!(record.payload_bin.is_some());
        let decoded = decode_runtime_value(&record).unwrap();
        match decoded {
            VoxValue::NdArray(a) => assert_eq!(a.data, vec![1.0, 2.0, 3.0, 4.0]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn sequence_round_trips_across_multiple_pages() {
        let items: Vec<VoxValue> = (0..10).map(|i| VoxValue::Scalar(ScalarValue::Integer(i))).collect();
        let value = VoxValue::Sequence(Arc::new(EagerSequence::new(items)));
        let record = encode_for_storage(&value, 3).unwrap();
        assert_eq!(record.pages.as_ref().unwrap().len(), 4);
        let decoded = decode_runtime_value(&record).unwrap();
        match decoded {
            VoxValue::Sequence(seq) => assert_eq!(seq.total_size(), Some(10)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn mapping_round_trips_nested_values() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), VoxValue::Scalar(ScalarValue::Integer(1)));
        let value = VoxValue::Mapping(map);
        let record = encode_for_storage(&value, 50).unwrap();
        let decoded = decode_runtime_value(&record).unwrap();
        match decoded {
            VoxValue::Mapping(m) => assert_eq!(m.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }
}
