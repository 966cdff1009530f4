//! Tests for record normalization.

use super::*;
use crate::schema::{Backend, CollectionInfo, RowLayout};
use serde_json::json;

fn dense_info(dimension: usize) -> CollectionInfo {
    CollectionInfo {
        dimension: Some(dimension),
        ..Default::default()
    }
}

fn raw(id: &str, vector: Vec<f32>) -> RawRecord {
    RawRecord {
        id: id.to_string(),
        vector,
        ..Default::default()
    }
}

#[test]
fn test_normalize_dense_record() {
    let info = dense_info(4);
    let normalizer = Normalizer::new(&info, RowLayout::default());
    let row = normalizer
        .normalize(raw("a", vec![0.1, 0.2, 0.3, 0.4]))
        .unwrap();

    assert_eq!(row.id, "a");
    assert_eq!(row.vector.len(), 4);
    assert!(row.sparse_values.is_none());
    assert!(row.cross_references.is_none());
}

#[test]
fn test_normalize_rejects_empty_id() {
    let normalizer = Normalizer::new(&dense_info(2), RowLayout::default());
    let err = normalizer.normalize(raw("", vec![0.1, 0.2])).unwrap_err();
    assert!(matches!(err, Error::Normalization(_)));
}

#[test]
fn test_normalize_rejects_dimension_mismatch() {
    let normalizer = Normalizer::new(&dense_info(4), RowLayout::default());
    let err = normalizer.normalize(raw("a", vec![0.1, 0.2])).unwrap_err();
    assert!(err.to_string().contains("collection declares 4"));
}

#[test]
fn test_normalize_unknown_dimension_accepts_metadata_only() {
    let normalizer = Normalizer::new(&CollectionInfo::default(), RowLayout::default());
    let row = normalizer.normalize(raw("a", vec![])).unwrap();
    assert!(row.vector.is_empty());
}

#[test]
fn test_sparse_omitted_without_capability() {
    let normalizer = Normalizer::new(&dense_info(1), RowLayout::default());
    let mut record = raw("a", vec![1.0]);
    record.sparse = Some(SparseValues::from([(1, 0.5)]));
    let row = normalizer.normalize(record).unwrap();
    assert!(row.sparse_values.is_none());
}

#[test]
fn test_sparse_empty_map_with_capability() {
    let info = CollectionInfo {
        dimension: Some(1),
        sparse: true,
        ..Default::default()
    };
    let layout = RowLayout::for_collection(Backend::Pinecone, &info, false);
    let normalizer = Normalizer::new(&info, layout);
    let row = normalizer.normalize(raw("a", vec![1.0])).unwrap();
    assert_eq!(row.sparse_values, Some(SparseValues::new()));
}

#[test]
fn test_cross_references_only_when_layout_requests() {
    let info = CollectionInfo::default();
    let mut record = raw("a", vec![]);
    record.references = vec![CrossReference {
        referenced_class: "Author".to_string(),
        referenced_id: "x".to_string(),
    }];

    let off = Normalizer::new(&info, RowLayout::for_collection(Backend::Weaviate, &info, false));
    assert!(off.normalize(record.clone()).unwrap().cross_references.is_none());

    let on = Normalizer::new(&info, RowLayout::for_collection(Backend::Weaviate, &info, true));
    let refs = on.normalize(record).unwrap().cross_references.unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].referenced_class, "Author");
}

#[test]
fn test_id_field_detected_and_kept() {
    let normalizer = Normalizer::new(&CollectionInfo::default(), RowLayout::default());
    let mut record = raw("doc-7", vec![]);
    record.metadata = Metadata::from([
        ("title".to_string(), json!("Seven")),
        ("doc_id".to_string(), json!("doc-7")),
    ]);
    let row = normalizer.normalize(record).unwrap();
    assert_eq!(row.vector_id_field_name.as_deref(), Some("doc_id"));
    assert!(row.metadata.contains_key("doc_id"));
}

#[test]
fn test_id_field_detected_for_numeric_value() {
    let metadata = Metadata::from([("point".to_string(), json!(42))]);
    assert_eq!(detect_id_field("42", &metadata).as_deref(), Some("point"));
    assert_eq!(detect_id_field("43", &metadata), None);
}

#[test]
fn test_id_field_first_sorted_key_wins() {
    let metadata = Metadata::from([
        ("zid".to_string(), json!("a")),
        ("aid".to_string(), json!("a")),
    ]);
    assert_eq!(detect_id_field("a", &metadata).as_deref(), Some("aid"));
}

#[test]
fn test_parse_vector_success() {
    let value = json!([0.5, 1, -2.25]);
    assert_eq!(parse_vector(&value, "vector").unwrap(), vec![0.5, 1.0, -2.25]);
}

#[test]
fn test_parse_vector_not_array() {
    assert!(parse_vector(&json!("nope"), "vector").is_err());
    assert!(parse_vector(&json!([1.0, "x"]), "vector").is_err());
}

#[test]
fn test_sparse_from_parts_mismatch() {
    assert!(sparse_from_parts(&[1, 2], &[0.5]).is_err());
    let sparse = sparse_from_parts(&[3, 1], &[0.3, 0.1]).unwrap();
    assert_eq!(sparse.get(&3), Some(&0.3));
}

#[test]
fn test_metadata_from_json() {
    assert!(metadata_from_json(None).unwrap().is_empty());
    assert!(metadata_from_json(Some(json!(null))).unwrap().is_empty());
    let meta = metadata_from_json(Some(json!({"b": 1, "a": 2}))).unwrap();
    assert_eq!(meta.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert!(metadata_from_json(Some(json!([1, 2]))).is_err());
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn record_strategy(dim: usize) -> impl Strategy<Value = RawRecord> {
        (
            "[a-z0-9]{1,12}",
            proptest::collection::vec(-1.0f32..1.0, dim),
            proptest::option::of(proptest::collection::btree_map(0u32..1000, -1.0f32..1.0, 0..8)),
            proptest::collection::btree_map("[a-z]{1,6}", "[a-z0-9]{0,8}", 0..6),
        )
            .prop_map(|(id, vector, sparse, meta)| RawRecord {
                id,
                vector,
                sparse,
                metadata: meta.into_iter().map(|(k, v)| (k, json!(v))).collect(),
                references: vec![],
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: normalization is deterministic, down to serialized bytes
        #[test]
        fn prop_normalization_is_deterministic(
            (dim, record) in (1usize..16).prop_flat_map(|d| (Just(d), record_strategy(d))),
            sparse in any::<bool>(),
        ) {
            let info = CollectionInfo { dimension: Some(dim), sparse, ..Default::default() };
            let layout = RowLayout::for_collection(Backend::Qdrant, &info, false);
            let normalizer = Normalizer::new(&info, layout);

            let first = normalizer.normalize(record.clone()).unwrap();
            let second = normalizer.normalize(record).unwrap();

            prop_assert_eq!(&first, &second);
            prop_assert_eq!(
                serde_json::to_vec(&first).unwrap(),
                serde_json::to_vec(&second).unwrap()
            );
        }

        /// Property: sparse_values present iff the collection is sparse-capable
        #[test]
        fn prop_sparse_presence_follows_capability(
            record in record_strategy(3),
            sparse in any::<bool>(),
        ) {
            let info = CollectionInfo { dimension: Some(3), sparse, ..Default::default() };
            let layout = RowLayout::for_collection(Backend::Pinecone, &info, false);
            let row = Normalizer::new(&info, layout).normalize(record).unwrap();

            prop_assert_eq!(row.sparse_values.is_some(), sparse);
            prop_assert_eq!(row.vector.len(), 3);
            prop_assert!(!row.id.is_empty());
        }
    }
}
