//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use docudb_core::{Array, Dictionary, Timestamp, Value};
use proptest::prelude::*;

/// Strategy for generating valid document ids.
pub fn doc_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9][a-zA-Z0-9_:-]{0,31}").expect("Invalid regex")
}

/// Strategy for generating keys that are not reserved.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9]{0,11}").expect("Invalid regex")
}

/// Strategy for leaf values (everything except dictionaries and arrays).
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1.0e12f64..1.0e12).prop_map(Value::Float),
        ".{0,24}".prop_map(Value::String),
        (0i64..4_102_444_800_000).prop_map(|ms| Value::Date(Timestamp::from_millis(ms))),
    ]
}

/// Strategy for arbitrary valid values, nested up to a few levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6)
                .prop_map(|items| Value::Array(items.into_iter().collect::<Array>())),
            prop::collection::vec((key_strategy(), inner), 0..6).prop_map(|pairs| {
                Value::Dictionary(pairs.into_iter().collect::<Dictionary>())
            }),
        ]
    })
}

/// Strategy for document bodies that pass validation.
pub fn body_strategy() -> impl Strategy<Value = Dictionary> {
    prop::collection::vec((key_strategy(), value_strategy()), 0..8)
        .prop_map(|pairs| pairs.into_iter().collect())
}

/// Operations for model-based tests.
#[derive(Debug, Clone)]
pub enum DocumentOperation {
    /// Save a body under an id.
    Save {
        /// Document id.
        id: String,
        /// New body.
        body: Dictionary,
    },
    /// Delete a document.
    Delete {
        /// Document id.
        id: String,
    },
    /// Read a document.
    Get {
        /// Document id.
        id: String,
    },
}

/// Ids drawn from a small pool, so operations collide.
fn pooled_id_strategy() -> impl Strategy<Value = String> {
    (0usize..8).prop_map(crate::fixtures::doc_id)
}

/// Strategy for generating document operations.
pub fn document_operation_strategy() -> impl Strategy<Value = DocumentOperation> {
    prop_oneof![
        3 => (pooled_id_strategy(), body_strategy())
            .prop_map(|(id, body)| DocumentOperation::Save { id, body }),
        1 => pooled_id_strategy().prop_map(|id| DocumentOperation::Delete { id }),
        2 => pooled_id_strategy().prop_map(|id| DocumentOperation::Get { id }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<DocumentOperation>> {
    prop::collection::vec(document_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::{Database, Document};
    use std::collections::HashMap;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_values_validate(value in value_strategy()) {
            prop_assert!(value.validate("v").is_ok());
        }

        #[test]
        fn saved_bodies_read_back_equal(id in doc_id_strategy(), body in body_strategy()) {
            let db = Database::open_in_memory("prop").unwrap();
            db.save(&Document::with_data(id.clone(), body.clone())).unwrap();
            let loaded = db.get_document(&id).unwrap().unwrap();
            prop_assert_eq!(loaded.to_dictionary(), body);
        }

        #[test]
        fn store_matches_model(ops in operation_sequence_strategy(1, 40)) {
            let db = Database::open_in_memory("model").unwrap();
            let mut model: HashMap<String, Dictionary> = HashMap::new();

            for op in ops {
                match op {
                    DocumentOperation::Save { id, body } => {
                        db.save(&Document::with_data(id.clone(), body.clone())).unwrap();
                        model.insert(id, body);
                    }
                    DocumentOperation::Delete { id } => {
                        let existing = db.get_document(&id).unwrap();
                        match existing {
                            Some(doc) => {
                                db.delete(&doc).unwrap();
                                model.remove(&id);
                            }
                            None => prop_assert!(!model.contains_key(&id)),
                        }
                    }
                    DocumentOperation::Get { id } => {
                        let got = db.get_document(&id).unwrap().map(|d| d.to_dictionary());
                        prop_assert_eq!(got.as_ref(), model.get(&id));
                    }
                }
            }
            prop_assert_eq!(db.count(), model.len() as u64);
        }
    }
}
