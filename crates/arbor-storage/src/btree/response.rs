//! Operation response contract.
//!
//! The manager returns one [`OperationResponse`] per operation call, in
//! success and failure alike. External consumers replay `steps`, so this
//! shape must remain stable.

use serde::{Deserialize, Serialize};

use arbor_common::{ArborError, CompositeKey, Record};

use super::step::Step;

/// The operation a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Search,
    Insert,
    Update,
    Delete,
    RangeQuery,
}

/// Structured result of one tree operation, carrying the step trace for
/// replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    pub success: bool,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<CompositeKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Record>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<CompositeKey>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Record>>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResponse {
    /// Creates a success response with no payload fields set.
    pub fn success(operation: Operation, steps: Vec<Step>) -> Self {
        Self {
            success: true,
            operation,
            key: None,
            value: None,
            keys: None,
            values: None,
            steps,
            error: None,
        }
    }

    /// Creates a failure response carrying the partial step trace.
    pub fn failure(operation: Operation, error: &ArborError, steps: Vec<Step>) -> Self {
        Self {
            success: false,
            operation,
            key: None,
            value: None,
            keys: None,
            values: None,
            steps,
            error: Some(error.to_string()),
        }
    }

    /// Attaches the key the operation acted on.
    pub fn with_key(mut self, key: CompositeKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Attaches the record the operation returned or stored.
    pub fn with_value(mut self, value: Record) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches the ordered pairs a range query returned.
    pub fn with_pairs(mut self, pairs: Vec<(CompositeKey, Record)>) -> Self {
        let (keys, values) = pairs.into_iter().unzip();
        self.keys = Some(keys);
        self.values = Some(values);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_common::Column;

    #[test]
    fn test_operation_tags() {
        assert_eq!(
            serde_json::to_string(&Operation::RangeQuery).unwrap(),
            r#""RANGE_QUERY""#
        );
        assert_eq!(
            serde_json::to_string(&Operation::Search).unwrap(),
            r#""SEARCH""#
        );
    }

    #[test]
    fn test_success_response_omits_absent_fields() {
        let response = OperationResponse::success(Operation::Insert, vec![])
            .with_key(CompositeKey::single(Column::Int(1)));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""success":true"#));
        assert!(json.contains(r#""key":"#));
        assert!(!json.contains(r#""value""#));
        assert!(!json.contains(r#""error""#));

        let back: OperationResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, response);
    }

    #[test]
    fn test_failure_response_carries_error_and_steps() {
        let steps = vec![Step::CacheMiss { page_id: 1 }];
        let response =
            OperationResponse::failure(Operation::Delete, &ArborError::KeyNotFound, steps);
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Key not found"));
        assert_eq!(response.steps.len(), 1);
    }

    #[test]
    fn test_range_pairs_split_into_parallel_arrays() {
        let pairs = vec![
            (
                CompositeKey::single(Column::Int(1)),
                Record::new(vec![Column::Int(10)]),
            ),
            (
                CompositeKey::single(Column::Int(2)),
                Record::new(vec![Column::Int(20)]),
            ),
        ];
        let response = OperationResponse::success(Operation::RangeQuery, vec![]).with_pairs(pairs);
        assert_eq!(response.keys.as_ref().map(Vec::len), Some(2));
        assert_eq!(response.values.as_ref().map(Vec::len), Some(2));
    }
}
