//! Assessment metadata for practice and quiz content.

use serde_json::Value;

use crate::error::{CatalogError, Result};

use super::id::ObjectId;

/// Extra metadata for leaf nodes that probe a learner's knowledge.
///
/// 1:1 with its content node. The `number_of_assessments` field is a
/// convenience copy of the item list length and must always match it.
#[derive(Debug, Clone)]
pub struct AssessmentMetaData {
    pub id: ObjectId,

    /// The exercise/quiz node this metadata describes
    pub node: ObjectId,

    /// Ordered question ids the assessment can present
    pub assessment_item_ids: Vec<String>,

    /// Must equal `assessment_item_ids.len()`
    pub number_of_assessments: i64,

    /// Mastery model descriptor, e.g. `{"type": "m_of_n", "m": 5, "n": 7}`
    pub mastery_model: Value,

    /// Present questions in random order at read time. Storage order is
    /// never shuffled.
    pub randomize: bool,

    /// Usable in coach previews and summative/formative tests
    pub is_manipulable: bool,
}

impl AssessmentMetaData {
    pub fn new(node: ObjectId, assessment_item_ids: Vec<String>) -> Self {
        let number_of_assessments = assessment_item_ids.len() as i64;
        Self {
            id: ObjectId::random(),
            node,
            assessment_item_ids,
            number_of_assessments,
            mastery_model: Value::Object(Default::default()),
            randomize: false,
            is_manipulable: false,
        }
    }

    pub fn with_mastery_model(mut self, model: Value) -> Self {
        self.mastery_model = model;
        self
    }

    pub fn randomized(mut self) -> Self {
        self.randomize = true;
        self
    }

    /// Enforce the count invariant.
    pub fn validate(&self) -> Result<()> {
        if self.number_of_assessments != self.assessment_item_ids.len() as i64 {
            return Err(CatalogError::ConsistencyViolation(format!(
                "assessment count {} does not match {} item ids for node {}",
                self.number_of_assessments,
                self.assessment_item_ids.len(),
                self.node
            )));
        }
        Ok(())
    }
}
