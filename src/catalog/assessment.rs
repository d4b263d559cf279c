//! Assessment metadata attached to practice/quiz leaves.

use rusqlite::{params, OptionalExtension};

use crate::domain::{AssessmentMetaData, ContentKind, ObjectId};
use crate::error::{CatalogError, Result};

use super::db::Database;

/// Lookup and write access to per-node assessment metadata.
pub struct AssessmentIndex<'a> {
    db: &'a Database,
}

impl<'a> AssessmentIndex<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Attach metadata to its node, replacing any previous record.
    ///
    /// Enforces the count invariant and rejects topics; containers do not
    /// carry questions.
    pub fn attach(&self, meta: &AssessmentMetaData) -> Result<()> {
        meta.validate()?;

        self.db.immediate(|conn| {
            let kind: Option<ContentKind> = conn
                .query_row(
                    "SELECT kind FROM content_nodes WHERE id = ?1",
                    params![meta.node],
                    |r| r.get(0),
                )
                .optional()?;

            match kind {
                None => {
                    return Err(CatalogError::not_found("content node", meta.node.as_str()))
                }
                Some(k) if k.is_topic() => {
                    return Err(CatalogError::ConsistencyViolation(format!(
                        "cannot attach assessment metadata to topic {}",
                        meta.node
                    )))
                }
                Some(_) => {}
            }

            let item_ids = serde_json::to_string(&meta.assessment_item_ids)?;
            let mastery = serde_json::to_string(&meta.mastery_model)?;

            conn.execute(
                "INSERT INTO assessment_metadata (id, node_id, assessment_item_ids, \
                 number_of_assessments, mastery_model, randomize, is_manipulable) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(node_id) DO UPDATE SET \
                 assessment_item_ids = excluded.assessment_item_ids, \
                 number_of_assessments = excluded.number_of_assessments, \
                 mastery_model = excluded.mastery_model, \
                 randomize = excluded.randomize, \
                 is_manipulable = excluded.is_manipulable",
                params![
                    meta.id,
                    meta.node,
                    item_ids,
                    meta.number_of_assessments,
                    mastery,
                    meta.randomize,
                    meta.is_manipulable,
                ],
            )?;
            Ok(())
        })
    }

    /// Metadata for a node, or `None` when the node has none.
    pub fn get(&self, node: &ObjectId) -> Result<Option<AssessmentMetaData>> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, node_id, assessment_item_ids, number_of_assessments, mastery_model, \
                 randomize, is_manipulable FROM assessment_metadata WHERE node_id = ?1",
                params![node],
                |r| {
                    Ok((
                        r.get::<_, ObjectId>(0)?,
                        r.get::<_, ObjectId>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, i64>(3)?,
                        r.get::<_, String>(4)?,
                        r.get::<_, bool>(5)?,
                        r.get::<_, bool>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, node, item_ids, count, mastery, randomize, manipulable)) = row else {
            return Ok(None);
        };

        Ok(Some(AssessmentMetaData {
            id,
            node,
            assessment_item_ids: serde_json::from_str(&item_ids)?,
            number_of_assessments: count,
            mastery_model: serde_json::from_str(&mastery)?,
            randomize,
            is_manipulable: manipulable,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogTree;
    use crate::domain::ContentNode;
    use serde_json::json;
    use tempfile::TempDir;

    fn exercise_node(db: &Database) -> (ObjectId, ObjectId) {
        let tree = CatalogTree::new(db);
        let channel = ObjectId::random();
        let root = tree
            .insert(
                ContentNode::new("Root", ContentKind::Topic, channel.clone()),
                None,
            )
            .unwrap();
        let ex = tree
            .insert(
                ContentNode::new("Practice", ContentKind::Exercise, channel),
                Some(&root),
            )
            .unwrap();
        (root, ex)
    }

    #[test]
    fn test_attach_and_get_round_trip() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let (_root, ex) = exercise_node(&db);
        let index = AssessmentIndex::new(&db);

        let meta = AssessmentMetaData::new(ex.clone(), vec!["q1".into(), "q2".into()])
            .with_mastery_model(json!({"type": "m_of_n", "m": 5, "n": 7}))
            .randomized();
        index.attach(&meta).unwrap();

        let loaded = index.get(&ex).unwrap().unwrap();
        assert_eq!(loaded.assessment_item_ids, vec!["q1", "q2"]);
        assert_eq!(loaded.number_of_assessments, 2);
        assert_eq!(loaded.mastery_model["m"], 5);
        assert!(loaded.randomize);
    }

    #[test]
    fn test_attach_rejects_count_mismatch() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let (_root, ex) = exercise_node(&db);
        let index = AssessmentIndex::new(&db);

        let mut meta = AssessmentMetaData::new(ex, vec!["q1".into()]);
        meta.number_of_assessments = 3;
        assert!(matches!(
            index.attach(&meta),
            Err(CatalogError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn test_attach_rejects_topics() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let (root, _ex) = exercise_node(&db);
        let index = AssessmentIndex::new(&db);

        let meta = AssessmentMetaData::new(root, vec!["q1".into()]);
        assert!(matches!(
            index.attach(&meta),
            Err(CatalogError::ConsistencyViolation(_))
        ));
    }

    #[test]
    fn test_get_absent_is_none() {
        let temp = TempDir::new().unwrap();
        let db = Database::open(&temp.path().join("catalog.db")).unwrap();
        let (_root, ex) = exercise_node(&db);
        let index = AssessmentIndex::new(&db);

        assert!(index.get(&ex).unwrap().is_none());
    }
}
