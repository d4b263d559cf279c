//! Ordered hierarchical index over content nodes.
//!
//! The tree keeps a nested-interval labeling (`lft`/`rght` bounds) over the
//! whole forest so ancestor/descendant/range queries are single range scans.
//! Bounds are recomputed by one depth-first relabeling pass on every
//! structural change, inside one transaction, so readers never observe
//! overlapping intervals.

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::domain::{ContentKind, ContentNode, ContentTag, ObjectId};
use crate::error::{CatalogError, Result};

use super::db::Database;

const NODE_COLUMNS: &str = "id, parent_id, content_id, channel_id, title, description, kind, \
     sort_order, author, license_owner, license_id, lang_id, available, stemmed_metaphone, \
     lft, rght";

/// Hierarchy operations and range queries over content nodes.
pub struct CatalogTree<'a> {
    db: &'a Database,
}

impl<'a> CatalogTree<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Fetch a node by id.
    pub fn node(&self, id: &ObjectId) -> Result<ContentNode> {
        self.node_in(self.db.conn(), id)
    }

    /// Insert a node under `parent` (or as a forest root) and relabel.
    pub fn insert(&self, mut node: ContentNode, parent: Option<&ObjectId>) -> Result<ObjectId> {
        let _lock = self.db.exclusive_lock()?;

        node.parent = parent.cloned();
        let id = node.id.clone();

        self.db.immediate(|conn| {
            if let Some(parent_id) = &node.parent {
                let parent = self.node_in(conn, parent_id)?;
                if !parent.kind.is_topic() {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "node {} is a {} and cannot contain children",
                        parent.id, parent.kind
                    )));
                }
            }

            conn.execute(
                "INSERT INTO content_nodes (id, parent_id, content_id, channel_id, title, \
                 description, kind, sort_order, author, license_owner, license_id, lang_id, \
                 available, stemmed_metaphone, lft, rght) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, 0, 0)",
                params![
                    node.id,
                    node.parent,
                    node.content_id,
                    node.channel_id,
                    node.title,
                    node.description,
                    node.kind,
                    node.sort_order,
                    node.author,
                    node.license_owner,
                    node.license,
                    node.lang,
                    node.available,
                    node.stemmed_metaphone,
                ],
            )?;

            relabel(conn)
        })?;

        debug!("inserted node {}", id);
        Ok(id)
    }

    /// Re-parent a node and relabel.
    ///
    /// Moving a node into its own subtree (itself included) is rejected with
    /// `InvalidHierarchy`, as is moving under a leaf.
    pub fn move_node(&self, id: &ObjectId, new_parent: Option<&ObjectId>) -> Result<()> {
        let _lock = self.db.exclusive_lock()?;

        self.db.immediate(|conn| {
            let node = self.node_in(conn, id)?;

            if let Some(parent_id) = new_parent {
                let parent = self.node_in(conn, parent_id)?;
                if !parent.kind.is_topic() {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "node {} is a {} and cannot contain children",
                        parent.id, parent.kind
                    )));
                }
                // A parent inside the node's own interval would form a cycle
                if parent.lft >= node.lft && parent.rght <= node.rght {
                    return Err(CatalogError::InvalidHierarchy(format!(
                        "cannot move {} into its own subtree",
                        node.id
                    )));
                }
            }

            conn.execute(
                "UPDATE content_nodes SET parent_id = ?1 WHERE id = ?2",
                params![new_parent, id],
            )?;

            relabel(conn)
        })
    }

    /// Delete a node and its whole subtree; returns how many nodes went away.
    ///
    /// File rows, assessment metadata and edge rows cascade with their nodes.
    /// Local files are left alone; reconciliation reclaims them once
    /// unreferenced.
    pub fn delete_subtree(&self, id: &ObjectId) -> Result<usize> {
        let _lock = self.db.exclusive_lock()?;

        self.db.immediate(|conn| {
            let node = self.node_in(conn, id)?;

            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM content_nodes WHERE lft >= ?1 AND lft <= ?2",
                params![node.lft, node.rght],
                |r| r.get(0),
            )?;

            conn.execute("DELETE FROM content_nodes WHERE id = ?1", params![id])?;
            relabel(conn)?;

            debug!("deleted subtree of {} ({} nodes)", id, count);
            Ok(count as usize)
        })
    }

    /// Ancestors of a node, root first, excluding the node itself.
    pub fn ancestors(&self, id: &ObjectId) -> Result<Vec<ContentNode>> {
        let node = self.node(id)?;
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM content_nodes WHERE lft < ?1 AND rght > ?2 ORDER BY lft"
        ))?;
        let rows = stmt.query_map(params![node.lft, node.rght], row_to_node)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Direct children, ordered by `sort_order` (NULLs last) then id.
    pub fn children(&self, id: &ObjectId) -> Result<Vec<ContentNode>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM content_nodes WHERE parent_id = ?1 \
             ORDER BY sort_order IS NULL, sort_order, id"
        ))?;
        let rows = stmt.query_map(params![id], row_to_node)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Forest roots, same ordering as `children`.
    pub fn roots(&self) -> Result<Vec<ContentNode>> {
        let mut stmt = self.db.conn().prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM content_nodes WHERE parent_id IS NULL \
             ORDER BY sort_order IS NULL, sort_order, id"
        ))?;
        let rows = stmt.query_map([], row_to_node)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Distinct content ids of all non-topic nodes in the subtree, the node
    /// itself included when it is a leaf.
    ///
    /// This is the query progress tracking uses to mark substantially-similar
    /// copies as interacted-with.
    pub fn descendant_content_ids(&self, id: &ObjectId) -> Result<Vec<ObjectId>> {
        let node = self.node(id)?;
        let mut stmt = self.db.conn().prepare(
            "SELECT DISTINCT content_id FROM content_nodes \
             WHERE lft >= ?1 AND lft <= ?2 AND kind != ?3 ORDER BY content_id",
        )?;
        let rows = stmt.query_map(params![node.lft, node.rght, ContentKind::Topic], |r| {
            r.get(0)
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Set a node's availability and re-evaluate ancestors upward.
    ///
    /// A topic is available iff at least one child is available. The walk
    /// stops at the first ancestor whose flag does not change: when a topic
    /// stays available through another child, nothing above it can change
    /// either.
    pub fn propagate_availability(&self, id: &ObjectId, available: bool) -> Result<()> {
        self.db.immediate(|conn| {
            let node = self.node_in(conn, id)?;
            if node.available != available {
                conn.execute(
                    "UPDATE content_nodes SET available = ?1 WHERE id = ?2",
                    params![available, id],
                )?;
            }

            let mut current = node.parent;
            while let Some(parent_id) = current {
                let parent = self.node_in(conn, &parent_id)?;
                let any_child_available: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM content_nodes \
                     WHERE parent_id = ?1 AND available = 1)",
                    params![parent_id],
                    |r| r.get(0),
                )?;

                if parent.available == any_child_available {
                    break;
                }

                conn.execute(
                    "UPDATE content_nodes SET available = ?1 WHERE id = ?2",
                    params![any_child_available, parent_id],
                )?;
                current = parent.parent;
            }

            Ok(())
        })
    }

    /// Attach a tag to a node, creating the tag row if needed.
    pub fn add_tag(&self, node: &ObjectId, tag: &ContentTag) -> Result<()> {
        self.db.immediate(|conn| {
            self.node_in(conn, node)?;
            conn.execute(
                "INSERT OR IGNORE INTO content_tags (id, tag_name) VALUES (?1, ?2)",
                params![tag.id, tag.tag_name],
            )?;
            conn.execute(
                "INSERT OR IGNORE INTO node_tags (node_id, tag_id) VALUES (?1, ?2)",
                params![node, tag.id],
            )?;
            Ok(())
        })
    }

    pub fn tags(&self, node: &ObjectId) -> Result<Vec<ContentTag>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT t.id, t.tag_name FROM content_tags t \
             JOIN node_tags nt ON nt.tag_id = t.id WHERE nt.node_id = ?1 ORDER BY t.tag_name",
        )?;
        let rows = stmt.query_map(params![node], |r| {
            Ok(ContentTag {
                id: r.get(0)?,
                tag_name: r.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Record that `node` requires `required` first (directed edge).
    pub fn add_prerequisite(&self, node: &ObjectId, required: &ObjectId) -> Result<()> {
        if node == required {
            return Err(CatalogError::ConsistencyViolation(format!(
                "node {node} cannot be its own prerequisite"
            )));
        }
        self.db.immediate(|conn| {
            self.node_in(conn, node)?;
            self.node_in(conn, required)?;
            conn.execute(
                "INSERT OR IGNORE INTO node_prerequisites (node_id, required_id) VALUES (?1, ?2)",
                params![node, required],
            )?;
            Ok(())
        })
    }

    pub fn prerequisites(&self, node: &ObjectId) -> Result<Vec<ObjectId>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT required_id FROM node_prerequisites WHERE node_id = ?1 ORDER BY required_id",
        )?;
        let rows = stmt.query_map(params![node], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Record a symmetric related-content edge. Stored once per pair.
    pub fn add_related(&self, a: &ObjectId, b: &ObjectId) -> Result<()> {
        if a == b {
            return Err(CatalogError::ConsistencyViolation(format!(
                "node {a} cannot be related to itself"
            )));
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        self.db.immediate(|conn| {
            self.node_in(conn, a)?;
            self.node_in(conn, b)?;
            conn.execute(
                "INSERT OR IGNORE INTO node_related (first_id, second_id) VALUES (?1, ?2)",
                params![first, second],
            )?;
            Ok(())
        })
    }

    pub fn related(&self, node: &ObjectId) -> Result<Vec<ObjectId>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT CASE WHEN first_id = ?1 THEN second_id ELSE first_id END \
             FROM node_related WHERE first_id = ?1 OR second_id = ?1",
        )?;
        let rows = stmt.query_map(params![node], |r| r.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    fn node_in(&self, conn: &Connection, id: &ObjectId) -> Result<ContentNode> {
        conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM content_nodes WHERE id = ?1"),
            params![id],
            row_to_node,
        )
        .optional()?
        .ok_or_else(|| CatalogError::not_found("content node", id.as_str()))
    }
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<ContentNode> {
    Ok(ContentNode {
        id: row.get(0)?,
        parent: row.get(1)?,
        content_id: row.get(2)?,
        channel_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        kind: row.get(6)?,
        sort_order: row.get(7)?,
        author: row.get(8)?,
        license_owner: row.get(9)?,
        license: row.get(10)?,
        lang: row.get(11)?,
        available: row.get(12)?,
        stemmed_metaphone: row.get(13)?,
        lft: row.get(14)?,
        rght: row.get(15)?,
    })
}

/// One depth-first relabeling pass over the whole forest.
///
/// Children are visited in `sort_order` (NULLs last) then id order, so sibling
/// order in the interval labeling matches query order. Runs inside the
/// caller's transaction.
fn relabel(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT id, parent_id, sort_order FROM content_nodes")?;
    let rows: Vec<(String, Option<String>, Option<f64>)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
        .collect::<rusqlite::Result<_>>()?;

    let mut children: HashMap<Option<String>, Vec<(String, Option<f64>)>> = HashMap::new();
    for (id, parent, sort_order) in rows {
        children.entry(parent).or_default().push((id, sort_order));
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|a, b| match (a.1, b.1) {
            (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.0.cmp(&b.0)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
    }

    let mut bounds: Vec<(String, i64, i64)> = Vec::new();
    let mut counter: i64 = 1;
    let roots: Vec<String> = children
        .get(&None)
        .map(|v| v.iter().map(|(id, _)| id.clone()).collect())
        .unwrap_or_default();
    for root in roots {
        assign_bounds(&children, &root, &mut counter, &mut bounds);
    }

    let mut update = conn.prepare("UPDATE content_nodes SET lft = ?1, rght = ?2 WHERE id = ?3")?;
    for (id, lft, rght) in bounds {
        update.execute(params![lft, rght, id])?;
    }

    Ok(())
}

fn assign_bounds(
    children: &HashMap<Option<String>, Vec<(String, Option<f64>)>>,
    id: &str,
    counter: &mut i64,
    out: &mut Vec<(String, i64, i64)>,
) {
    let lft = *counter;
    *counter += 1;

    if let Some(kids) = children.get(&Some(id.to_string())) {
        for (child, _) in kids {
            assign_bounds(children, child, counter, out);
        }
    }

    let rght = *counter;
    *counter += 1;
    out.push((id.to_string(), lft, rght));
}
