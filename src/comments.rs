use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;

use crate::db::format_timestamp;
use crate::db::models::Comment;
use crate::error::{AppError, AppResult, OptionalRow};
use crate::identity::{expect_preview, PreviewMap, UserPreview};
use crate::posts;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentTree {
    pub comment: Comment,
    pub replies: Vec<CommentTree>,
}

impl CommentTree {
    /// Every author in this subtree.
    pub fn authors(&self, out: &mut Vec<i64>) {
        out.push(self.comment.user_id);
        for reply in &self.replies {
            reply.authors(out);
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub parent: Option<i64>,
    pub user: UserPreview,
    pub replies: Vec<CommentView>,
}

/// Add a comment. The post and `parent` checks share one transaction with
/// the insert, so nothing is written when either fails.
pub fn append(
    conn: &mut Connection,
    post_id: i64,
    user_id: i64,
    text: &str,
    parent: Option<i64>,
    at: DateTime<Utc>,
) -> AppResult<Comment> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::Validation("Text required.".into()));
    }
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    posts::ensure_exists(&tx, post_id)?;

    if let Some(parent_id) = parent {
        let parent_post: Option<i64> = tx
            .query_row(
                "SELECT post_id FROM comments WHERE id = ?1",
                params![parent_id],
                |row| row.get(0),
            )
            .optional()?;
        if parent_post != Some(post_id) {
            return Err(AppError::NotFound);
        }
    }

    tx.execute(
        "INSERT INTO comments (post_id, user_id, parent_id, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![post_id, user_id, parent, text, format_timestamp(at)],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    tracing::info!(comment_id = id, post_id, user_id, "Comment added");

    Ok(Comment {
        id,
        post_id,
        user_id,
        parent_id: parent,
        text: text.to_string(),
        created_at: at,
    })
}

/// Root comments oldest first, each with its replies attached recursively.
pub fn fetch_tree(conn: &Connection, post_id: i64) -> AppResult<Vec<CommentTree>> {
    posts::ensure_exists(conn, post_id)?;

    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM comments WHERE post_id = ?1 ORDER BY created_at ASC, id ASC",
        Comment::COLUMNS
    ))?;
    let comments = stmt
        .query_map(params![post_id], Comment::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(build_tree(comments))
}

/// Group by parent, then attach children from the roots down. Input order is
/// preserved within each level, so sorted input yields sorted levels.
fn build_tree(comments: Vec<Comment>) -> Vec<CommentTree> {
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for comment in comments {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    fn attach(parent: Option<i64>, children: &mut HashMap<Option<i64>, Vec<Comment>>) -> Vec<CommentTree> {
        let level = children.remove(&parent).unwrap_or_default();
        level
            .into_iter()
            .map(|comment| {
                let replies = attach(Some(comment.id), children);
                CommentTree { comment, replies }
            })
            .collect()
    }

    attach(None, &mut children)
}

pub fn count(conn: &Connection, post_id: i64) -> AppResult<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Delete a comment and, through the cascade, all of its replies. Allowed
/// for the comment's author and the post's author. Returns the post's
/// remaining comment count.
pub fn delete(conn: &Connection, comment_id: i64, requester: i64) -> AppResult<i64> {
    let (post_id, comment_author, post_author): (i64, i64, i64) = conn
        .query_row(
            "SELECT c.post_id, c.user_id, p.author_id
             FROM comments c JOIN posts p ON p.id = c.post_id
             WHERE c.id = ?1",
            params![comment_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .or_not_found()?;

    if requester != comment_author && requester != post_author {
        return Err(AppError::Forbidden);
    }

    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    tracing::info!(comment_id, post_id, requester, "Comment deleted");
    count(conn, post_id)
}

pub fn render(tree: &[CommentTree], previews: &PreviewMap) -> AppResult<Vec<CommentView>> {
    tree.iter()
        .map(|node| {
            Ok(CommentView {
                id: node.comment.id,
                text: node.comment.text.clone(),
                created_at: node.comment.created_at,
                parent: node.comment.parent_id,
                user: expect_preview(previews, node.comment.user_id)?,
                replies: render(&node.replies, previews)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{self, at};

    fn ids(level: &[CommentTree]) -> Vec<i64> {
        level.iter().map(|n| n.comment.id).collect()
    }

    #[test]
    fn empty_text_is_rejected_without_writing() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let post = testing::post(&conn, alice, "P", at(0));

        assert!(matches!(
            append(&mut conn, post, alice, "   \n", None, at(1)),
            Err(AppError::Validation(_))
        ));
        assert_eq!(count(&conn, post).unwrap(), 0);
    }

    #[test]
    fn text_is_trimmed() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let post = testing::post(&conn, alice, "P", at(0));
        let c = append(&mut conn, post, alice, "  hola  ", None, at(1)).unwrap();
        assert_eq!(c.text, "hola");
    }

    #[test]
    fn parent_from_another_post_is_rejected() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let p1 = testing::post(&conn, alice, "P1", at(0));
        let p2 = testing::post(&conn, alice, "P2", at(1));
        let on_p2 = append(&mut conn, p2, alice, "elsewhere", None, at(2)).unwrap();

        assert!(matches!(
            append(&mut conn, p1, alice, "reply", Some(on_p2.id), at(3)),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            append(&mut conn, p1, alice, "reply", Some(12345), at(3)),
            Err(AppError::NotFound)
        ));
        assert_eq!(count(&conn, p1).unwrap(), 0);
    }

    #[test]
    fn tree_nests_replies_regardless_of_insertion_order() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let post = testing::post(&conn, alice, "P", at(0));

        // Timestamps deliberately out of insertion order.
        let root_b = append(&mut conn, post, alice, "root b", None, at(20)).unwrap();
        let root_a = append(&mut conn, post, alice, "root a", None, at(10)).unwrap();
        let reply_late = append(&mut conn, post, alice, "late", Some(root_a.id), at(40)).unwrap();
        let reply_early = append(&mut conn, post, alice, "early", Some(root_a.id), at(30)).unwrap();
        let deep = append(&mut conn, post, alice, "deep", Some(reply_early.id), at(50)).unwrap();

        let tree = fetch_tree(&conn, post).unwrap();
        assert_eq!(ids(&tree), vec![root_a.id, root_b.id]);
        assert_eq!(ids(&tree[0].replies), vec![reply_early.id, reply_late.id]);
        assert_eq!(ids(&tree[0].replies[0].replies), vec![deep.id]);
        assert!(tree[1].replies.is_empty());
    }

    #[test]
    fn delete_permission_and_cascade() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let bob = testing::user(&conn, "bob");
        let carol = testing::user(&conn, "carol");
        let post = testing::post(&conn, alice, "P", at(0));

        let root = append(&mut conn, post, bob, "root", None, at(1)).unwrap();
        let reply = append(&mut conn, post, carol, "reply", Some(root.id), at(2)).unwrap();
        append(&mut conn, post, carol, "nested", Some(reply.id), at(3)).unwrap();
        let other = append(&mut conn, post, carol, "other", None, at(4)).unwrap();

        // Carol wrote neither the root nor the post.
        assert!(matches!(delete(&conn, root.id, carol), Err(AppError::Forbidden)));
        // Post author may delete anyone's comment; replies go with it.
        assert_eq!(delete(&conn, root.id, alice).unwrap(), 1);
        // Comment author may delete their own.
        assert_eq!(delete(&conn, other.id, carol).unwrap(), 0);
        assert!(matches!(delete(&conn, other.id, carol), Err(AppError::NotFound)));
    }

    #[test]
    fn authors_walks_the_whole_subtree() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let bob = testing::user(&conn, "bob");
        let post = testing::post(&conn, alice, "P", at(0));
        let root = append(&mut conn, post, alice, "root", None, at(1)).unwrap();
        append(&mut conn, post, bob, "reply", Some(root.id), at(2)).unwrap();

        let tree = fetch_tree(&conn, post).unwrap();
        let mut authors = Vec::new();
        tree[0].authors(&mut authors);
        assert_eq!(authors, vec![alice, bob]);
    }

    #[test]
    fn append_racing_a_post_delete_is_not_found() {
        let (_tmp, pool) = testing::file_pool();
        let (alice, post_ids) = {
            let conn = pool.get().unwrap();
            let alice = testing::user(&conn, "alice");
            let ids: Vec<i64> = (0..20).map(|i| testing::post(&conn, alice, "P", at(i))).collect();
            (alice, ids)
        };

        let deleter = {
            let pool = pool.clone();
            let post_ids = post_ids.clone();
            std::thread::spawn(move || {
                let mut conn = pool.get().unwrap();
                for id in post_ids {
                    posts::delete(&mut conn, id, alice).unwrap();
                }
            })
        };

        let mut conn = pool.get().unwrap();
        for &id in &post_ids {
            for n in 0..5 {
                match append(&mut conn, id, alice, "hola", None, at(100 + n)) {
                    Ok(_) | Err(AppError::NotFound) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }
        deleter.join().unwrap();

        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM comments", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }
}
