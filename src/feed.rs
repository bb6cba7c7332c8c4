use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::config::FeedConfig;
use crate::db::models::PostRow;
use crate::error::AppResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Own(i64),
    Global,
    SavedBy(i64),
}

/// Raw query-string values. Anything unparseable falls back to the default.
#[derive(Deserialize, Debug, Default)]
pub struct PaginationParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub fn from_params(params: &PaginationParams, config: &FeedConfig) -> Self {
        let max = i64::from(config.max_page_size.max(1));
        let limit = params
            .limit
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(i64::from(config.page_size))
            .clamp(1, max);
        let offset = params
            .offset
            .as_deref()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(0)
            .max(0);
        Self { limit, offset }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageOf<T> {
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<T>,
}

impl<T> PageOf<T> {
    pub fn with_results<U>(self, results: Vec<U>) -> PageOf<U> {
        PageOf {
            count: self.count,
            limit: self.limit,
            offset: self.offset,
            results,
        }
    }
}

pub fn select(conn: &Connection, selection: Selection, page: Page) -> AppResult<PageOf<PostRow>> {
    let (from, filter, order, owner) = match selection {
        Selection::Own(user) => (
            "posts p",
            "WHERE p.author_id = ?",
            "p.created_at DESC, p.id DESC",
            Some(user),
        ),
        Selection::Global => ("posts p", "", "p.created_at DESC, p.id DESC", None),
        Selection::SavedBy(user) => (
            "post_saves s JOIN posts p ON p.id = s.post_id",
            "WHERE s.user_id = ?",
            "s.created_at DESC, p.created_at DESC, p.id DESC",
            Some(user),
        ),
    };
    let mut values: Vec<Value> = owner.into_iter().map(Value::Integer).collect();

    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {from} {filter}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    values.push(Value::Integer(page.limit));
    values.push(Value::Integer(page.offset));
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {from} {filter} ORDER BY {order} LIMIT ? OFFSET ?",
        PostRow::COLUMNS
    ))?;
    let results = stmt
        .query_map(params_from_iter(values.iter()), PostRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PageOf {
        count,
        limit: page.limit,
        offset: page.offset,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{self, at};
    use crate::interactions::{self, InteractionKind};

    fn params(limit: Option<&str>, offset: Option<&str>) -> PaginationParams {
        PaginationParams {
            limit: limit.map(String::from),
            offset: offset.map(String::from),
        }
    }

    fn ids(page: &PageOf<PostRow>) -> Vec<i64> {
        page.results.iter().map(|p| p.id).collect()
    }

    #[test]
    fn page_parsing_is_lenient_and_clamped() {
        let config = FeedConfig::default();
        assert_eq!(
            Page::from_params(&params(None, None), &config),
            Page { limit: 20, offset: 0 }
        );
        assert_eq!(
            Page::from_params(&params(Some("abc"), Some("-5")), &config),
            Page { limit: 20, offset: 0 }
        );
        assert_eq!(Page::from_params(&params(Some("0"), None), &config).limit, 1);
        assert_eq!(Page::from_params(&params(Some("5000"), None), &config).limit, 100);
        assert_eq!(
            Page::from_params(&params(Some(" 7 "), Some("3")), &config),
            Page { limit: 7, offset: 3 }
        );
    }

    #[test]
    fn own_and_global_are_newest_first_with_id_tiebreak() {
        let conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let bob = testing::user(&conn, "bob");
        let a1 = testing::post(&conn, alice, "a1", at(0));
        let b1 = testing::post(&conn, bob, "b1", at(5));
        // Same timestamp as b1: higher id first.
        let a2 = testing::post(&conn, alice, "a2", at(5));

        let page = Page { limit: 10, offset: 0 };
        let own = select(&conn, Selection::Own(alice), page).unwrap();
        assert_eq!(ids(&own), vec![a2, a1]);
        assert_eq!(own.count, 2);

        let global = select(&conn, Selection::Global, page).unwrap();
        assert_eq!(ids(&global), vec![a2, b1, a1]);
        assert_eq!(global.count, 3);
    }

    #[test]
    fn pagination_slices_but_count_is_total() {
        let conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let posts: Vec<i64> = (0..5)
            .map(|i| testing::post(&conn, alice, "p", at(i)))
            .collect();

        let page = select(&conn, Selection::Global, Page { limit: 2, offset: 1 }).unwrap();
        assert_eq!(page.count, 5);
        assert_eq!(ids(&page), vec![posts[3], posts[2]]);

        let past_end = select(&conn, Selection::Global, Page { limit: 2, offset: 10 }).unwrap();
        assert_eq!(past_end.count, 5);
        assert!(past_end.results.is_empty());
    }

    #[test]
    fn saved_orders_by_save_time() {
        let mut conn = testing::conn();
        let alice = testing::user(&conn, "alice");
        let bob = testing::user(&conn, "bob");
        let old = testing::post(&conn, alice, "old", at(0));
        let new = testing::post(&conn, alice, "new", at(1));
        let unsaved = testing::post(&conn, alice, "unsaved", at(2));

        interactions::apply(&mut conn, InteractionKind::Save, new, bob, at(10)).unwrap();
        interactions::apply(&mut conn, InteractionKind::Save, old, bob, at(20)).unwrap();
        interactions::apply(&mut conn, InteractionKind::Save, unsaved, alice, at(30)).unwrap();

        let saved = select(&conn, Selection::SavedBy(bob), Page { limit: 10, offset: 0 }).unwrap();
        assert_eq!(ids(&saved), vec![old, new]);
        assert_eq!(saved.count, 2);
    }
}
