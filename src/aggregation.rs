use std::collections::{BTreeSet, HashMap};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::db::placeholders;
use crate::error::AppResult;

/// Size of the "most recent interactors" preview.
pub const SAMPLE_SIZE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Star,
    Comment,
    Repost,
    Share,
    Save,
}

/// Where a kind's rows live. Reposts are posts pointing at the original, so
/// their "post" column is `repost_of` and their "user" is the reposting author.
struct Source {
    table: &'static str,
    post_col: &'static str,
    user_col: &'static str,
}

impl AggregateKind {
    pub const ALL: [AggregateKind; 5] = [
        Self::Star,
        Self::Comment,
        Self::Repost,
        Self::Share,
        Self::Save,
    ];

    fn source(self) -> Source {
        let (table, post_col, user_col) = match self {
            Self::Star => ("post_stars", "post_id", "user_id"),
            Self::Comment => ("comments", "post_id", "user_id"),
            Self::Repost => ("posts", "repost_of", "author_id"),
            Self::Share => ("post_whatsapp_shares", "post_id", "user_id"),
            Self::Save => ("post_saves", "post_id", "user_id"),
        };
        Source {
            table,
            post_col,
            user_col,
        }
    }

    /// Whether `has` is computed for the viewer.
    pub fn tracks_viewer(self) -> bool {
        !matches!(self, Self::Comment)
    }

    /// Whether `sample` and `first` are computed.
    pub fn has_samples(self) -> bool {
        !matches!(self, Self::Comment)
    }
}

/// The {count, has, sample, first} bundle for one kind on one post.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection<U> {
    pub count: i64,
    pub has: bool,
    /// Up to [`SAMPLE_SIZE`] users, most recent first.
    pub sample: Vec<U>,
    /// The first user ever to interact.
    pub first: Option<U>,
}

impl<U> Default for Projection<U> {
    fn default() -> Self {
        Self {
            count: 0,
            has: false,
            sample: Vec::new(),
            first: None,
        }
    }
}

impl<U> Projection<U> {
    pub fn try_map<V, E>(&self, mut f: impl FnMut(&U) -> Result<V, E>) -> Result<Projection<V>, E> {
        Ok(Projection {
            count: self.count,
            has: self.has,
            sample: self.sample.iter().map(&mut f).collect::<Result<_, _>>()?,
            first: self.first.as_ref().map(&mut f).transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregates<U = i64> {
    pub stars: Projection<U>,
    pub comments: Projection<U>,
    pub reposts: Projection<U>,
    pub shares: Projection<U>,
    pub saves: Projection<U>,
}

impl<U> Default for Aggregates<U> {
    fn default() -> Self {
        Self {
            stars: Projection::default(),
            comments: Projection::default(),
            reposts: Projection::default(),
            shares: Projection::default(),
            saves: Projection::default(),
        }
    }
}

impl<U> Aggregates<U> {
    pub fn get(&self, kind: AggregateKind) -> &Projection<U> {
        match kind {
            AggregateKind::Star => &self.stars,
            AggregateKind::Comment => &self.comments,
            AggregateKind::Repost => &self.reposts,
            AggregateKind::Share => &self.shares,
            AggregateKind::Save => &self.saves,
        }
    }

    fn get_mut(&mut self, kind: AggregateKind) -> &mut Projection<U> {
        match kind {
            AggregateKind::Star => &mut self.stars,
            AggregateKind::Comment => &mut self.comments,
            AggregateKind::Repost => &mut self.reposts,
            AggregateKind::Share => &mut self.shares,
            AggregateKind::Save => &mut self.saves,
        }
    }
}

impl Aggregates<i64> {
    /// Every user id appearing in a sample or first slot.
    pub fn referenced_users(&self) -> impl Iterator<Item = i64> + '_ {
        AggregateKind::ALL.into_iter().flat_map(move |kind| {
            let p = self.get(kind);
            p.sample.iter().copied().chain(p.first)
        })
    }
}

/// Counts already known to the caller, e.g. zero for a post created this request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub stars: i64,
    pub comments: i64,
    pub reposts: i64,
    pub shares: i64,
    pub saves: i64,
}

impl Counts {
    pub fn get(&self, kind: AggregateKind) -> i64 {
        match kind {
            AggregateKind::Star => self.stars,
            AggregateKind::Comment => self.comments,
            AggregateKind::Repost => self.reposts,
            AggregateKind::Share => self.shares,
            AggregateKind::Save => self.saves,
        }
    }
}

/// Compute projections for every post in `post_ids`.
///
/// Each kind costs a fixed number of statements over the whole id set: one
/// grouped count, one windowed sample (newest three plus the oldest row per
/// post) and one viewer existence query. With no `viewer`, every `has` is false. If `known` covers every post the
/// grouped counts are taken from it instead of being re-queried.
pub fn aggregate(
    conn: &Connection,
    post_ids: &[i64],
    viewer: Option<i64>,
    known: Option<&HashMap<i64, Counts>>,
) -> AppResult<HashMap<i64, Aggregates>> {
    let ids: Vec<i64> = post_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut out: HashMap<i64, Aggregates> =
        ids.iter().map(|id| (*id, Aggregates::default())).collect();
    if ids.is_empty() {
        return Ok(out);
    }

    let known = known.filter(|k| ids.iter().all(|id| k.contains_key(id)));

    for kind in AggregateKind::ALL {
        match known {
            Some(known) => {
                for (id, agg) in out.iter_mut() {
                    if let Some(counts) = known.get(id) {
                        agg.get_mut(kind).count = counts.get(kind);
                    }
                }
            }
            None => grouped_counts(conn, kind, &ids, &mut out)?,
        }
        if let (Some(viewer), true) = (viewer, kind.tracks_viewer()) {
            viewer_flags(conn, kind, &ids, viewer, &mut out)?;
        }
        if kind.has_samples() {
            samples(conn, kind, &ids, &mut out)?;
        }
    }

    Ok(out)
}

fn id_values(leading: impl IntoIterator<Item = Value>, ids: &[i64]) -> Vec<Value> {
    leading
        .into_iter()
        .chain(ids.iter().map(|id| Value::Integer(*id)))
        .collect()
}

fn grouped_counts(
    conn: &Connection,
    kind: AggregateKind,
    ids: &[i64],
    out: &mut HashMap<i64, Aggregates>,
) -> AppResult<()> {
    let Source {
        table, post_col, ..
    } = kind.source();
    let mut stmt = conn.prepare(&format!(
        "SELECT {post_col}, COUNT(*) FROM {table}
         WHERE {post_col} IN ({}) GROUP BY {post_col}",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (post_id, count) = row?;
        if let Some(agg) = out.get_mut(&post_id) {
            agg.get_mut(kind).count = count;
        }
    }
    Ok(())
}

fn viewer_flags(
    conn: &Connection,
    kind: AggregateKind,
    ids: &[i64],
    viewer: i64,
    out: &mut HashMap<i64, Aggregates>,
) -> AppResult<()> {
    let Source {
        table,
        post_col,
        user_col,
    } = kind.source();
    let mut stmt = conn.prepare(&format!(
        "SELECT DISTINCT {post_col} FROM {table}
         WHERE {user_col} = ? AND {post_col} IN ({})",
        placeholders(ids.len())
    ))?;
    let rows = stmt.query_map(
        params_from_iter(id_values([Value::Integer(viewer)], ids)),
        |row| row.get::<_, i64>(0),
    )?;
    for row in rows {
        if let Some(agg) = out.get_mut(&row?) {
            agg.get_mut(kind).has = true;
        }
    }
    Ok(())
}

fn samples(
    conn: &Connection,
    kind: AggregateKind,
    ids: &[i64],
    out: &mut HashMap<i64, Aggregates>,
) -> AppResult<()> {
    let Source {
        table,
        post_col,
        user_col,
    } = kind.source();
    let mut stmt = conn.prepare(&format!(
        "SELECT post_id, user_id, rn_recent, rn_oldest FROM (
             SELECT {post_col} AS post_id, {user_col} AS user_id,
                    ROW_NUMBER() OVER (PARTITION BY {post_col} ORDER BY created_at DESC, id DESC) AS rn_recent,
                    ROW_NUMBER() OVER (PARTITION BY {post_col} ORDER BY created_at ASC, id ASC) AS rn_oldest
             FROM {table}
             WHERE {post_col} IN ({})
         )
         WHERE rn_recent <= ? OR rn_oldest = 1
         ORDER BY post_id, rn_recent",
        placeholders(ids.len())
    ))?;
    let mut values = id_values([], ids);
    values.push(Value::Integer(SAMPLE_SIZE));

    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    for row in rows {
        let (post_id, user_id, rn_recent, rn_oldest) = row?;
        let Some(agg) = out.get_mut(&post_id) else {
            continue;
        };
        let projection = agg.get_mut(kind);
        if rn_recent <= SAMPLE_SIZE {
            projection.sample.push(user_id);
        }
        if rn_oldest == 1 {
            projection.first = Some(user_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comments;
    use crate::db::testing::{self, at};
    use crate::interactions::{self, InteractionKind};
    use crate::reposts;

    struct World {
        conn: Connection,
        users: Vec<i64>,
    }

    fn world(n_users: usize) -> World {
        let conn = testing::conn();
        let users = (0..n_users)
            .map(|i| testing::user(&conn, &format!("user{i}")))
            .collect();
        World { conn, users }
    }

    #[test]
    fn empty_post_yields_empty_projections() {
        let w = world(1);
        let post = testing::post(&w.conn, w.users[0], "quiet", at(0));

        let result = aggregate(&w.conn, &[post], Some(w.users[0]), None).unwrap();
        assert_eq!(result[&post], Aggregates::default());
    }

    #[test]
    fn counts_flags_samples_and_first_per_post() {
        let mut w = world(6);
        let author = w.users[0];
        let p1 = testing::post(&w.conn, author, "p1", at(0));
        let p2 = testing::post(&w.conn, author, "p2", at(1));

        // Five starrers on p1, one on p2.
        for (i, user) in w.users[1..].iter().enumerate() {
            interactions::apply(&mut w.conn, InteractionKind::Star, p1, *user, at(10 + i as i64))
                .unwrap();
        }
        interactions::apply(&mut w.conn, InteractionKind::Star, p2, w.users[2], at(30)).unwrap();
        interactions::apply(&mut w.conn, InteractionKind::Share, p1, w.users[3], at(40)).unwrap();
        comments::append(&mut w.conn, p1, w.users[4], "c", None, at(50)).unwrap();

        let viewer = w.users[2];
        let result = aggregate(&w.conn, &[p1, p2], Some(viewer), None).unwrap();

        let stars = &result[&p1].stars;
        assert_eq!(stars.count, 5);
        assert!(stars.has);
        assert_eq!(stars.sample, vec![w.users[5], w.users[4], w.users[3]]);
        assert_eq!(stars.first, Some(w.users[1]));

        assert_eq!(result[&p1].shares.count, 1);
        assert!(!result[&p1].shares.has);
        assert_eq!(result[&p1].comments.count, 1);
        assert!(result[&p1].comments.sample.is_empty());

        let p2_stars = &result[&p2].stars;
        assert_eq!(p2_stars.count, 1);
        assert!(p2_stars.has);
        assert_eq!(p2_stars.sample, vec![w.users[2]]);
        assert_eq!(p2_stars.first, Some(w.users[2]));
        assert_eq!(result[&p2].shares, Projection::default());
    }

    #[test]
    fn no_viewer_means_no_flags() {
        let mut w = world(2);
        let post = testing::post(&w.conn, w.users[0], "p", at(0));
        interactions::apply(&mut w.conn, InteractionKind::Save, post, w.users[1], at(1)).unwrap();

        let result = aggregate(&w.conn, &[post], None, None).unwrap();
        assert_eq!(result[&post].saves.count, 1);
        assert!(!result[&post].saves.has);
    }

    #[test]
    fn reposts_are_read_from_the_post_store() {
        let mut w = world(3);
        let original = testing::post(&w.conn, w.users[0], "orig", at(0));
        reposts::repost(&mut w.conn, original, w.users[1], "", at(1)).unwrap();
        let later = reposts::repost(&mut w.conn, original, w.users[2], "", at(2)).unwrap();

        let result = aggregate(&w.conn, &[original, later.repost_id], Some(w.users[1]), None).unwrap();
        let reposts = &result[&original].reposts;
        assert_eq!(reposts.count, 2);
        assert!(reposts.has);
        assert_eq!(reposts.sample, vec![w.users[2], w.users[1]]);
        assert_eq!(reposts.first, Some(w.users[1]));
        // The repost is a post of its own with no interactions yet.
        assert_eq!(result[&later.repost_id], Aggregates::default());
    }

    #[test]
    fn toggled_off_rows_do_not_appear() {
        let mut w = world(3);
        let post = testing::post(&w.conn, w.users[0], "p", at(0));
        interactions::apply(&mut w.conn, InteractionKind::Star, post, w.users[1], at(1)).unwrap();
        interactions::apply(&mut w.conn, InteractionKind::Star, post, w.users[2], at(2)).unwrap();
        interactions::apply(&mut w.conn, InteractionKind::Star, post, w.users[1], at(3)).unwrap();

        let stars = aggregate(&w.conn, &[post], None, None).unwrap()[&post].stars.clone();
        assert_eq!(stars.count, 1);
        assert_eq!(stars.sample, vec![w.users[2]]);
        assert_eq!(stars.first, Some(w.users[2]));
    }

    #[test]
    fn known_counts_short_circuit_only_when_complete() {
        let mut w = world(2);
        let p1 = testing::post(&w.conn, w.users[0], "p1", at(0));
        let p2 = testing::post(&w.conn, w.users[0], "p2", at(1));
        interactions::apply(&mut w.conn, InteractionKind::Star, p1, w.users[1], at(2)).unwrap();

        let fake = Counts {
            stars: 42,
            ..Counts::default()
        };
        let all: HashMap<i64, Counts> = [(p1, fake), (p2, Counts::default())].into();
        let used = aggregate(&w.conn, &[p1, p2], None, Some(&all)).unwrap();
        assert_eq!(used[&p1].stars.count, 42);
        // Samples are still live.
        assert_eq!(used[&p1].stars.sample, vec![w.users[1]]);

        let partial: HashMap<i64, Counts> = [(p1, fake)].into();
        let ignored = aggregate(&w.conn, &[p1, p2], None, Some(&partial)).unwrap();
        assert_eq!(ignored[&p1].stars.count, 1);
    }

    #[test]
    fn many_posts_in_one_call() {
        let mut w = world(4);
        let posts: Vec<i64> = (0..60)
            .map(|i| testing::post(&w.conn, w.users[0], "bulk", at(i)))
            .collect();
        for (i, post) in posts.iter().enumerate() {
            let user = w.users[1 + i % 3];
            interactions::apply(&mut w.conn, InteractionKind::Save, *post, user, at(100 + i as i64))
                .unwrap();
        }

        let result = aggregate(&w.conn, &posts, Some(w.users[1]), None).unwrap();
        assert_eq!(result.len(), 60);
        for (i, post) in posts.iter().enumerate() {
            let saves = &result[post].saves;
            assert_eq!(saves.count, 1);
            assert_eq!(saves.has, i % 3 == 0);
            assert_eq!(saves.sample.len(), 1);
        }
    }

    #[test]
    fn referenced_users_covers_samples_and_firsts() {
        let mut agg = Aggregates::<i64>::default();
        agg.stars.sample = vec![1, 2];
        agg.stars.first = Some(3);
        agg.saves.first = Some(4);
        let mut users: Vec<i64> = agg.referenced_users().collect();
        users.sort();
        assert_eq!(users, vec![1, 2, 3, 4]);
    }
}
