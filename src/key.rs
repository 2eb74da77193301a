//! Canonical cache keys for document-store queries.
//!
//! A key starts with the collection path so pattern lookup and substring invalidation
//! work on it directly. Constraints are sorted, so two queries that differ only in the
//! order their filters were added share a key:
//!
//! ```text
//! games/2025|where:team=KC,week=3|order:kickoff.asc|limit:20
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    path: String,
    filters: Vec<(String, String, String)>,
    order: Vec<(String, Direction)>,
    limit: Option<usize>,
}

impl CacheKey {
    /// Starts a key for `collection`; leading and trailing slashes are dropped.
    pub fn collection(collection: impl AsRef<str>) -> Self {
        Self {
            path: collection.as_ref().trim_matches('/').to_owned(),
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
        }
    }

    /// Narrows to one document or subcollection segment.
    #[must_use]
    pub fn doc(mut self, id: impl fmt::Display) -> Self {
        self.path.push('/');
        self.path.push_str(&id.to_string());
        self
    }

    /// Equality constraint.
    #[must_use]
    pub fn filter(self, field: impl Into<String>, value: impl fmt::Display) -> Self {
        self.filter_op(field, "=", value)
    }

    /// Constraint with an explicit operator such as `>=` or `in`.
    #[must_use]
    pub fn filter_op(mut self, field: impl Into<String>, op: &str, value: impl fmt::Display) -> Self {
        self.filters.push((field.into(), op.to_owned(), value.to_string()));
        self
    }

    /// Order clauses keep their insertion order; it changes the result.
    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, dir: Direction) -> Self {
        self.order.push((field.into(), dir));
        self
    }

    #[must_use]
    pub const fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    #[must_use]
    pub fn build(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.filters.is_empty() {
            let mut filters: Vec<_> = self.filters.iter().collect();
            filters.sort();
            filters.dedup();
            f.write_str("|where:")?;
            for (i, (field, op, value)) in filters.into_iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{field}{op}{value}")?;
            }
        }
        if !self.order.is_empty() {
            f.write_str("|order:")?;
            for (i, (field, dir)) in self.order.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{field}.{}", dir.as_str())?;
            }
        }
        if let Some(n) = self.limit {
            write!(f, "|limit:{n}")?;
        }
        Ok(())
    }
}

impl From<CacheKey> for String {
    fn from(k: CacheKey) -> Self {
        k.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_order_does_not_change_key() {
        let a = CacheKey::collection("games").filter("week", 3).filter("team", "KC").build();
        let b = CacheKey::collection("/games/").filter("team", "KC").filter("week", 3).build();
        assert_eq!(a, b);
        assert_eq!(a, "games|where:team=KC,week=3");
    }

    #[test]
    fn full_query_renders_readably() {
        let k = CacheKey::collection("players")
            .doc("qb")
            .filter_op("rating", ">=", 90)
            .order_by("rating", Direction::Desc)
            .order_by("name", Direction::Asc)
            .limit(10)
            .build();
        assert_eq!(k, "players/qb|where:rating>=90|order:rating.desc,name.asc|limit:10");
    }

    #[test]
    fn order_clauses_are_significant() {
        let a = CacheKey::collection("t").order_by("a", Direction::Asc).order_by("b", Direction::Asc);
        let b = CacheKey::collection("t").order_by("b", Direction::Asc).order_by("a", Direction::Asc);
        assert_ne!(a.build(), b.build());
    }
}
