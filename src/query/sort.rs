//! Local sort
//!
//! Buffers the whole upstream on the first pull, then yields in key order.
//! Keys compare lexicographically under the total value order; ties may come
//! out in any order.

use std::cmp::Ordering;

use super::errors::QueryResult;
use super::stream::{field_or_null, BoxRowStream, RowFuture, RowStream};
use crate::remote::SortKey;
use crate::value::{total_cmp, Value};

pub(crate) struct SortStream {
    upstream: BoxRowStream,
    keys: Vec<SortKey>,
    sorted: Option<std::vec::IntoIter<Value>>,
}

impl SortStream {
    pub(crate) fn new(upstream: BoxRowStream, keys: Vec<SortKey>) -> Self {
        Self {
            upstream,
            keys,
            sorted: None,
        }
    }

    async fn fill(&mut self) -> QueryResult<std::vec::IntoIter<Value>> {
        let mut buffer: Vec<(Vec<Value>, Value)> = Vec::new();
        while let Some(item) = self.upstream.next().await? {
            let key = self
                .keys
                .iter()
                .map(|k| field_or_null(&item, &k.field_name))
                .collect::<QueryResult<Vec<_>>>()?;
            buffer.push((key, item));
        }

        let keys = &self.keys;
        buffer.sort_unstable_by(|a, b| compare_keys(keys, &a.0, &b.0));
        Ok(buffer
            .into_iter()
            .map(|(_, item)| item)
            .collect::<Vec<_>>()
            .into_iter())
    }
}

/// Lexicographic comparison of extracted key tuples
pub(crate) fn compare_keys(keys: &[SortKey], a: &[Value], b: &[Value]) -> Ordering {
    for ((key, left), right) in keys.iter().zip(a).zip(b) {
        let ord = total_cmp(left, right);
        let ord = if key.ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl RowStream for SortStream {
    fn next(&mut self) -> RowFuture<'_, Option<Value>> {
        Box::pin(async move {
            if self.sorted.is_none() {
                let sorted = self.fill().await?;
                self.sorted = Some(sorted);
            }
            Ok(self.sorted.as_mut().and_then(Iterator::next))
        })
    }

    fn close(&mut self) -> RowFuture<'_, ()> {
        self.upstream.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::stream::tests::{collect, VecSource};
    use crate::value::Entity;

    fn person(name: &str, age: f64) -> Value {
        Value::Entity(Entity::new("P").with("name", name).with("age", age))
    }

    fn names(items: &[Value]) -> Vec<String> {
        items
            .iter()
            .map(|v| field_or_null(v, "name").unwrap().as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_two_keys() {
        let (source, _) = VecSource::boxed(vec![
            person("b", 1.0),
            person("a", 1.0),
            person("c", 2.0),
        ]);
        let stream = SortStream::new(source, vec![SortKey::asc("age"), SortKey::desc("name")]);
        let out = collect(Box::new(stream)).await.unwrap();
        assert_eq!(names(&out), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_nulls_first_ascending() {
        let (source, _) = VecSource::boxed(vec![
            person("x", 3.0),
            Value::Entity(Entity::new("P").with("name", "unset")),
            person("y", 1.0),
        ]);
        let stream = SortStream::new(source, vec![SortKey::asc("age")]);
        let out = collect(Box::new(stream)).await.unwrap();
        assert_eq!(names(&out), vec!["unset", "y", "x"]);
    }

    #[test]
    fn test_compare_keys_descending() {
        let keys = [SortKey::desc("n")];
        assert_eq!(
            compare_keys(&keys, &[Value::Number(1.0)], &[Value::Number(2.0)]),
            Ordering::Greater
        );
    }
}
