use std::sync::Arc;
use bson::{Bson, Document};
use crate::error::{Error, Result};
use crate::query::Filter;
use crate::update::operators::UpdateOperator;
use crate::update::path::{self, Slot, FIELD_SEPARATOR, POSITIONAL_SEGMENT};
use crate::update::UpdateContext;
use crate::event;

enum Match {
    /// A document element the rest of the path is resolved against.
    Element(usize),
    /// An element merged into directly, on a copy of the list.
    Copy(usize),
}

/// Splits `key` around its first positional segment, e.g. `items.$.qty` into `items` and `qty`.
fn split_positional(key: &str) -> (String, String) {
    let segments: Vec<&str> = key.split(FIELD_SEPARATOR).collect();
    let index = segments
        .iter()
        .position(|s| *s == POSITIONAL_SEGMENT)
        .unwrap_or(segments.len());
    let pre_path = segments[..index].join(".");
    let post_path = segments.get(index + 1..).map(|s| s.join(".")).unwrap_or_default();
    (pre_path, post_path)
}

/// Builds the single-field query locating the element behind `pre_path` from the fields of
/// `query` starting with it. When several fields match, the last one wins.
fn derive_sub_query(query: &Document, pre_path: &str) -> Option<Document> {
    let mut sub_query = None;
    for (key, value) in query.iter() {
        if key.starts_with(pre_path) {
            let match_key = if key == pre_path {
                key.as_str()
            } else {
                key.get(pre_path.len() + 1..).unwrap_or("")
            };
            let mut doc = Document::new();
            doc.insert(match_key, value.clone());
            sub_query = Some(doc);
        }
    }
    sub_query
}

fn positional_filter(ctx: &mut UpdateContext<'_>, key: &str, pre_path: &str) -> Result<Arc<Filter>> {
    if ctx.cache_enabled {
        if let Some(filter) = ctx.filter_cache.get(pre_path) {
            return Ok(filter.clone());
        }
    }

    let sub_query = derive_sub_query(ctx.query, pre_path).ok_or_else(|| {
        Error::PositionalResolutionError {
            key: key.to_string(),
            query: ctx.query.clone(),
        }
    })?;
    let filter = Arc::new(ctx.filter_compiler.compile(&sub_query)?);

    if ctx.cache_enabled {
        ctx.filter_cache.insert(pre_path.to_string(), filter.clone());
    }
    Ok(filter)
}

/// Applies the update of a positional `key` to the first element of the list stored under
/// `field` in `owner` that the query selects.
///
/// Document elements are matched against the query directly and the remainder of the path is
/// resolved inside the matching element. Other elements, or any element when the positional
/// segment ends the path, are matched as `{<prefix>: element}`; the operator then merges at the
/// element index of a copy of the list, which replaces the original under `field`.
pub(crate) fn resolve_positional(
    key: &str,
    operand: &Bson,
    owner: &mut Document,
    field: &str,
    operator: &UpdateOperator,
    ctx: &mut UpdateContext<'_>,
) -> Result<()> {
    let (pre_path, post_path) = split_positional(key);
    let filter = positional_filter(ctx, key, &pre_path)?;

    let Some(Bson::Array(list)) = owner.get(field) else {
        return Ok(());
    };

    let mut found = None;
    for (i, item) in list.iter().enumerate() {
        match item {
            Bson::Document(element) if !post_path.is_empty() => {
                if filter(element) {
                    found = Some(Match::Element(i));
                    break;
                }
            }
            _ => {
                let mut probe = Document::new();
                probe.insert(pre_path.as_str(), item.clone());
                if filter(&probe) {
                    found = Some(Match::Copy(i));
                    break;
                }
            }
        }
    }

    match found {
        None => {
            ctx.positional_misses.inc();
            event!(ctx.logger, "event: positional no match, key={}", key);
            Ok(())
        }
        Some(Match::Element(index)) => {
            event!(ctx.logger, "event: positional match, key={}, index={}", key, index);
            match owner.get_mut(field) {
                Some(Bson::Array(list)) => match list.get_mut(index) {
                    Some(Bson::Document(element)) => {
                        path::resolve(element, &post_path, operand, operator, ctx)
                    }
                    _ => Ok(()),
                },
                _ => Ok(()),
            }
        }
        Some(Match::Copy(index)) => {
            event!(ctx.logger, "event: positional match, key={}, index={}", key, index);
            let mut copy = list.clone();
            operator.merge(Slot::Element { list: &mut copy, index }, operand)?;
            owner.insert(field, copy);
            Ok(())
        }
    }
}
