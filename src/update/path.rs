use bson::{Bson, Document};
use crate::error::{Error, Result};
use crate::update::operators::UpdateOperator;
use crate::update::positional;
use crate::update::UpdateContext;
use crate::{debug, event};

/// Separator between the segments of a dot-path.
pub(crate) const FIELD_SEPARATOR: char = '.';

/// Segment standing for the array element selected by the query.
pub(crate) const POSITIONAL_SEGMENT: &str = "$";

/// The location an operator merges its operand into: a named field of a document, or an element
/// of a list addressed by index.
pub(crate) enum Slot<'a> {
    Field { owner: &'a mut Document, name: &'a str },
    Element { list: &'a mut Vec<Bson>, index: usize },
}

impl Slot<'_> {

    pub fn get(&self) -> Option<&Bson> {
        match self {
            Slot::Field { owner, name } => owner.get(*name),
            Slot::Element { list, index } => list.get(*index),
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut Bson> {
        match self {
            Slot::Field { owner, name } => owner.get_mut(*name),
            Slot::Element { list, index } => list.get_mut(*index),
        }
    }

    /// Stores `value`, padding the list with nulls when the index is past its end.
    pub fn set(&mut self, value: Bson) {
        match self {
            Slot::Field { owner, name } => {
                owner.insert(name.to_string(), value);
            }
            Slot::Element { list, index } => {
                if *index >= list.len() {
                    list.resize(*index + 1, Bson::Null);
                }
                list[*index] = value;
            }
        }
    }

    pub fn remove(&mut self) -> Option<Bson> {
        match self {
            Slot::Field { owner, name } => owner.remove(*name),
            Slot::Element { list, index } if *index < list.len() => Some(list.remove(*index)),
            Slot::Element { .. } => None,
        }
    }

    /// The final path segment this slot stands for.
    pub fn key(&self) -> String {
        match self {
            Slot::Field { name, .. } => name.to_string(),
            Slot::Element { index, .. } => index.to_string(),
        }
    }
}

pub(crate) fn is_positional(key: &str) -> bool {
    key.split(FIELD_SEPARATOR).any(|segment| segment == POSITIONAL_SEGMENT)
}

enum Walk {
    Done,
    /// The path went through a value that cannot hold sub-fields.
    Blocked,
}

enum Step {
    Descend,
    Positional,
    Blocked,
}

/// Resolves the dot-path `key` inside `document` and merges `operand` at its end with `operator`.
///
/// Missing intermediate documents are created when the operator allows it and the path is not
/// positional; otherwise a missing intermediate makes the update of this key a no-op. A list
/// followed by a positional segment hands over to the positional resolver.
pub(crate) fn resolve(
    document: &mut Document,
    key: &str,
    operand: &Bson,
    operator: &UpdateOperator,
    ctx: &mut UpdateContext<'_>,
) -> Result<()> {
    match walk(document, key, operand, operator, ctx)? {
        Walk::Done => Ok(()),
        Walk::Blocked => Err(Error::TraversalTypeError {
            path: key.to_string(),
            document: document.clone(),
        }),
    }
}

fn walk(
    document: &mut Document,
    key: &str,
    operand: &Bson,
    operator: &UpdateOperator,
    ctx: &mut UpdateContext<'_>,
) -> Result<Walk> {
    let segments: Vec<&str> = key.split(FIELD_SEPARATOR).collect();
    let positional = is_positional(key);
    if positional {
        event!(ctx.logger, "event: positional lookup, key={}, query={}", key, ctx.query);
    }

    let mut current = document;
    for i in 0..segments.len() - 1 {
        let segment = segments[i];
        if !current.contains_key(segment) {
            if operator.create_missing && !positional {
                current.insert(segment, Document::new());
            } else {
                return Ok(Walk::Done);
            }
        }

        let step = match current.get(segment) {
            Some(Bson::Array(_)) if segments[i + 1] == POSITIONAL_SEGMENT => Step::Positional,
            Some(Bson::Document(_)) => Step::Descend,
            _ => Step::Blocked,
        };

        match step {
            Step::Positional => {
                positional::resolve_positional(key, operand, current, segment, operator, ctx)?;
                return Ok(Walk::Done);
            }
            Step::Blocked => return Ok(Walk::Blocked),
            Step::Descend => {}
        }

        current = match current.get_mut(segment) {
            Some(Bson::Document(sub_document)) => sub_document,
            _ => return Ok(Walk::Blocked),
        };
    }

    if positional {
        // A positional path only merges through the positional resolver.
        return Ok(Walk::Done);
    }

    let name = segments[segments.len() - 1];
    debug!(ctx.logger, "Sub-document is {}", current);
    event!(ctx.logger, "event: merge, operator={}, field={}", operator.name, name);
    operator.merge(Slot::Field { owner: current, name }, operand)?;
    Ok(Walk::Done)
}
