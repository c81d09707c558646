use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use bson::{Bson, Document};
use crate::error::{Error, Result};
use crate::obs::logger::{LoggerAndTracer, NoOpLogger};
use crate::obs::metrics::{Counter, MetricRegistry};
use crate::options::options::Options;
use crate::query::{Filter, FilterCompiler, QueryFilterCompiler};
use crate::update::operators::OperatorCatalog;
use crate::util::typecast::required_document;
use crate::{debug, event, warn};

mod operators;
mod path;
mod positional;

pub use operators::UpdateOperator;

/// Prefix of the top-level keys naming an update operator.
const OPERATOR_PREFIX: char = '$';

/// State shared by all the keys of a single update call.
pub(crate) struct UpdateContext<'a> {
    /// The query that selected the document being updated.
    pub query: &'a Document,
    pub logger: &'a dyn LoggerAndTracer,
    pub filter_compiler: &'a dyn FilterCompiler,
    pub cache_enabled: bool,
    /// Compiled positional filters, by path prefix.
    pub filter_cache: HashMap<String, Arc<Filter>>,
    /// The target paths already claimed by an operator.
    pub seen_keys: HashSet<String>,
    pub positional_misses: Arc<Counter>,
}

impl<'a> UpdateContext<'a> {
    pub fn new(
        query: &'a Document,
        logger: &'a dyn LoggerAndTracer,
        filter_compiler: &'a dyn FilterCompiler,
        cache_enabled: bool,
        positional_misses: Arc<Counter>,
    ) -> Self {
        UpdateContext {
            query,
            logger,
            filter_compiler,
            cache_enabled,
            filter_cache: HashMap::new(),
            seen_keys: HashSet::new(),
            positional_misses,
        }
    }

    /// Claims `key` for the current operator, failing if another one already targets it.
    pub fn claim(&mut self, key: &str) -> Result<()> {
        if self.seen_keys.insert(key.to_string()) {
            Ok(())
        } else {
            Err(Error::Conflict(key.to_string()))
        }
    }
}

/// Applies MongoDB-style update specifications to documents.
///
/// An update is either in operator form (`{ "$set": { "a.b": 1 }, "$inc": { "n": 2 } }`) or a
/// replacement document. The engine keeps no state between calls: the operator catalog is built
/// once and only read afterwards, so a single engine can be shared between threads.
pub struct UpdateEngine {
    logger: Arc<dyn LoggerAndTracer>,
    options: Arc<Options>,
    filter_compiler: Arc<dyn FilterCompiler>,
    catalog: OperatorCatalog,
    operator_updates: Arc<Counter>,
    replacements: Arc<Counter>,
    keys_updated: Arc<Counter>,
    positional_misses: Arc<Counter>,
    failures: Arc<Counter>,
}

impl UpdateEngine {

    pub fn new() -> Self {
        Self::from_parts(
            Arc::new(NoOpLogger),
            &mut MetricRegistry::new(),
            Arc::new(Options::default()),
            Arc::new(QueryFilterCompiler),
        )
    }

    /// Creates an engine registering its counters in `metric_registry`.
    pub fn from_parts(
        logger: Arc<dyn LoggerAndTracer>,
        metric_registry: &mut MetricRegistry,
        options: Arc<Options>,
        filter_compiler: Arc<dyn FilterCompiler>,
    ) -> Self {
        let operator_updates = Counter::new();
        let replacements = Counter::new();
        let keys_updated = Counter::new();
        let positional_misses = Counter::new();
        let failures = Counter::new();

        metric_registry
            .register_counter("update_engine.operator_updates", operator_updates.clone())
            .register_counter("update_engine.replacements", replacements.clone())
            .register_counter("update_engine.keys_updated", keys_updated.clone())
            .register_counter("update_engine.positional_misses", positional_misses.clone())
            .register_counter("update_engine.failures", failures.clone());

        UpdateEngine {
            logger,
            options,
            filter_compiler,
            catalog: OperatorCatalog::new(),
            operator_updates,
            replacements,
            keys_updated,
            positional_misses,
            failures,
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = Arc::new(options);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn LoggerAndTracer>) -> Self {
        self.logger = logger;
        self
    }

    /// The names of the supported update operators.
    pub fn operators(&self) -> Vec<&'static str> {
        self.catalog.names()
    }

    /// Returns `true` if `update` contains at least one known update operator.
    pub fn is_operator_update(&self, update: &Document) -> bool {
        update.keys().any(|key| self.catalog.get(key).is_some())
    }

    /// Applies `update` to `document` and returns it.
    ///
    /// `query` must be the filter that selected `document`: positional (`$`) paths are resolved
    /// against it.
    pub fn do_update(&self, mut document: Document, update: &Document, query: &Document) -> Result<Document> {
        self.apply(&mut document, update, query)?;
        Ok(document)
    }

    /// Applies `update` to `document` in place.
    ///
    /// A failure stops the update at the failing key: the changes made by the previous keys are
    /// kept.
    pub fn apply(&self, document: &mut Document, update: &Document, query: &Document) -> Result<()> {
        let result = self.apply_update(document, update, query);
        if let Err(e) = &result {
            self.failures.inc();
            warn!(self.logger, "Update {} failed: {}", update, e);
        }
        result
    }

    fn apply_update(&self, document: &mut Document, update: &Document, query: &Document) -> Result<()> {
        let mut ctx = UpdateContext::new(
            query,
            self.logger.as_ref(),
            self.filter_compiler.as_ref(),
            self.options.update_options().cache_positional_filters(),
            self.positional_misses.clone(),
        );

        let mut operator_found = false;
        for (key, value) in update.iter() {
            if let Some(operator) = self.catalog.get(key) {
                event!(self.logger, "event: dispatch operator, operator={}", operator.name);
                self.apply_operator(operator, document, value, &mut ctx)?;
                operator_found = true;
            } else if key.starts_with(OPERATOR_PREFIX) {
                return Err(Error::UnsupportedOperator { update: update.clone() });
            }
        }

        if operator_found {
            self.operator_updates.inc();
        } else {
            self.replace(document, update);
        }
        Ok(())
    }

    fn apply_operator(
        &self,
        operator: &UpdateOperator,
        document: &mut Document,
        value: &Bson,
        ctx: &mut UpdateContext<'_>,
    ) -> Result<()> {
        let keys = required_document(operator.name, value)?;
        debug!(self.logger, "{} has {} key(s)", operator.name, keys.len());

        for (key, operand) in keys {
            event!(self.logger, "event: update key, operator={}, key={}", operator.name, key);
            ctx.claim(key)?;
            path::resolve(document, key, operand, operator, ctx)?;
            self.keys_updated.inc();
            debug!(self.logger, "Full document is {}", document);
        }
        Ok(())
    }

    /// Replaces every field of `document` but the identity field with the fields of `replacement`.
    fn replace(&self, document: &mut Document, replacement: &Document) {
        let identity_field = self.options.update_options().identity_field();
        event!(self.logger, "event: replace document, identity_field={}", identity_field);

        let identity = document.remove(identity_field);
        document.clear();
        if let Some(identity) = identity {
            document.insert(identity_field, identity);
        }
        for (key, value) in replacement {
            document.insert(key.clone(), value.clone());
        }
        self.replacements.inc();
    }
}

impl Default for UpdateEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) fn test_context(query: &Document) -> UpdateContext<'_> {
    static LOGGER: NoOpLogger = NoOpLogger;
    static FILTER_COMPILER: QueryFilterCompiler = QueryFilterCompiler;
    UpdateContext::new(query, &LOGGER, &FILTER_COMPILER, true, Counter::new())
}
