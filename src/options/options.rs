use bson::Document;
use serde::Deserialize;
use crate::error::Result;

/// Name of the field identifying a document when none is configured.
pub const DEFAULT_IDENTITY_FIELD: &str = "_id";

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
    update_options: Option<UpdateOptions>,
}

impl Options {

    /// Loads the options from a BSON document, e.g.
    /// `{ "updateOptions": { "identityField": "key", "cachePositionalFilters": false } }`.
    pub fn from_document(doc: &Document) -> Result<Self> {
        Ok(bson::from_document(doc.clone())?)
    }

    pub fn update_options(&self) -> &UpdateOptions {
        static DEFAULT_UPDATE_OPTIONS: UpdateOptions = UpdateOptions {
            identity_field: None,
            cache_positional_filters: None,
        };
        self.update_options.as_ref().unwrap_or(&DEFAULT_UPDATE_OPTIONS)
    }

    pub fn with_update_options(mut self, update_options: UpdateOptions) -> Self {
        self.update_options = Some(update_options);
        self
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateOptions {

    /// The field that a whole-document replacement always preserves.
    identity_field: Option<String>,

    /// Whether the filter derived from the query for a positional (`$`) path is compiled once
    /// per prefix and reused for the rest of the update call.
    cache_positional_filters: Option<bool>,
}

impl UpdateOptions {

    pub fn identity_field(&self) -> &str {
        self.identity_field.as_deref().unwrap_or(DEFAULT_IDENTITY_FIELD)
    }

    pub fn cache_positional_filters(&self) -> bool {
        self.cache_positional_filters.unwrap_or(true)
    }

    pub fn with_identity_field(mut self, name: impl Into<String>) -> Self {
        self.identity_field = Some(name.into());
        self
    }

    pub fn with_positional_filter_cache(mut self, enabled: bool) -> Self {
        self.cache_positional_filters = Some(enabled);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.update_options().identity_field(), "_id");
        assert!(options.update_options().cache_positional_filters());
    }

    #[test]
    fn test_builders() {
        let options = Options::default().with_update_options(
            UpdateOptions::default()
                .with_identity_field("key")
                .with_positional_filter_cache(false),
        );
        assert_eq!(options.update_options().identity_field(), "key");
        assert!(!options.update_options().cache_positional_filters());
    }

    #[test]
    fn test_from_document() {
        let options = Options::from_document(&doc! {
            "updateOptions": { "identityField": "uuid", "cachePositionalFilters": false }
        })
        .unwrap();
        assert_eq!(options.update_options().identity_field(), "uuid");
        assert!(!options.update_options().cache_positional_filters());

        let options = Options::from_document(&doc! {}).unwrap();
        assert_eq!(options.update_options().identity_field(), "_id");
    }

    #[test]
    fn test_from_document_rejects_wrong_types() {
        let result = Options::from_document(&doc! { "updateOptions": { "identityField": 12 } });
        assert!(result.is_err());
    }
}
