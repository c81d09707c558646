pub(crate) mod bson_utils;
pub(crate) mod typecast;
