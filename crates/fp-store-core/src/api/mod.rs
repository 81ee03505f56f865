//! Construction of the store service object.

mod builder;

pub use builder::FeatureProfileStoreBuilder;
