//! Feature-profile creation and lookup.

mod creator;
mod details;
mod features;
mod lock;
mod timeseries;

pub use creator::{CreatedProfile, FeatureProfileCreator};
pub use details::{get_details, ProfileDetails};
pub use features::{parse_features, parse_features_file, FeatureDictionary, ParsedFeatures};
pub use lock::WindowLock;
pub use timeseries::{parse_timeseries, parse_timeseries_file};
