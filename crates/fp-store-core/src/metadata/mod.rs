//! Per-window metadata: variables files, marker records and atomic file I/O.

mod atomic;
mod literal;
mod marker;
mod variables;

pub use atomic::{atomic_read_json, atomic_write_bytes, atomic_write_json, read_text};
pub use literal::{parse_literal_list, Literal};
pub use marker::{CreatedMarker, DetailsMarker, MARKER_FORMAT_VERSION};
pub use variables::{MetricVariables, VariableValue};
