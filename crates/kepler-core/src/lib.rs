pub mod actions;
pub mod combined;
pub mod config;
pub mod dataset;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod instances;
pub mod layer;
pub mod lens;
pub mod merger;
pub mod persistence;
pub mod reducer;
pub mod root;
pub mod saved;
pub mod selectors;
pub mod slices;
pub mod store;

pub use actions::*;
pub use config::*;
pub use diagnostics::*;
pub use error::*;
pub use instances::*;
pub use lens::*;
pub use merger::*;
pub use reducer::*;
pub use root::*;
pub use saved::*;
pub use store::*;

pub use combined::add_data_to_map;
pub use combined::receive_map_config;
pub use combined::replace_data_in_map;
pub use persistence::replay;
pub use persistence::SessionLog;
pub use persistence::SessionRecord;
pub use selectors::Selectors;
