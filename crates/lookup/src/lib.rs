mod error;
mod memo;
mod static_lookup;
mod traits;

pub use error::LookupError;
pub use memo::MemoizedLookup;
pub use static_lookup::StaticLookup;
pub use traits::ReferenceLookup;
