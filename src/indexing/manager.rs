//! Index Manager
//!
//! Creates the two indexes the engine relies on. Index creation happens once,
//! at startup or schema-creation time; after that the store maintains both
//! indexes inside the same critical section as each bucket mutation.

use tracing::info;

use crate::error::Result;
use crate::indexing::{IndexDefinition, IndexHandle};
use crate::storage::BucketStore;

pub struct IndexManager;

impl IndexManager {
    /// Definitions for a store of the given capacity: the range index first,
    /// then the open-bucket index.
    pub fn definitions(capacity: usize) -> Vec<IndexDefinition> {
        vec![IndexDefinition::range(), IndexDefinition::open_bucket(capacity)]
    }

    /// Creates both indexes. Safe to call again: existing indexes are returned
    /// unchanged.
    pub fn create_indexes<S: BucketStore + ?Sized>(store: &S) -> Result<Vec<IndexHandle>> {
        let handles = Self::definitions(store.capacity())
            .into_iter()
            .map(|definition| store.create_index(definition))
            .collect::<Result<Vec<_>>>()?;

        info!(
            indexes = ?handles.iter().map(|h| h.name.as_str()).collect::<Vec<_>>(),
            "bucket indexes ready"
        );
        Ok(handles)
    }
}
