use async_trait::async_trait;

use crate::error::SourceResult;
use crate::model::{Physician, PhysicianQuery};

/// The physician directory. One call per search key; a query without a key
/// is a national search.
#[async_trait]
pub trait PhysicianSource: Send + Sync {
    async fn search(&self, query: &PhysicianQuery) -> SourceResult<Vec<Physician>>;
}
