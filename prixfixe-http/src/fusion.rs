use std::collections::HashMap;

use prixfixe::entities::Searchable;
use prixfixe::DocId;

/// Arrange `records` in the order the index ranked `ids`. Records the index
/// did not return are dropped; duplicates keep their first position.
pub fn fuse<T: Searchable>(ids: &[DocId], records: Vec<T>) -> Vec<T> {
    let mut by_id: HashMap<DocId, T> = records.into_iter().map(|r| (r.id(), r)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
