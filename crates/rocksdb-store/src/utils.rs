use rockbound::{OptimisticTransactionDB as DB, Schema, SchemaDBOperationsExt};
use synccommittee_db::DbResult;

/// Reads a whole table in key order.
///
/// Entries read this way are not tracked by a surrounding transaction; keys
/// that a transaction relies on must be re-read with `get_for_update`.
pub(crate) fn scan_table<S: Schema>(db: &DB) -> DbResult<Vec<(S::Key, S::Value)>> {
    let mut iterator = db.iter::<S>()?;
    iterator.seek_to_first();

    let mut out = Vec::new();
    for res in iterator {
        out.push(res?.into_tuple());
    }
    Ok(out)
}
