use std::{collections::HashMap, hash::Hash, mem};

use log::debug;
use serde::{Serialize, de::DeserializeOwned};

use crate::{CollectiveErr, ProcessGroup, Result};

/// Merges the partial mappings of every participant into a single view.
///
/// This is a barrier: every participant of `group` must call it. On a single process
/// job the partial mapping is returned untouched.
///
/// The partial mappings are merged in rank order, a key present in more than one of them
/// keeps the value of the highest rank. Callers are expected to hand out disjoint keys to
/// each rank, otherwise the result depends on that ordering.
///
/// # Arguments
/// * `group` - The group of participants.
/// * `partial` - This participant's results keyed by item id.
///
/// # Returns
/// The union of all the partial mappings, identical on every participant.
///
/// Entries travel as JSON, which has no representation for non-finite floats. Use
/// `gather_sum` for float partials that may be NaN or infinite.
pub fn gather_map<G, K, V>(group: &G, partial: HashMap<K, V>) -> Result<HashMap<K, V>>
where
    G: ProcessGroup + ?Sized,
    K: Serialize + DeserializeOwned + Eq + Hash,
    V: Serialize + DeserializeOwned,
{
    let ctx = group.context();
    if !ctx.is_distributed() {
        return Ok(partial);
    }

    // Map keys need not be strings, so entries travel as a list of pairs.
    let entries: Vec<(K, V)> = partial.into_iter().collect();
    let payload = serde_json::to_vec(&entries)?;

    group.barrier();
    let gathered = group.all_gather(payload)?;

    let mut merged = HashMap::new();
    for (rank, bytes) in gathered.iter().enumerate() {
        let entries: Vec<(K, V)> = serde_json::from_slice(bytes)?;
        debug!(rank = rank, entries = entries.len(); "merging gathered entries");
        merged.extend(entries);
    }

    Ok(merged)
}

/// Adds up the partial sums of every participant, element by element.
///
/// This is a barrier: every participant of `group` must call it with a slice of the
/// same length. On a single process job the partial sums are returned untouched.
///
/// Values travel as their raw bytes, so a NaN or infinite partial reaches every
/// participant as is. Partials are added in rank order.
pub fn gather_sum<G>(group: &G, partial: &[f64]) -> Result<Vec<f64>>
where
    G: ProcessGroup + ?Sized,
{
    let ctx = group.context();
    if !ctx.is_distributed() {
        return Ok(partial.to_vec());
    }

    let expected = mem::size_of_val(partial);
    let payload = bytemuck::cast_slice::<f64, u8>(partial).to_vec();

    group.barrier();
    let gathered = group.all_gather(payload)?;

    let mut total = vec![0.0; partial.len()];
    for (rank, bytes) in gathered.iter().enumerate() {
        if bytes.len() != expected {
            return Err(CollectiveErr::PayloadSize {
                rank,
                got: bytes.len(),
                expected,
            });
        }

        // The received buffer has no alignment guarantee.
        let values = bytes
            .chunks_exact(mem::size_of::<f64>())
            .map(bytemuck::pod_read_unaligned::<f64>);

        for (sum, value) in total.iter_mut().zip(values) {
            *sum += value;
        }
    }

    Ok(total)
}
