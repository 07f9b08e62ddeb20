use crate::core::chunk::RecordChunk;
use crate::core::record::RecordComparator;
use std::collections::VecDeque;

/// Outcome of one ordered merge round.
pub struct Merged {
    /// The globally ordered prefix produced this round.
    pub chunk: RecordChunk,
    /// Index (into the input vec) of the chunk that ran out first.
    pub exhausted: usize,
    /// Per input, the records not consumed this round. The exhausted
    /// input's entry is empty.
    pub leftovers: Vec<RecordChunk>,
}

/// Merge one chunk per upstream into a single ordered chunk.
///
/// The merge emits the least remaining record (per `less`) one at a
/// time and stops the moment any input chunk is fully consumed: records
/// still held by the other inputs cannot be ordered against that
/// stream's unseen continuation, so they are deferred to the next round
/// as leftovers. Ties break toward the lower input index, which makes
/// the merge stable across rounds.
///
/// An input that is empty on arrival exhausts the merge immediately.
pub fn merge_chunks(inputs: Vec<RecordChunk>, less: &RecordComparator) -> Merged {
    let mut queues: Vec<VecDeque<_>> = inputs
        .into_iter()
        .map(|chunk| chunk.into_records().into())
        .collect();

    let mut merged = RecordChunk::new();
    let mut exhausted = queues.iter().position(VecDeque::is_empty);

    while exhausted.is_none() {
        let mut winner = 0;
        for candidate in 1..queues.len() {
            if less(&queues[candidate][0], &queues[winner][0]) {
                winner = candidate;
            }
        }

        merged.push(queues[winner].pop_front().expect("non-empty queue"));
        if queues[winner].is_empty() {
            exhausted = Some(winner);
        }
    }

    let leftovers = queues
        .into_iter()
        .map(|queue| queue.into_iter().collect())
        .collect();

    Merged {
        chunk: merged,
        exhausted: exhausted.unwrap_or(0),
        leftovers,
    }
}
